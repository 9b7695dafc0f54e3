use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "kyd-node")]
#[command(about = "KYD payments backend")]
pub struct Args {
    /// Path to the JSON config file (risk policy thresholds, pool size, ...).
    #[arg(short, long, default_value = "config.json")]
    pub config: String,
}
