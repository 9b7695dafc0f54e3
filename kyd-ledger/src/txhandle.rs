// txhandle.rs
use sqlx::Postgres;

/// The single concrete transaction handle every `*_Tx` operation in this
/// crate takes. §9's design note calls out the source's `interface{}`
/// transaction handles as something to re-express as one typed
/// abstraction rather than a trait with swappable backends — there is only
/// one concrete implementation, the database transaction, so a type alias
/// is enough.
pub type TxHandle<'a> = sqlx::Transaction<'a, Postgres>;
