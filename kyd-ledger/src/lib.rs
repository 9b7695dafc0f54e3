pub mod event_log;
pub mod hasher;
pub mod ledger_store;
pub mod models;
pub mod posting_engine;
pub mod txhandle;
pub mod wallet_store;

pub use event_log::EventLog;
pub use hasher::EventHasher;
pub use ledger_store::LedgerStore;
pub use models::{
    ChainVerification, EntryType, EventType, LedgerEntry, TransactionEvent, Wallet, WalletStatus,
    GENESIS,
};
pub use posting_engine::{Posting, PostingEngine, PostingResult};
pub use txhandle::TxHandle;
pub use wallet_store::WalletStore;
