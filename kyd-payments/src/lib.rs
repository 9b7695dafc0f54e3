pub mod collaborators;
pub mod models;
pub mod orchestrator;
pub mod requests;
pub mod transaction_store;

pub use collaborators::{ExchangeRate, ForexProvider, NotificationSink, SecurityEvent, SecuritySink, UserLookup, UserProfile};
pub use models::{Transaction, TransactionStatus, TransactionType};
pub use orchestrator::{PaymentOrchestrator, DEFAULT_FEE_RATE};
pub use requests::{
    ApprovalDecision, CreateEscrowRequest, DisputeResolution, InitiatePaymentRequest, ReceiverRef,
};
pub use transaction_store::TransactionStore;
