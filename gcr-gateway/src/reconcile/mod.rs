//! Callback reconciliation core
//!
//! Ties outbound generation requests to the asynchronous callbacks that
//! report their results.

pub mod dispatcher;
pub mod extractor;
pub mod matcher;
pub mod payload;
pub mod store;
pub mod waiter;

pub use dispatcher::{DispatchError, DispatchReceipt, Dispatcher};
pub use extractor::IdentifierExtractor;
pub use matcher::{match_token, MatchHit, MatchTier};
pub use payload::PayloadLimits;
pub use store::{CallbackRecord, CorrelationStore, RecordSummary};
pub use waiter::{ReconciliationWaiter, RequestStatus, WaitConfig, WaitOutcome, WaitReport};
