//! Marketplace channel connectors.
//!
//! One connector exists per marketplace×channel pair and speaks the
//! marketplace's API on behalf of a tenant:
//! - **Contract** (`types`) - capability-checked `ChannelConnector` trait
//! - **Errors** (`error`) - transport/auth/rate-limit taxonomy
//! - **Retry** (`retry`) - the fixed backoff policy callers wrap calls in
//! - **Normalization** (`normalize`) - raw payloads to `NormalizedRecord`
//! - **HTTP** (`http`) - generic REST connector over reqwest
//! - **Mock** (`mock`) - scripted connector for tests and smoke checks
//!
//! Optional operations (`get_updates`, `mark_read`) are advertised through
//! `capabilities()`; calling an unadvertised operation returns
//! `ConnectorError::NotSupported` rather than panicking, and callers are
//! expected to branch on capability instead of catching the error.

pub mod error;
pub mod http;
pub mod mock;
pub mod normalize;
pub mod retry;
pub mod types;

pub use error::ConnectorError;
pub use http::RestConnector;
pub use mock::MockConnector;
pub use normalize::{normalize_item, NormalizationError, NormalizedRecord};
pub use retry::{execute_with_retry, AuthMode, RetrySchedule, RetryStats};
pub use types::{
    Capability, CapabilitySet, ChannelConnector, ItemPage, ListFilters, RawItem, ReplyAck,
    UpdateBatch,
};
