//! State synchronization layer.

pub mod policy;
pub mod snapshot;
pub mod synchronizer;
pub mod topic;

pub use policy::RefreshPolicy;
pub use snapshot::{system_proxy_address, BackendStatus, LiveSnapshot};
pub use synchronizer::{StateSynchronizer, SyncHandle};
pub use topic::TopicKey;
