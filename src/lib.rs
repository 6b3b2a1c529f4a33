//! Live-state engine for a proxy management desktop application.
//!
//! Keeps an in-memory picture of proxy nodes, their latency and the active
//! routing configuration synchronized with an external backend process, and
//! drives on-demand latency probing.
//!
//! ```text
//!                ┌────────────────────────────────────────────────┐
//!                │                 LIVE-STATE CORE                │
//!                │                                                │
//!   EventBus ────┼─▶ sync::StateSynchronizer ──▶ LiveSnapshot ────┼─▶ presentation
//!                │        ▲            ▲                          │
//!                │        │ force      │ timers / fallbacks       │
//!                │  selection::        │                          │
//!                │  SelectionCoordinator                          │
//!                │        │                                       │
//!                │  probe::ProbeScheduler ──▶ per-target listeners│
//!                │        │                                       │
//!                └────────┼───────────────────────────────────────┘
//!                         ▼
//!                  gateway::CommandGateway (backend process)
//! ```

pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod probe;
pub mod selection;
pub mod settings;
pub mod sync;

pub use gateway::{BackendEvent, CommandGateway, EventBus, GatewayError, GatewayResult};
pub use lifecycle::Shutdown;
pub use probe::ProbeScheduler;
pub use selection::{SelectOutcome, SelectionCoordinator};
pub use settings::VergeSettings;
pub use sync::{LiveSnapshot, StateSynchronizer, SyncHandle, TopicKey};
