//! Active-node selection.

pub mod coordinator;

pub use coordinator::{SelectOutcome, SelectionCoordinator};
