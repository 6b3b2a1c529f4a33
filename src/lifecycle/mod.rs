//! Session lifecycle.

pub mod shutdown;

pub use shutdown::Shutdown;
