//! Service layer: composition root and diagnostics.

pub mod container;
pub mod diagnostics;

pub use container::{Backends, ServiceContainer};
pub use diagnostics::{ConnectionReport, ConnectionTester};
