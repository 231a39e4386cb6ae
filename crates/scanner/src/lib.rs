// Library crate: capture session, export pipeline and transfer, shared by the
// `scanner` CLI, the HTTP bridge and the integration tests.

pub mod command;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod fixtures;
pub mod harness;
pub mod orchestrator;
pub mod scanner;
pub mod session;
pub mod settings;
pub mod transfer;
pub mod validation;

pub use error::{ExportCause, ExportError, ScanError, ScanResult};
pub use scanner::{Scanner, ScannerStatus};
