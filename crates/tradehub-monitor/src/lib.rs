//! Logging setup shared by the binary and integration harnesses.

mod logging;

pub use logging::setup_logging;
