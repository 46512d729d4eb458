//! mcp-aegis library
//!
//! Core of the declarative MCP conformance tester: stdio session management
//! (process, framing, FIFO reads), the pattern-matching validation engine,
//! and the test runner. The binary in `main.rs` is a thin CLI over these.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod matcher;
pub mod query;
pub mod runner;
pub mod session;
pub mod suite;
pub mod transport;
pub mod types;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use runner::TestRunner;
pub use session::Session;
