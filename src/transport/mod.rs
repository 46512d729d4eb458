//! Stdio transport for the server under test.
//!
//! Three layers, leaves first: [`stream_buffer`] turns raw bytes into framed
//! JSON messages, [`process`] owns the child process and its pipes, and
//! [`message_handler`] pairs outgoing writes with a FIFO of pending reads.

pub mod message_handler;
pub mod process;
pub mod stream_buffer;

pub use message_handler::MessageHandler;
pub use process::{PipeOutput, ProcessManager};
pub use stream_buffer::{StreamBuffer, StreamEvent};
