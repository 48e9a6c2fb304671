//! Running external commands under supervision.
//!
//! Build a [`ProcessSpec`], hand it to a [`ProcessSupervisor`], then `run`
//! and `join`. Output is streamed line by line to a
//! [`LogSink`](crate::context::LogSink) while the child runs.

mod args;
mod channel;
mod error;
mod lines;
mod shell;
mod spec;
mod supervisor;

pub use args::*;
pub use channel::*;
pub use error::*;
pub use lines::*;
pub use shell::default_interpreter;
pub use spec::*;
pub use supervisor::*;
