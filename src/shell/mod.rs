//! The command language and its executor.
//!
//! - [`parser`]: tokenizing, quoting, flags and `|` pipelines
//! - [`executor`]: runs commands against the workspace and the caches
//! - [`output`]: text rendering shared by commands and filters

pub mod executor;
pub mod output;
pub mod parser;

pub use executor::{
    ensure_users, Connector, Executor, HttpConnector, Outcome, TaskContext, Transition, ViewMode,
};
pub use parser::{Command, Pipeline, Verb};
