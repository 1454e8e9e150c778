//! slack-shell: a terminal Slack client that feels like a Unix shell.
//!
//! Conversations are navigated like directories (`ls`, `cd #general`,
//! `cd @alice`), history is read with `cat`, output can be piped through
//! `grep`, and `browse` / `live` open a full-screen conversation view with
//! threads, replies, edits and mention completion.
//!
//! # Architecture
//!
//! - [`api`]: the remote workspace client, an in-memory workspace and realtime sources
//! - [`cache`]: persisted user-name and conversation-list caches
//! - [`shell`]: command parsing, pipelines and the session executor
//! - [`notify`]: unread counts, notification sinks and the panel
//! - [`tui`]: the event loop, the session state machine and drawing
//! - [`config`]: configuration management
//! - [`cli`]: command-line interface
//! - [`error`]: error types and handling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use slack_shell::api::MemoryWorkspace;
//! use slack_shell::cache::WorkspaceCaches;
//! use slack_shell::config::Config;
//! use slack_shell::shell::{Executor, HttpConnector};
//!
//! # async fn demo() -> slack_shell::Result<()> {
//! let workspace = MemoryWorkspace::demo();
//! let identity = workspace.identity().clone();
//! let caches = WorkspaceCaches::in_memory(&identity.team_id);
//! let mut executor = Executor::new(workspace, identity, Config::default(), caches, Arc::new(HttpConnector));
//!
//! let outcome = executor.execute_line("ls | grep dev").await;
//! println!("{}", outcome.output);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod shell;
pub mod tui;
pub mod util;

pub use error::{Result, ShellError};
