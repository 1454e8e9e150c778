//! The interactive terminal session.
//!
//! - [`events`]: the single event queue and its producers
//! - [`tasks`]: background fetches and writes, reported as events
//! - [`view`]: the conversation view (messages, threads, compose)
//! - [`state`]: the session state machine driving all of the above
//! - `app`: terminal setup, the event loop and drawing

mod app;
mod components;
pub mod events;
pub mod state;
pub mod tasks;
mod theme;
pub mod view;

pub use app::{run, RunOptions};
pub use events::{AppEvent, KeyBindings};
pub use state::{Mode, Panel, Session, ShellState};
pub use tasks::{Task, TaskOutcome, TaskResult, TaskRunner};
pub use theme::{available_themes, Theme};
pub use view::{Compose, ComposeTarget, ConversationView, Members, ViewSnapshot};
