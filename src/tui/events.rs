//! Session events and key bindings.
//!
//! Every producer (terminal input, background tasks, the realtime source)
//! only ever sends [`AppEvent`]s into one unbounded queue. The session loop
//! is the single consumer.

use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::tasks::TaskResult;
use crate::api::realtime::RealtimeEvent;

/// Everything the session loop reacts to.
#[derive(Debug)]
pub enum AppEvent {
    /// Key press.
    Key(KeyEvent),
    /// Periodic redraw.
    Tick,
    /// Terminal resize.
    Resize(u16, u16),
    /// A background task finished.
    Task(TaskResult),
    /// Pushed by the realtime source.
    Realtime(RealtimeEvent),
}

/// The session's event queue.
pub fn channel() -> (UnboundedSender<AppEvent>, UnboundedReceiver<AppEvent>) {
    mpsc::unbounded_channel()
}

/// Reads terminal input on a dedicated thread.
pub struct EventHandler {
    _thread: thread::JoinHandle<()>,
}

impl EventHandler {
    /// Start forwarding terminal input into `tx`, with a tick every
    /// `tick_rate` of inactivity.
    pub fn spawn(tx: UnboundedSender<AppEvent>, tick_rate: Duration) -> Self {
        let handle = thread::spawn(move || loop {
            let event = if event::poll(tick_rate).unwrap_or(false) {
                match event::read() {
                    // Ignore key releases on terminals that report them
                    Ok(CrosstermEvent::Key(key)) if key.kind != KeyEventKind::Release => {
                        Some(AppEvent::Key(key))
                    }
                    Ok(CrosstermEvent::Resize(w, h)) => Some(AppEvent::Resize(w, h)),
                    _ => None,
                }
            } else {
                Some(AppEvent::Tick)
            };

            if let Some(event) = event {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Self { _thread: handle }
    }
}

/// Forward realtime events into the session queue until either side closes.
pub fn forward_realtime(
    mut rx: UnboundedReceiver<RealtimeEvent>,
    tx: UnboundedSender<AppEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if tx.send(AppEvent::Realtime(event)).is_err() {
                break;
            }
        }
    })
}

/// Key binding configuration for the conversation view.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    /// Leave the current view.
    pub back: Vec<KeyEvent>,
    /// Selection up.
    pub up: Vec<KeyEvent>,
    /// Selection down.
    pub down: Vec<KeyEvent>,
    /// Open thread / confirm.
    pub select: Vec<KeyEvent>,
    /// Reply.
    pub reply: Vec<KeyEvent>,
    /// New message.
    pub compose: Vec<KeyEvent>,
    /// Edit own message.
    pub edit: Vec<KeyEvent>,
    /// Delete own message.
    pub delete: Vec<KeyEvent>,
    /// Reload.
    pub reload: Vec<KeyEvent>,
    /// Notification panel.
    pub notifications: Vec<KeyEvent>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let key = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE);

        Self {
            back: vec![key('q'), KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)],
            up: vec![key('k'), KeyEvent::new(KeyCode::Up, KeyModifiers::NONE)],
            down: vec![key('j'), KeyEvent::new(KeyCode::Down, KeyModifiers::NONE)],
            select: vec![KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE)],
            reply: vec![key('r')],
            compose: vec![key('i')],
            edit: vec![key('e')],
            delete: vec![key('d')],
            reload: vec![KeyEvent::new(KeyCode::Char('R'), KeyModifiers::SHIFT), key('R')],
            notifications: vec![key('n')],
        }
    }
}

fn matches(bindings: &[KeyEvent], key: &KeyEvent) -> bool {
    bindings.iter().any(|k| {
        k.code == key.code
            // Terminals disagree on whether uppercase letters carry SHIFT
            && (k.modifiers == key.modifiers
                || matches!(k.code, KeyCode::Char(c) if c.is_uppercase())
                    && (key.modifiers - KeyModifiers::SHIFT).is_empty())
    })
}

impl KeyBindings {
    /// Leave the current view or sub-view.
    pub fn is_back(&self, key: &KeyEvent) -> bool {
        matches(&self.back, key)
    }

    /// Selection up.
    pub fn is_up(&self, key: &KeyEvent) -> bool {
        matches(&self.up, key)
    }

    /// Selection down.
    pub fn is_down(&self, key: &KeyEvent) -> bool {
        matches(&self.down, key)
    }

    /// Open / confirm.
    pub fn is_select(&self, key: &KeyEvent) -> bool {
        matches(&self.select, key)
    }

    /// Reply.
    pub fn is_reply(&self, key: &KeyEvent) -> bool {
        matches(&self.reply, key)
    }

    /// New message.
    pub fn is_compose(&self, key: &KeyEvent) -> bool {
        matches(&self.compose, key)
    }

    /// Edit.
    pub fn is_edit(&self, key: &KeyEvent) -> bool {
        matches(&self.edit, key)
    }

    /// Delete.
    pub fn is_delete(&self, key: &KeyEvent) -> bool {
        matches(&self.delete, key)
    }

    /// Reload.
    pub fn is_reload(&self, key: &KeyEvent) -> bool {
        matches(&self.reload, key)
    }

    /// Notification panel.
    pub fn is_notifications(&self, key: &KeyEvent) -> bool {
        matches(&self.notifications, key)
    }
}

/// Ctrl+C, honored in every mode.
pub fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let bindings = KeyBindings::default();
        assert!(bindings.is_down(&KeyEvent::new(KeyCode::Char('j'), KeyModifiers::NONE)));
        assert!(bindings.is_back(&KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(!bindings.is_back(&KeyEvent::new(KeyCode::Char('Q'), KeyModifiers::SHIFT)));
        assert!(bindings.is_reload(&KeyEvent::new(KeyCode::Char('R'), KeyModifiers::SHIFT)));
        assert!(bindings.is_reload(&KeyEvent::new(KeyCode::Char('R'), KeyModifiers::NONE)));
        assert!(!bindings.is_reload(&KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE)));
    }

    #[test]
    fn test_interrupt() {
        assert!(is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_interrupt(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
    }
}
