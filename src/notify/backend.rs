//! Side effects of a delivered notification.

use std::io::Write;
use std::process::{Command, Stdio};

use crossterm::{execute, terminal::SetTitle};
use parking_lot::Mutex;
use tracing::debug;

/// Where the bell, desktop and title sinks write.
pub trait NotifyBackend: Send + Sync {
    /// Ring the terminal bell.
    fn ring_bell(&self);

    /// Show a desktop notification.
    fn desktop(&self, title: &str, body: &str);

    /// Set the terminal window title.
    fn set_title(&self, title: &str);
}

/// Writes to the controlling terminal and the platform notifier.
#[derive(Debug, Default)]
pub struct TerminalBackend;

impl NotifyBackend for TerminalBackend {
    fn ring_bell(&self) {
        let mut out = std::io::stdout();
        if let Err(e) = out.write_all(b"\x07").and_then(|()| out.flush()) {
            debug!("Bell failed: {e}");
        }
    }

    fn desktop(&self, title: &str, body: &str) {
        let mut command = if cfg!(target_os = "macos") {
            let script = format!(
                "display notification {} with title {}",
                apple_script_string(body),
                apple_script_string(title)
            );
            let mut c = Command::new("osascript");
            c.arg("-e").arg(script);
            c
        } else {
            let mut c = Command::new("notify-send");
            c.arg(title).arg(body);
            c
        };

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Reap the child off the event loop
        std::thread::spawn(move || {
            if let Err(e) = command.status() {
                debug!("Desktop notification unavailable: {e}");
            }
        });
    }

    fn set_title(&self, title: &str) {
        if let Err(e) = execute!(std::io::stdout(), SetTitle(title)) {
            debug!("Title update failed: {e}");
        }
    }
}

fn apple_script_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A recorded side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Bell rung.
    Bell,
    /// Desktop notification shown.
    Desktop {
        /// Title line.
        title: String,
        /// Body line.
        body: String,
    },
    /// Title set.
    Title(String),
}

/// Records effects instead of performing them.
#[derive(Debug, Default)]
pub struct CapturingBackend {
    effects: Mutex<Vec<Effect>>,
}

impl CapturingBackend {
    /// Effects so far, in order.
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }
}

impl NotifyBackend for CapturingBackend {
    fn ring_bell(&self) {
        self.effects.lock().push(Effect::Bell);
    }

    fn desktop(&self, title: &str, body: &str) {
        self.effects.lock().push(Effect::Desktop {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    fn set_title(&self, title: &str) {
        self.effects.lock().push(Effect::Title(title.to_string()));
    }
}
