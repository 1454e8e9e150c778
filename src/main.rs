//! slack-shell: a terminal Slack client with a Unix shell feel.

use std::process::ExitCode;

use slack_shell::cli;

fn main() -> ExitCode {
    // Logging is initialized by cli::run once the config is known
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");

            if std::env::var("RUST_BACKTRACE").is_ok() {
                if let Some(source) = std::error::Error::source(&e) {
                    eprintln!("Caused by: {source}");
                }
            }

            ExitCode::from(e.exit_code() as u8)
        }
    }
}
