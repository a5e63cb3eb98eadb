//! UI / control event sources
//!
//! Everything funnels into one [`ChannelEvents`] queue: Ctrl+C, console
//! commands on stdin, or any thread holding a sender.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::media::{EventSource, UiEvent};

/// Event source backed by a crossbeam channel
pub struct ChannelEvents {
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
}

impl ChannelEvents {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Sender for injecting events from another thread
    pub fn sender(&self) -> Sender<UiEvent> {
        self.tx.clone()
    }

    /// Deliver `Quit` on Ctrl+C.
    ///
    /// The handler is process-wide; installing it twice is an error.
    pub fn install_ctrlc(&self) -> Result<()> {
        let tx = self.tx.clone();
        ctrlc::set_handler(move || {
            let _ = tx.send(UiEvent::Quit);
        })
        .map_err(|e| Error::Config(format!("Failed to install Ctrl+C handler: {}", e)))
    }

    /// Read console commands from stdin on a background thread.
    ///
    /// `q` or `quit` requests shutdown; other lines are passed through.
    pub fn watch_stdin(&self) -> Result<()> {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("relay-stdin".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    if tx.send(parse_command(&line)).is_err() {
                        break;
                    }
                }
            })?;
        Ok(())
    }
}

impl Default for ChannelEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for ChannelEvents {
    fn wait_event(&mut self, timeout: Duration) -> Option<UiEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            // Unreachable while we hold `tx`, but never spin
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                None
            }
        }
    }
}

fn parse_command(line: &str) -> UiEvent {
    match line.trim().to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => UiEvent::Quit,
        other => UiEvent::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("q"), UiEvent::Quit);
        assert_eq!(parse_command("  QUIT \n"), UiEvent::Quit);
        assert_eq!(parse_command("stats"), UiEvent::Other("stats".into()));
    }

    #[test]
    fn test_channel_events_timeout_and_delivery() {
        let mut events = ChannelEvents::new();
        assert_eq!(events.wait_event(Duration::from_millis(1)), None);

        let tx = events.sender();
        thread::spawn(move || tx.send(UiEvent::Quit).unwrap())
            .join()
            .unwrap();

        assert_eq!(events.wait_event(Duration::from_secs(1)), Some(UiEvent::Quit));
    }
}
