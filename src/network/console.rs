use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Operator input, one line at a time
#[derive(Debug)]
pub struct Console {
    lines: mpsc::UnboundedReceiver<String>,
}

impl Console {
    /// Reads lines from standard input on a background task
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read console input");
                        break;
                    }
                }
            }
        });
        Console { lines: rx }
    }

    /// Uses an existing channel as the input source
    pub fn from_receiver(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Console { lines }
    }

    /// Next non-empty line, trimmed, if one is waiting
    pub fn try_next_line(&mut self) -> Option<String> {
        while let Ok(line) = self.lines.try_recv() {
            let line = line.trim();
            if !line.is_empty() {
                return Some(line.to_string());
            }
            trace!("Skipping empty console line");
        }
        None
    }
}

/// Hook for a device's busy indicator
pub trait StatusIndicator: Send {
    /// Called once per broadcast
    fn toggle_busy(&mut self);
}

/// Indicator that only logs its state
#[derive(Debug, Default)]
pub struct LogIndicator {
    busy: bool,
}

impl LogIndicator {
    pub fn is_on(&self) -> bool {
        self.busy
    }
}

impl StatusIndicator for LogIndicator {
    fn toggle_busy(&mut self) {
        self.busy = !self.busy;
        trace!(busy = self.busy, "Busy indicator toggled");
    }
}
