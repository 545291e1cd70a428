//! Key input readers.
//!
//! The keypad driver writes key identifiers to a FIFO, lircd writes decoded
//! remote-control events to a unix socket.  Both readers wait for their
//! endpoint to appear, forward what they read to the core and keep going
//! when the other side goes away.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::CoreEvent;
use crate::keymap::{LircEvent, LircKeymap};

const FIRST_RETRY: Duration = Duration::from_millis(500);
const MAX_RETRY: Duration = Duration::from_secs(5);

/// Doubling wait between attempts to open an endpoint.
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self { next: FIRST_RETRY }
    }

    fn reset(&mut self) {
        self.next = FIRST_RETRY;
    }

    /// Sleep for the current delay.  Returns false if cancelled meanwhile.
    async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_RETRY);
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

// ── keypad ────────────────────────────────────────────────────────────────────

fn open_fifo(path: &Path) -> std::io::Result<pipe::Receiver> {
    let mut options = pipe::OpenOptions::new();
    // keep a writer end of our own so the FIFO never reports EOF
    #[cfg(target_os = "linux")]
    options.read_write(true);
    options.open_receiver(path)
}

/// Forward keypad key identifiers as `CoreEvent::Key`.
pub async fn run_keypad(
    fifo: PathBuf,
    events: mpsc::Sender<CoreEvent>,
    cancel: CancellationToken,
) {
    info!("keypad: reading {:?}", fifo);
    let mut backoff = Backoff::new();
    loop {
        let receiver = match open_fifo(&fifo) {
            Ok(r) => r,
            Err(e) => {
                debug!("keypad: waiting for {:?}: {}", fifo, e);
                if !backoff.wait(&cancel).await {
                    break;
                }
                continue;
            }
        };
        backoff.reset();

        let mut lines = BufReader::new(receiver).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("keypad: stopped");
                    return;
                }
                line = lines.next_line() => line,
            };
            let key = match line {
                Ok(Some(line)) => line.trim().to_string(),
                Ok(None) => {
                    debug!("keypad: writer closed the FIFO");
                    break;
                }
                Err(e) => {
                    warn!("keypad: read error: {}", e);
                    break;
                }
            };
            if key.is_empty() {
                continue;
            }
            debug!("keypad: key {}", key);
            if events.send(CoreEvent::Key(key)).await.is_err() {
                return;
            }
        }
        if !backoff.wait(&cancel).await {
            break;
        }
    }
    info!("keypad: stopped");
}

// ── lirc ──────────────────────────────────────────────────────────────────────

/// Forward remote-control presses, filtered and resolved through `keymap`,
/// as `CoreEvent::Invoke`.
pub async fn run_lirc(
    socket: PathBuf,
    keymap: LircKeymap,
    events: mpsc::Sender<CoreEvent>,
    cancel: CancellationToken,
) {
    info!("lirc: connecting to {:?}", socket);
    let mut backoff = Backoff::new();
    loop {
        let stream = match UnixStream::connect(&socket).await {
            Ok(s) => s,
            Err(e) => {
                debug!("lirc: waiting for {:?}: {}", socket, e);
                if !backoff.wait(&cancel).await {
                    break;
                }
                continue;
            }
        };
        info!("lirc: connected");
        backoff.reset();

        let mut lines = BufReader::new(stream).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("lirc: stopped");
                    return;
                }
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    warn!("lirc: lircd closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("lirc: read error: {}", e);
                    break;
                }
            };
            let Some(event) = LircEvent::parse(&line) else {
                debug!("lirc: ignoring {:?}", line);
                continue;
            };
            let Some((command, arg)) = keymap.resolve(&event) else {
                continue;
            };
            debug!("lirc: {} → {} {}", event.key_name, command, arg);
            let evt = CoreEvent::Invoke {
                command,
                arg: Some(arg),
            };
            if events.send(evt).await.is_err() {
                return;
            }
        }
        if !backoff.wait(&cancel).await {
            break;
        }
    }
    info!("lirc: stopped");
}
