/// Decoder process supervisor.
///
/// Owns at most one external decoder process (mpg123 by default) at a time.
/// For streaming sources the process output is handed to a metadata reader:
///
/// ```text
///   Decoder::start(url, streaming = true)
///         │
///         ├── child process        ← binary options... url
///         ├── forward_lines ×2     ← stdout / stderr
///         └── read_metadata        ← cancel token owned by the session
/// ```
///
/// Liveness is polled (`is_active`), never awaited, so callers are only
/// blocked during the bounded join in `stop()`.
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use sradio_proto::config::DecoderConfig;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metadata::{self, ContentQueue, Layout};

/// How long `stop()` waits for the metadata reader.
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a duration probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("decoder '{binary}' failed to start: {source}")]
    StartFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },
}

struct MetadataReader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Decoder {
    binary: String,
    options: Vec<String>,
    probe: Vec<String>,
    queue: ContentQueue,
    layout: Layout,
    process: Option<Child>,
    reader: Option<MetadataReader>,
}

impl Decoder {
    pub fn new(config: &DecoderConfig, queue: ContentQueue, layout: Layout) -> Self {
        Self {
            binary: config.binary.clone(),
            options: config.options.clone(),
            probe: config.probe.clone(),
            queue,
            layout,
            process: None,
            reader: None,
        }
    }

    /// Arguments for `source`: playlists are passed with `-@`.
    pub fn build_args(&self, source: &str) -> Vec<String> {
        let mut args = self.options.clone();
        if source.ends_with(".m3u") {
            args.push("-@".to_string());
        }
        args.push(source.to_string());
        args
    }

    /// Start playing `source`.  Any running session is stopped first, so two
    /// decoders never run at once.
    pub async fn start(&mut self, source: &str, streaming: bool) -> Result<(), DecoderError> {
        self.stop().await;

        let args = self.build_args(source);
        debug!("decoder: {} {:?}", self.binary, args);

        let output = || {
            if streaming {
                Stdio::piped()
            } else {
                Stdio::null()
            }
        };
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DecoderError::StartFailed {
                binary: self.binary.clone(),
                source,
            })?;
        info!("decoder: started pid={:?} source={}", child.id(), source);

        if streaming {
            // a new stream starts on an empty page, whatever the display
            // still shows from the previous one
            self.queue.blank(self.layout.rows.saturating_sub(1));
            let (line_tx, line_rx) = mpsc::channel::<String>(64);
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(metadata::forward_lines(stdout, line_tx.clone()));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(metadata::forward_lines(stderr, line_tx));
            }
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(metadata::read_metadata(
                line_rx,
                self.queue.clone(),
                self.layout,
                cancel.clone(),
            ));
            self.reader = Some(MetadataReader { cancel, handle });
        }

        self.process = Some(child);
        Ok(())
    }

    /// Suspend the decoder.  No-op without a live process.
    pub fn pause(&mut self) {
        debug!("decoder: pausing playback");
        self.signal(Signal::Stop);
    }

    /// Continue a suspended decoder.  No-op without a live process.
    pub fn resume(&mut self) {
        debug!("decoder: continuing playback");
        self.signal(Signal::Cont);
    }

    /// Terminate the decoder and join its reader.  Safe to call when idle.
    pub async fn stop(&mut self) {
        if self.process.is_none() && self.reader.is_none() {
            return;
        }
        debug!("decoder: stopping ...");

        // cancel first so the reader knows the end is deliberate
        if let Some(reader) = &self.reader {
            reader.cancel.cancel();
        }
        if let Some(mut child) = self.process.take() {
            if let Err(e) = child.kill().await {
                debug!("decoder: kill failed (already exited?): {}", e);
            }
        }
        if let Some(reader) = self.reader.take() {
            match tokio::time::timeout(READER_JOIN_TIMEOUT, reader.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("decoder: metadata reader panicked: {}", e),
                Err(_) => warn!("decoder: metadata reader did not stop in time"),
            }
        }
        debug!("decoder: ... done stopping");
    }

    /// Forget a process that exited on its own.  The reader is aborted
    /// without clearing queued content.
    pub fn reap(&mut self) {
        if let Some(mut child) = self.process.take() {
            match child.try_wait() {
                Ok(Some(status)) => info!("decoder: exited on its own ({})", status),
                _ => debug!("decoder: reaped"),
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.handle.abort();
        }
    }

    /// True iff a process exists and has not exited.
    pub fn is_active(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|c| c.id())
    }

    /// The configured duration probe, detached from this decoder so it can
    /// run on its own task.
    pub fn duration_probe(&self) -> DurationProbe {
        DurationProbe {
            argv: self.probe.clone(),
        }
    }

    fn signal(&mut self, sig: Signal) {
        if !self.is_active() {
            return;
        }
        if let Some(pid) = self.pid() {
            send_signal(pid, sig);
        }
    }
}

/// Command that prints the total length of a local file in seconds.
#[derive(Debug, Clone)]
pub struct DurationProbe {
    argv: Vec<String>,
}

impl DurationProbe {
    pub async fn run(&self, path: &Path) -> Option<Duration> {
        let (binary, args) = self.argv.split_first()?;
        let run = Command::new(binary)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(PROBE_TIMEOUT, run).await {
            Ok(Ok(out)) if out.status.success() => out,
            Ok(Ok(out)) => {
                debug!("decoder: probe {:?} failed: {}", path, out.status);
                return None;
            }
            Ok(Err(e)) => {
                debug!("decoder: probe could not run: {}", e);
                return None;
            }
            Err(_) => {
                debug!("decoder: probe timed out for {:?}", path);
                return None;
            }
        };
        parse_seconds(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.cancel.cancel();
        }
    }
}

fn parse_seconds(text: &str) -> Option<Duration> {
    let secs: f64 = text.lines().next()?.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Stop,
    Cont,
}

#[cfg(unix)]
fn send_signal(pid: u32, sig: Signal) {
    let signo = match sig {
        Signal::Stop => libc::SIGSTOP,
        Signal::Cont => libc::SIGCONT,
    };
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if rc != 0 {
        debug!(
            "decoder: kill({}, {:?}) failed: {}",
            pid,
            sig,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, sig: Signal) {
    warn!("decoder: cannot send {:?} to {} on this platform", sig, pid);
}
