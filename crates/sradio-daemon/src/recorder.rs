//! Stream recorder.
//!
//! Copies a channel's stream into `<dir>/<YYYYMMDD_HHMMSS>_<name><ext>` on a
//! worker task of its own.  The copy loop runs until its cancellation token
//! fires or the stream ends; duration limits are enforced by whoever holds
//! the token (see `RadioMode::enforce_recording_limit`).

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::StreamExt;
use reqwest::Client;
use sradio_proto::channels::Channel;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop()` waits for the worker to close its file.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no media entry in playlist {0}")]
    Playlist(String),
    #[error("cannot write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cancelled before the stream was opened")]
    Cancelled,
}

/// Progress of a recording as seen from outside the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingStatus {
    Connecting,
    Recording { path: PathBuf, since: DateTime<Local> },
    Finished(PathBuf),
    Failed(String),
}

impl RecordingStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, RecordingStatus::Finished(_) | RecordingStatus::Failed(_))
    }
}

pub struct RecordingJob {
    channel: Channel,
    cancel: CancellationToken,
    status: watch::Receiver<RecordingStatus>,
    handle: JoinHandle<()>,
}

impl RecordingJob {
    /// The worker is still running and has not reported an outcome.
    fn is_live(&self) -> bool {
        !self.handle.is_finished() && !self.status.borrow().is_done()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn status(&self) -> RecordingStatus {
        self.status.borrow().clone()
    }

    /// Time spent copying so far; `None` while still connecting.
    pub fn elapsed(&self, now: DateTime<Local>) -> Option<Duration> {
        match &*self.status.borrow() {
            RecordingStatus::Recording { since, .. } => (now - *since).to_std().ok(),
            _ => None,
        }
    }
}

pub struct Recorder {
    dir: PathBuf,
    client: Client,
    job: Option<RecordingJob>,
}

impl Recorder {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            client: Client::new(),
            job: None,
        }
    }

    /// True while a job exists that has neither finished nor failed.
    pub fn is_recording(&self) -> bool {
        self.job().is_some()
    }

    pub fn job(&self) -> Option<&RecordingJob> {
        self.job.as_ref().filter(|j| j.is_live())
    }

    /// Start recording `channel`.  A finished job is discarded first; a
    /// running one is left alone.
    pub fn start(&mut self, channel: Channel) {
        if self.is_recording() {
            debug!("recorder: already recording");
            return;
        }
        self.job = None;

        let (status_tx, status_rx) = watch::channel(RecordingStatus::Connecting);
        let cancel = CancellationToken::new();
        let worker = record_stream(
            self.client.clone(),
            channel.clone(),
            self.dir.clone(),
            cancel.clone(),
            status_tx.clone(),
        );
        let handle = tokio::spawn(async move {
            if let Err(e) = worker.await {
                match e {
                    RecordError::Cancelled => debug!("recorder: {}", e),
                    RecordError::Playlist(_) => warn!("recorder: {}", e),
                    _ => error!("recorder: {}", e),
                }
                let _ = status_tx.send(RecordingStatus::Failed(e.to_string()));
            }
        });

        info!("recorder: recording {}", channel.name);
        self.job = Some(RecordingJob {
            channel,
            cancel,
            status: status_rx,
            handle,
        });
    }

    /// Ask the worker to stop without waiting for it.
    pub fn request_stop(&self) {
        if let Some(job) = &self.job {
            job.cancel.cancel();
        }
    }

    /// Cancel the running job and wait (bounded) for its worker.
    pub async fn stop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        job.cancel.cancel();
        match tokio::time::timeout(WORKER_JOIN_TIMEOUT, job.handle).await {
            Ok(Ok(())) => info!("recorder: stopped recording {}", job.channel.name),
            Ok(Err(e)) => warn!("recorder: worker panicked: {}", e),
            Err(_) => warn!("recorder: worker did not stop in time"),
        }
    }
}

// ── worker ────────────────────────────────────────────────────────────────────

async fn record_stream(
    client: Client,
    channel: Channel,
    dir: PathBuf,
    cancel: CancellationToken,
    status: watch::Sender<RecordingStatus>,
) -> Result<PathBuf, RecordError> {
    let response = open(&client, &channel.url, &cancel).await?;
    let listed_type = content_type(&response);

    let response = if is_playlist(&channel.url, listed_type.as_deref()) {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(RecordError::Cancelled),
            body = response.text() => body.map_err(|source| RecordError::Http {
                url: channel.url.clone(),
                source,
            })?,
        };
        let media_url = first_playlist_entry(&body)
            .ok_or_else(|| RecordError::Playlist(channel.url.clone()))?;
        debug!("recorder: playlist {} → {}", channel.url, media_url);
        open(&client, &media_url, &cancel).await?
    } else {
        response
    };

    let ext = extension_for(content_type(&response).as_deref());
    let started = Local::now();
    let path = dir.join(recording_file_name(started, &channel.name, ext));
    let io_err = |source| RecordError::Io {
        path: path.clone(),
        source,
    };
    let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;

    info!("recorder: writing {:?}", path);
    let _ = status.send(RecordingStatus::Recording {
        path: path.clone(),
        since: started,
    });

    let mut body = response.bytes_stream();
    let mut written: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            debug!("recorder: cancelled");
            break;
        }
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => {
                file.write_all(&bytes).await.map_err(io_err)?;
                written += bytes.len() as u64;
            }
            Some(Err(e)) => {
                debug!("recorder: stream error: {}", e);
                break;
            }
            None => {
                debug!("recorder: stream ended");
                break;
            }
        }
    }
    file.flush().await.map_err(io_err)?;

    info!("recorder: finished {:?} ({} bytes)", path, written);
    let _ = status.send(RecordingStatus::Finished(path.clone()));
    Ok(path)
}

async fn open(
    client: &Client,
    url: &str,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, RecordError> {
    let http_err = |source| RecordError::Http {
        url: url.to_string(),
        source,
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(RecordError::Cancelled),
        resp = client.get(url).send() => resp
            .and_then(|r| r.error_for_status())
            .map_err(http_err),
    }
}

fn content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
}

fn is_playlist(url: &str, content_type: Option<&str>) -> bool {
    matches!(content_type, Some("audio/x-mpegurl") | Some("audio/mpegurl"))
        || url.ends_with(".m3u")
}

/// File extension for a stream content type; unknown types are taken as mp3.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some("audio/mpeg") => ".mp3",
        Some("application/ogg") | Some("audio/ogg") => ".ogg",
        other => {
            debug!("recorder: unknown content type {:?}, assuming mp3", other);
            ".mp3"
        }
    }
}

/// First entry of an m3u playlist that is neither blank nor a comment.
pub fn first_playlist_entry(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
}

/// Channel names end up in file names: keep alphanumerics, `-`, `_` and `.`.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "stream".to_string()
    } else {
        cleaned
    }
}

pub fn recording_file_name(at: DateTime<Local>, channel_name: &str, ext: &str) -> String {
    format!(
        "{}_{}{}",
        at.format("%Y%m%d_%H%M%S"),
        sanitize_name(channel_name),
        ext
    )
}
