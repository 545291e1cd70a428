/// Stream metadata pipeline.
///
/// ```text
///   decoder stdout ─┐
///                   ├── forward_lines ──► mpsc<String> ──► read_metadata ──► ContentQueue
///   decoder stderr ─┘                                       (extract, wrap)      │
///                                                                               ▼
///                                                                     DisplayScheduler
/// ```
///
/// One reader per streaming session.  Lines reach the queue in read order.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lines containing this marker are shown verbatim.
const ERROR_MARKER: &str = "error:";

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)StreamTitle='(.*?)';").expect("valid title regex"))
}

// ── ContentQueue ──────────────────────────────────────────────────────────────

/// FIFO of pre-wrapped display lines.  Filled by the metadata reader, drained
/// by the display scheduler.
#[derive(Clone, Default)]
pub struct ContentQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl ContentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lock().push_back(line.into());
    }

    /// Remove and return up to `max` lines from the front.
    pub fn pop_up_to(&self, max: usize) -> Vec<String> {
        let mut q = self.lock();
        let n = max.min(q.len());
        q.drain(..n).collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Replace everything queued with `count` blank lines, enough to wipe
    /// the content rows of the display.
    pub fn blank(&self, count: usize) {
        let mut q = self.lock();
        q.clear();
        q.extend(std::iter::repeat(" ".to_string()).take(count));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

// ── text processing ───────────────────────────────────────────────────────────

/// Turn one decoder output line into display text, or `None` if the line
/// carries nothing to show.
pub fn parse_line(line: &str) -> Option<String> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }
    if line.contains(ERROR_MARKER) {
        return Some(line.to_string());
    }
    let title = title_regex().captures(line)?.get(1)?.as_str().trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

/// Word-wrap `text` into segments of at most `cols` characters.  Breaks at the
/// last interior space of each window, hard-breaks words longer than `cols`.
pub fn wrap(text: &str, cols: usize) -> Vec<String> {
    let cols = cols.max(1);
    let mut segments = Vec::new();
    let mut rest: Vec<char> = text.trim().chars().collect();

    while rest.len() > cols {
        let split = rest[..=cols].iter().rposition(|c| *c == ' ').filter(|&i| i > 0);
        let (head, tail) = match split {
            // soft break: the blank itself is dropped
            Some(i) => (rest[..i].to_vec(), rest[i + 1..].to_vec()),
            None => (rest[..cols].to_vec(), rest[cols..].to_vec()),
        };
        let head: String = head.into_iter().collect();
        segments.push(head.trim_end().to_string());
        rest = tail;
        while rest.first() == Some(&' ') {
            rest.remove(0);
        }
    }
    if !rest.is_empty() {
        segments.push(rest.into_iter().collect());
    }
    segments
}

/// Six asterisks centred in the column width.
pub fn separator(cols: usize) -> String {
    format!("{}{}", " ".repeat(cols.saturating_sub(6) / 2), "*".repeat(6))
}

// ── reader task ───────────────────────────────────────────────────────────────

/// Forward raw lines from one output stream.  Invalid UTF-8 is decoded
/// lossily; a read error ends the stream.
pub(crate) async fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("metadata: read error: {}", e);
                break;
            }
        }
    }
}

/// Geometry the pipeline formats for.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub rows: usize,
    pub cols: usize,
}

/// Consume decoder output until cancelled or every stream has ended.
pub(crate) async fn read_metadata(
    mut lines: mpsc::Receiver<String>,
    queue: ContentQueue,
    layout: Layout,
    cancel: CancellationToken,
) {
    debug!("metadata: reader started");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            debug!("metadata: decoder output closed");
            break;
        };
        let Some(text) = parse_line(&line) else {
            continue;
        };
        debug!("metadata: {}", text);
        if text.contains(ERROR_MARKER) {
            queue.push(text);
        } else {
            for segment in wrap(&text, layout.cols) {
                queue.push(segment);
            }
        }
        queue.push(separator(layout.cols));
    }

    if cancel.is_cancelled() {
        // deliberate stop: blank the content rows
        queue.blank(layout.rows.saturating_sub(1));
        debug!("metadata: reader stopped on request");
    } else {
        // keep what is queued, the stream may still be reported by the caller
        debug!("metadata: reader ended with stream");
    }
}
