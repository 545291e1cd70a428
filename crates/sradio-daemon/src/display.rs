//! Display scheduler.
//!
//! Every scroll period the scheduler asks the core for a [`Screen`], moves
//! queued metadata lines into a rolling window and renders the formatted
//! frame through a [`DisplaySink`].  The first row is the title, the rest
//! are content rows.

use std::collections::VecDeque;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::CoreEvent;
use crate::metadata::{ContentQueue, Layout};

/// Title row: a left-aligned label and a right-aligned status such as the
/// clock or a recording time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title {
    pub label: String,
    pub status: String,
}

impl Title {
    pub fn new(label: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            status: status.into(),
        }
    }

    /// Label with the wall clock as status.
    pub fn with_clock(label: impl Into<String>, now: DateTime<Local>) -> Self {
        Self::new(label, now.format("%H:%M").to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Show the stream metadata window.
    Metadata,
    /// Show these lines; the metadata window is emptied.
    Lines(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub title: Title,
    pub content: Content,
}

/// Implemented by the radio and the player; the core picks the active one.
pub trait ContentProvider {
    fn title(&mut self, now: DateTime<Local>) -> Title;
    fn content(&self) -> Content;

    fn screen(&mut self, now: DateTime<Local>) -> Screen {
        Screen {
            title: self.title(now),
            content: self.content(),
        }
    }
}

// ── formatting ────────────────────────────────────────────────────────────────

fn fit(text: &str, width: usize) -> String {
    let truncated: String = text.chars().take(width).collect();
    format!("{:<width$}", truncated, width = width)
}

/// `label` padded or truncated so that `status` ends in the last column.
pub fn format_title(title: &Title, cols: usize) -> String {
    let status: String = title.status.chars().take(cols).collect();
    if status.is_empty() {
        return fit(&title.label, cols);
    }
    let room = cols.saturating_sub(status.chars().count() + 1);
    if room == 0 {
        return fit(&status, cols);
    }
    format!("{} {}", fit(&title.label, room), status)
}

pub fn format_line(line: &str, cols: usize) -> String {
    fit(line, cols)
}

// ── sinks ─────────────────────────────────────────────────────────────────────

/// Rendering target.  The hardware LCD driver lives outside this crate.
pub trait DisplaySink: Send {
    /// Draw a frame: title first, then content rows, all `cols` wide.
    fn render(&mut self, rows: &[String]);
    fn clear(&mut self);
}

/// Bordered box on stdout.
pub struct ConsoleDisplay {
    rows: usize,
    cols: usize,
    clear_screen: bool,
}

impl ConsoleDisplay {
    pub fn new(layout: Layout, clear_screen: bool) -> Self {
        Self {
            rows: layout.rows,
            cols: layout.cols,
            clear_screen,
        }
    }

    fn blank(&self) -> String {
        self.frame(&vec![" ".repeat(self.cols); self.rows])
    }

    fn frame(&self, rows: &[String]) -> String {
        let border = format!("-{}-", "-".repeat(self.cols));
        let mut out = String::new();
        out.push_str(&border);
        out.push('\n');
        for row in rows {
            out.push_str(&format!("|{}|\n", row));
        }
        out.push_str(&border);
        out.push('\n');
        out
    }
}

impl DisplaySink for ConsoleDisplay {
    fn render(&mut self, rows: &[String]) {
        let mut stdout = std::io::stdout().lock();
        if self.clear_screen {
            let _ = write!(stdout, "\x1bc");
        }
        let _ = write!(stdout, "{}", self.frame(rows));
        let _ = stdout.flush();
    }

    fn clear(&mut self) {
        let mut stdout = std::io::stdout().lock();
        if self.clear_screen {
            let _ = write!(stdout, "\x1bc");
        } else {
            // the terminal keeps its history, so draw an empty box instead
            let _ = write!(stdout, "{}", self.blank());
        }
        let _ = stdout.flush();
    }
}

// ── scheduler ─────────────────────────────────────────────────────────────────

pub struct DisplayScheduler {
    layout: Layout,
    queue: ContentQueue,
    window: VecDeque<String>,
}

impl DisplayScheduler {
    pub fn new(layout: Layout, queue: ContentQueue) -> Self {
        Self {
            layout,
            queue,
            window: VecDeque::new(),
        }
    }

    fn depth(&self) -> usize {
        self.layout.rows.saturating_sub(1)
    }

    /// Build the next frame for `screen`.
    pub fn frame(&mut self, screen: &Screen) -> Vec<String> {
        let cols = self.layout.cols;
        let depth = self.depth();
        let mut rows = vec![format_title(&screen.title, cols)];

        match &screen.content {
            Content::Metadata => {
                for line in self.queue.pop_up_to(depth) {
                    if self.window.len() == depth {
                        self.window.pop_front();
                    }
                    self.window.push_back(line);
                }
                rows.extend(self.window.iter().map(|l| format_line(l, cols)));
            }
            Content::Lines(lines) => {
                self.window.clear();
                rows.extend(lines.iter().take(depth).map(|l| format_line(l, cols)));
            }
        }
        rows
    }

    /// Refresh every `period` until cancelled or the core is gone, then clear
    /// the sink.
    pub async fn run(
        mut self,
        mut sink: Box<dyn DisplaySink>,
        period: Duration,
        events: mpsc::Sender<CoreEvent>,
        cancel: CancellationToken,
    ) {
        info!("display: refreshing every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (tx, rx) = oneshot::channel();
            if events.send(CoreEvent::Render(tx)).await.is_err() {
                debug!("display: core is gone");
                break;
            }
            let screen = tokio::select! {
                _ = cancel.cancelled() => break,
                screen = rx => screen,
            };
            let Ok(screen) = screen else {
                debug!("display: core dropped the render request");
                break;
            };
            let rows = self.frame(&screen);
            sink.render(&rows);
        }

        sink.clear();
        info!("display: stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn scheduler(rows: usize, queue: &ContentQueue) -> DisplayScheduler {
        DisplayScheduler::new(Layout { rows, cols: 16 }, queue.clone())
    }

    fn metadata_screen() -> Screen {
        Screen {
            title: Title::new("WDR2", "12:00"),
            content: Content::Metadata,
        }
    }

    #[test]
    fn test_format_title_right_aligns_status() {
        assert_eq!(
            format_title(&Title::new("WDR2", "12:34"), 16),
            "WDR2       12:34"
        );
        assert_eq!(
            format_title(&Title::new("A very long channel name", "12:34"), 16),
            "A very lon 12:34"
        );
        assert_eq!(format_title(&Title::new("no recordings", ""), 16), "no recordings   ");
    }

    #[test]
    fn test_format_line_pads_and_truncates() {
        assert_eq!(format_line("abc", 5), "abc  ");
        assert_eq!(format_line("abcdefgh", 5), "abcde");
        assert_eq!(format_line("äöüßx", 4), "äöüß");
    }

    #[test]
    fn test_window_drains_one_page_per_tick() {
        let queue = ContentQueue::new();
        for line in ["one", "two", "three", "four"] {
            queue.push(line);
        }
        let mut scheduler = scheduler(3, &queue);

        let rows = scheduler.frame(&metadata_screen());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].trim_end(), "one");
        assert_eq!(rows[2].trim_end(), "two");

        let rows = scheduler.frame(&metadata_screen());
        assert_eq!(rows[1].trim_end(), "three");
        assert_eq!(rows[2].trim_end(), "four");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_window_keeps_last_line_while_idle() {
        let queue = ContentQueue::new();
        let mut scheduler = scheduler(2, &queue);
        queue.push("Artist - Title");
        scheduler.frame(&metadata_screen());
        let rows = scheduler.frame(&metadata_screen());
        assert_eq!(rows[1].trim_end(), "Artist - Title");
    }

    #[test]
    fn test_lines_replace_window() {
        let queue = ContentQueue::new();
        let mut scheduler = scheduler(2, &queue);
        queue.push("stale");
        scheduler.frame(&metadata_screen());

        let screen = Screen {
            title: Title::new("no recordings", ""),
            content: Content::Lines(vec![]),
        };
        assert_eq!(scheduler.frame(&screen).len(), 1);
        // the window stays empty when metadata is shown again
        assert_eq!(scheduler.frame(&metadata_screen()).len(), 1);
    }

    #[test]
    fn test_console_frame() {
        let console = ConsoleDisplay::new(Layout { rows: 2, cols: 4 }, false);
        assert_eq!(
            console.frame(&["ab  ".to_string()]),
            "------\n|ab  |\n------\n"
        );
        assert_eq!(console.blank(), "------\n|    |\n|    |\n------\n");
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<Vec<String>>>>,
        cleared: Arc<Mutex<bool>>,
    }

    impl DisplaySink for RecordingSink {
        fn render(&mut self, rows: &[String]) {
            self.frames.lock().unwrap().push(rows.to_vec());
        }

        fn clear(&mut self) {
            *self.cleared.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn test_run_renders_and_clears_on_shutdown() {
        let queue = ContentQueue::new();
        let scheduler = scheduler(2, &queue);
        let sink = RecordingSink::default();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(scheduler.run(
            Box::new(sink.clone()),
            Duration::from_millis(10),
            tx,
            cancel.clone(),
        ));

        // answer two render requests like the core would
        for _ in 0..2 {
            match rx.recv().await {
                Some(CoreEvent::Render(reply)) => {
                    let _ = reply.send(Screen {
                        title: Title::new("BR", "08:15"),
                        content: Content::Lines(vec!["1/3".into()]),
                    });
                }
                _ => panic!("expected a render request"),
            }
        }
        // let the second frame be drawn before cancelling
        for _ in 0..100 {
            if sink.frames.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        let frames = sink.frames.lock().unwrap();
        assert!(frames.len() >= 2);
        assert_eq!(frames[0], vec!["BR         08:15", "1/3             "]);
        assert!(*sink.cleared.lock().unwrap());
    }
}
