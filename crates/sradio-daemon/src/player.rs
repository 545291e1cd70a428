//! Player mode: browse and play the recordings directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use sradio_proto::protocol::{Command, Scope};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::decoder::Decoder;
use crate::dispatch::CommandSpec;
use crate::display::{Content, ContentProvider, Title};
use crate::radio::format_elapsed;

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec::fixed("exit_playmode", Scope::Player, Command::ExitPlaymode),
    CommandSpec::fixed("toggle_play", Scope::Player, Command::TogglePlay),
    CommandSpec::fixed("stop_play", Scope::Player, Command::StopPlay),
    CommandSpec::fixed("next_recording", Scope::Player, Command::NextRecording),
    CommandSpec::fixed("prev_recording", Scope::Player, Command::PrevRecording),
];

/// Regular files in `dir`, sorted by name.  Names start with a timestamp, so
/// the newest recording is last.
pub fn list_recordings(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("player: cannot read {:?}: {}", dir, e);
            return Vec::new();
        }
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Play time that excludes paused intervals.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    started: Instant,
    paused_at: Option<Instant>,
}

impl PlaybackClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started: now,
            paused_at: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Shift the start forward by the length of the pause.
    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.started += now.saturating_duration_since(paused_at);
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        let until = self.paused_at.unwrap_or(now);
        until.saturating_duration_since(self.started)
    }
}

struct Loaded {
    path: PathBuf,
    clock: PlaybackClock,
    total: Option<Duration>,
}

pub struct PlayerMode {
    dir: PathBuf,
    recordings: Vec<PathBuf>,
    index: Option<usize>,
    loaded: Option<Loaded>,
}

impl PlayerMode {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            recordings: Vec::new(),
            index: None,
            loaded: None,
        }
    }

    /// 0-based index of the selected recording.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.loaded
            .as_ref()
            .map(|l| l.clock.is_paused())
            .unwrap_or(false)
    }

    /// Rescan the directory and select the newest recording.
    pub fn enter(&mut self) {
        self.loaded = None;
        self.recordings = list_recordings(&self.dir);
        self.index = self.recordings.len().checked_sub(1);
        info!(
            "player: {} recording(s) in {:?}",
            self.recordings.len(),
            self.dir
        );
    }

    pub async fn exit(&mut self, decoder: &mut Decoder) {
        self.stop_play(decoder).await;
        self.recordings.clear();
        self.index = None;
    }

    /// Play, pause or resume.  Returns the recording that just started, whose
    /// total length is still to be probed.
    pub async fn toggle_play(&mut self, decoder: &mut Decoder) -> Option<PathBuf> {
        if let Some(loaded) = &mut self.loaded {
            let now = Instant::now();
            if loaded.clock.is_paused() {
                decoder.resume();
                loaded.clock.resume(now);
            } else {
                decoder.pause();
                loaded.clock.pause(now);
            }
            return None;
        }

        let Some(path) = self.index.and_then(|i| self.recordings.get(i)).cloned() else {
            debug!("player: nothing to play");
            return None;
        };
        if let Err(e) = decoder.start(&path.to_string_lossy(), false).await {
            error!("player: {}", e);
            return None;
        }
        info!("player: playing {:?}", path);
        self.loaded = Some(Loaded {
            path: path.clone(),
            clock: PlaybackClock::start(Instant::now()),
            total: None,
        });
        Some(path)
    }

    /// Store the probed length of `path` if it is still the one loaded.
    pub fn set_total(&mut self, path: &Path, total: Option<Duration>) {
        match &mut self.loaded {
            Some(loaded) if loaded.path == path => {
                debug!("player: {:?} is {:?} long", path, total);
                loaded.total = total;
            }
            _ => debug!("player: length of {:?} arrived after it was stopped", path),
        }
    }

    pub async fn stop_play(&mut self, decoder: &mut Decoder) {
        if self.loaded.take().is_some() {
            info!("player: stopped");
        }
        decoder.stop().await;
    }

    /// Playback finished or the decoder died: back to browsing.
    pub fn playback_ended(&mut self) {
        if self.loaded.take().is_some() {
            info!("player: playback ended");
        }
    }

    pub fn next_recording(&mut self) {
        self.step(1);
    }

    pub fn prev_recording(&mut self) {
        let count = self.recordings.len();
        if count > 0 {
            self.step(count - 1);
        }
    }

    fn step(&mut self, by: usize) {
        if self.loaded.is_some() {
            debug!("player: recording loaded, stop it first");
            return;
        }
        let count = self.recordings.len();
        if count == 0 {
            return;
        }
        self.index = Some(match self.index {
            None => 0,
            Some(i) => (i + by) % count,
        });
    }

    fn selected_name(&self) -> Option<String> {
        let path = self.recordings.get(self.index?)?;
        let name = path.file_stem().unwrap_or(path.as_os_str());
        Some(name.to_string_lossy().into_owned())
    }
}

impl ContentProvider for PlayerMode {
    fn title(&mut self, now: DateTime<Local>) -> Title {
        match self.selected_name() {
            Some(name) => Title::with_clock(name, now),
            None => Title::new("no recordings", ""),
        }
    }

    fn content(&self) -> Content {
        if self.recordings.is_empty() {
            return Content::Lines(Vec::new());
        }
        let line = match &self.loaded {
            Some(loaded) => {
                let glyph = if loaded.clock.is_paused() { "||" } else { ">" };
                let elapsed = format_elapsed(loaded.clock.elapsed(Instant::now()));
                let total = loaded
                    .total
                    .map(format_elapsed)
                    .unwrap_or_else(|| "--:--".to_string());
                format!("{} {}/{}", glyph, elapsed, total)
            }
            None => {
                let nr = self.index.map(|i| i + 1).unwrap_or(0);
                format!("{}/{}", nr, self.recordings.len())
            }
        };
        Content::Lines(vec![line])
    }
}
