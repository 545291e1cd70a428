//! Radio mode: channel selection, live streaming and the recording overlay.

use std::time::Duration;

use chrono::{DateTime, Local};
use sradio_proto::channels::ChannelCatalog;
use sradio_proto::protocol::{Command, Scope};
use tracing::{debug, error, info, warn};

use crate::decoder::Decoder;
use crate::dispatch::{Build, CommandSpec};
use crate::display::{Content, ContentProvider, Title};
use crate::recorder::{Recorder, RecordingStatus};

fn parse_channel(arg: &str) -> Option<Command> {
    arg.parse::<usize>().ok().map(Command::SwitchChannel)
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "switch_channel",
        scope: Scope::Radio,
        build: Build::Parse(parse_channel),
    },
    CommandSpec::fixed("next_channel", Scope::Radio, Command::NextChannel),
    CommandSpec::fixed("prev_channel", Scope::Radio, Command::PrevChannel),
    CommandSpec::fixed("radio_off", Scope::Radio, Command::RadioOff),
    CommandSpec::fixed("radio_on", Scope::Radio, Command::RadioOn),
    CommandSpec::fixed("toggle_record", Scope::Radio, Command::ToggleRecord),
    CommandSpec::fixed("start_playmode", Scope::Radio, Command::StartPlaymode),
];

/// `mm:ss` below one hour, `hh:mm` from then on.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{:02}:{:02}", h, m)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

pub struct RadioMode {
    catalog: ChannelCatalog,
    channel: Option<usize>,
    /// Channel `radio_on` returns to.
    last_channel: Option<usize>,
    recorder: Recorder,
    max_recording: Duration,
    /// Flip-flop between channel and recording title.
    rec_show: bool,
}

impl RadioMode {
    pub fn new(
        catalog: ChannelCatalog,
        recorder: Recorder,
        max_recording: Duration,
        last_channel: Option<usize>,
    ) -> Self {
        let last_channel = last_channel.filter(|&i| i < catalog.len());
        Self {
            catalog,
            channel: None,
            last_channel,
            recorder,
            max_recording,
            rec_show: false,
        }
    }

    /// 0-based index of the channel playing, if any.
    pub fn channel(&self) -> Option<usize> {
        self.channel
    }

    pub fn last_channel(&self) -> Option<usize> {
        self.last_channel
    }

    pub fn catalog(&self) -> &ChannelCatalog {
        &self.catalog
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Tune to the 1-based channel `nr`, clamped to the catalog.  Returns
    /// true when the selected channel changed.
    pub async fn switch_channel(&mut self, nr: usize, decoder: &mut Decoder) -> bool {
        let Some(index) = self.catalog.clamp_number(nr) else {
            warn!("radio: no channels configured");
            return false;
        };
        if self.channel == Some(index) && decoder.is_active() {
            debug!("radio: already on channel {}", index + 1);
            return false;
        }

        self.channel = None;
        decoder.stop().await;

        let Some(channel) = self.catalog.get(index) else {
            return false;
        };
        info!("radio: switching to {} ({})", channel.name, index + 1);
        self.last_channel = Some(index);
        match decoder.start(&channel.url, true).await {
            Ok(()) => self.channel = Some(index),
            Err(e) => error!("radio: {}", e),
        }
        true
    }

    pub async fn next_channel(&mut self, decoder: &mut Decoder) -> bool {
        let count = self.catalog.len();
        if count == 0 {
            warn!("radio: no channels configured");
            return false;
        }
        let nr = match self.channel {
            None => 1,
            Some(i) => 1 + (i + 1) % count,
        };
        self.switch_channel(nr, decoder).await
    }

    pub async fn prev_channel(&mut self, decoder: &mut Decoder) -> bool {
        let count = self.catalog.len();
        if count == 0 {
            warn!("radio: no channels configured");
            return false;
        }
        let nr = match self.channel {
            None => count,
            Some(i) => 1 + (i + count - 1) % count,
        };
        self.switch_channel(nr, decoder).await
    }

    pub async fn radio_off(&mut self, decoder: &mut Decoder) {
        if self.channel.take().is_some() {
            info!("radio: turning off");
        }
        decoder.stop().await;
    }

    pub async fn radio_on(&mut self, decoder: &mut Decoder) -> bool {
        if self.channel.is_some() {
            debug!("radio: already on");
            return false;
        }
        let nr = self.last_channel.map(|i| i + 1).unwrap_or(1);
        self.switch_channel(nr, decoder).await
    }

    /// The decoder died on its own: go idle, no reconnect.
    pub fn stream_ended(&mut self) {
        if let Some(index) = self.channel.take() {
            let name = self.catalog.get(index).map(|c| c.name.as_str()).unwrap_or("?");
            warn!("radio: stream {} ended unexpectedly", name);
        }
    }

    pub async fn toggle_record(&mut self) {
        if self.recorder.is_recording() {
            self.recorder.stop().await;
            return;
        }
        let Some(channel) = self.channel.and_then(|i| self.catalog.get(i)) else {
            debug!("radio: nothing to record, no channel active");
            return;
        };
        self.recorder.start(channel.clone());
    }

    pub async fn stop_recording(&mut self) {
        self.recorder.stop().await;
    }

    /// Ask the recording to stop once it reached the configured length.
    /// Returns the elapsed time of a running recording.
    pub fn enforce_recording_limit(&mut self, now: DateTime<Local>) -> Option<Duration> {
        let elapsed = self.recorder.job()?.elapsed(now)?;
        if elapsed >= self.max_recording {
            info!(
                "radio: recording reached {} minutes, stopping",
                self.max_recording.as_secs() / 60
            );
            self.recorder.request_stop();
        }
        Some(elapsed)
    }

    fn recording_title(&mut self, now: DateTime<Local>) -> Option<Title> {
        let job = self.recorder.job()?;
        let label = job.channel().name.clone();
        if job.status() == RecordingStatus::Connecting {
            return Some(Title::new(label, "REC"));
        }
        let elapsed = self.enforce_recording_limit(now)?;
        Some(Title::new(label, format_elapsed(elapsed)))
    }

    fn channel_title(&self, now: DateTime<Local>) -> Option<Title> {
        let channel = self.catalog.get(self.channel?)?;
        Some(Title::with_clock(channel.name.clone(), now))
    }
}

impl ContentProvider for RadioMode {
    fn title(&mut self, now: DateTime<Local>) -> Title {
        let recording = self.recording_title(now);
        let channel = self.channel_title(now);
        match (channel, recording) {
            (Some(channel), Some(recording)) => {
                self.rec_show = !self.rec_show;
                if self.rec_show {
                    recording
                } else {
                    channel
                }
            }
            (Some(channel), None) => channel,
            (None, Some(recording)) => recording,
            (None, None) => Title::with_clock(now.format("%x").to_string(), now),
        }
    }

    fn content(&self) -> Content {
        if self.channel.is_some() {
            Content::Metadata
        } else {
            Content::Lines(Vec::new())
        }
    }
}
