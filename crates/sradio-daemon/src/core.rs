/// RadioCore: single-owner event loop for all playback state.
///
/// Input readers and the display scheduler never touch the radio, the player
/// or the decoder directly.  They send `CoreEvent`s to this loop, which
/// applies them one at a time:
///
/// ```text
///   keypad ─┐
///   lirc   ─┼── CoreEvent ──► RadioCore ──► Decoder / Recorder / Mixer
///   display ┘   (mpsc)           │
///                                └── Screen (oneshot) ──► DisplayScheduler
/// ```
///
/// Decoder liveness is polled on every render request, so a stream that
/// dies on its own is noticed within one display period.  Slow lookups such
/// as probing a recording's length run on their own task and come back as
/// events on a private channel.
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use sradio_proto::channels::ChannelCatalog;
use sradio_proto::config::Config;
use sradio_proto::protocol::{Command, Mode};
use sradio_proto::state::{RadioState, StateStore, RADIO};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::amp::{self, Mixer};
use crate::decoder::Decoder;
use crate::dispatch::CommandRegistry;
use crate::display::{ContentProvider, Screen};
use crate::keymap::KeymapSet;
use crate::metadata::{ContentQueue, Layout};
use crate::player::{self, PlayerMode};
use crate::radio::{self, RadioMode};
use crate::recorder::Recorder;
use crate::system::{self, Action, SystemControl};

// ── CoreEvent ─────────────────────────────────────────────────────────────────

/// All inputs into the RadioCore loop.
#[derive(Debug)]
pub enum CoreEvent {
    /// Raw key identifier from the keypad, translated with the active keymap.
    Key(String),
    /// An already resolved command, e.g. from the remote control.
    Invoke { command: String, arg: Option<String> },
    /// The display wants the current screen.
    Render(oneshot::Sender<Screen>),
    /// Probed total length of a recording that started playing.
    Probed {
        path: PathBuf,
        total: Option<Duration>,
    },
    /// Stop playback and recording, persist state and leave the loop.
    Shutdown,
}

// ── RadioCore ─────────────────────────────────────────────────────────────────

pub struct RadioCore {
    registry: CommandRegistry,
    keymaps: KeymapSet,
    mode: Mode,
    radio: RadioMode,
    player: PlayerMode,
    decoder: Decoder,
    mixer: Mixer,
    system: SystemControl,
    store: StateStore,
    probe_tx: mpsc::Sender<CoreEvent>,
    probe_rx: mpsc::Receiver<CoreEvent>,
}

impl RadioCore {
    pub fn new(
        config: &Config,
        catalog: ChannelCatalog,
        store: StateStore,
        queue: ContentQueue,
        quit: CancellationToken,
    ) -> Self {
        let mut registry = CommandRegistry::new();
        registry.register(radio::COMMANDS);
        registry.register(player::COMMANDS);
        registry.register(amp::COMMANDS);
        registry.register(system::COMMANDS);

        let layout = Layout {
            rows: config.display.rows,
            cols: config.display.cols,
        };
        let last = store.get::<RadioState>(RADIO).last_channel();
        let max_recording = Duration::from_secs(config.record.duration_minutes.saturating_mul(60));
        let (probe_tx, probe_rx) = mpsc::channel(4);

        Self {
            registry,
            keymaps: KeymapSet::from_config(&config.keys),
            mode: Mode::Radio,
            radio: RadioMode::new(
                catalog,
                Recorder::new(config.record.dir.clone()),
                max_recording,
                last,
            ),
            player: PlayerMode::new(config.record.dir.clone()),
            decoder: Decoder::new(&config.decoder, queue, layout),
            mixer: Mixer::new(&config.amp),
            system: SystemControl::new(config.system.clone(), config.general.debug, quit),
            store,
            probe_tx,
            probe_rx,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn radio(&self) -> &RadioMode {
        &self.radio
    }

    pub fn player(&self) -> &PlayerMode {
        &self.player
    }

    /// Run until a `Shutdown` event arrives or every sender is gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<CoreEvent>) -> anyhow::Result<()> {
        info!(
            "core: starting event loop ({} channels)",
            self.radio.catalog().len()
        );
        loop {
            let evt = tokio::select! {
                evt = event_rx.recv() => evt,
                Some(probed) = self.probe_rx.recv() => Some(probed),
            };
            let Some(evt) = evt else {
                info!("core: event channel closed, shutting down");
                break;
            };
            if !self.handle_event(evt).await {
                break;
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Apply one event.  Returns false when the loop should end.
    pub async fn handle_event(&mut self, evt: CoreEvent) -> bool {
        match evt {
            CoreEvent::Shutdown => {
                info!("core: shutdown requested");
                return false;
            }
            CoreEvent::Key(key) => {
                if let Some((command, arg)) = self.keymaps.resolve(self.mode, &key) {
                    self.execute(&command, Some(&arg)).await;
                }
            }
            CoreEvent::Invoke { command, arg } => {
                self.execute(&command, arg.as_deref()).await;
            }
            CoreEvent::Probed { path, total } => self.player.set_total(&path, total),
            CoreEvent::Render(reply) => {
                let screen = self.render(Local::now());
                if reply.send(screen).is_err() {
                    debug!("core: render requester went away");
                }
            }
        }
        true
    }

    pub async fn execute(&mut self, name: &str, arg: Option<&str>) {
        if let Some(cmd) = self.registry.resolve(name, arg, self.mode) {
            debug!("core: {:?}", cmd);
            self.apply(cmd).await;
        }
    }

    async fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::SwitchChannel(nr) => {
                if self.radio.switch_channel(nr, &mut self.decoder).await {
                    self.persist().await;
                }
            }
            Command::NextChannel => {
                if self.radio.next_channel(&mut self.decoder).await {
                    self.persist().await;
                }
            }
            Command::PrevChannel => {
                if self.radio.prev_channel(&mut self.decoder).await {
                    self.persist().await;
                }
            }
            Command::RadioOff => self.radio.radio_off(&mut self.decoder).await,
            Command::RadioOn => {
                if self.radio.radio_on(&mut self.decoder).await {
                    self.persist().await;
                }
            }
            Command::ToggleRecord => self.radio.toggle_record().await,
            Command::StartPlaymode => {
                self.radio.radio_off(&mut self.decoder).await;
                self.player.enter();
                self.mode = Mode::Player;
                info!("core: entered {} mode", self.mode);
            }
            Command::ExitPlaymode => {
                self.player.exit(&mut self.decoder).await;
                self.mode = Mode::Radio;
                info!("core: entered {} mode", self.mode);
            }
            Command::TogglePlay => {
                if let Some(path) = self.player.toggle_play(&mut self.decoder).await {
                    self.probe_length(path);
                }
            }
            Command::StopPlay => self.player.stop_play(&mut self.decoder).await,
            Command::NextRecording => self.player.next_recording(),
            Command::PrevRecording => self.player.prev_recording(),
            Command::VolumeUp => self.mixer.volume_up().await,
            Command::VolumeDown => self.mixer.volume_down().await,
            Command::ToggleMute => self.mixer.toggle_mute().await,
            Command::Shutdown => {
                self.system.execute(Action::Shutdown);
            }
            Command::Reboot => {
                self.system.execute(Action::Reboot);
            }
            Command::Restart => {
                self.system.execute(Action::Restart);
            }
        }
    }

    fn probe_length(&self, path: PathBuf) {
        let probe = self.decoder.duration_probe();
        let tx = self.probe_tx.clone();
        tokio::spawn(async move {
            let total = probe.run(&path).await;
            let _ = tx.send(CoreEvent::Probed { path, total }).await;
        });
    }

    /// Current screen of the active mode.
    pub fn render(&mut self, now: DateTime<Local>) -> Screen {
        self.poll_decoder();
        match self.mode {
            Mode::Radio => self.radio.screen(now),
            Mode::Player => {
                // the radio title is not rendered here, so check the limit
                self.radio.enforce_recording_limit(now);
                self.player.screen(now)
            }
        }
    }

    fn poll_decoder(&mut self) {
        let expected = match self.mode {
            Mode::Radio => self.radio.channel().is_some(),
            Mode::Player => self.player.is_loaded(),
        };
        if !expected || self.decoder.is_active() {
            return;
        }
        self.decoder.reap();
        match self.mode {
            Mode::Radio => self.radio.stream_ended(),
            Mode::Player => self.player.playback_ended(),
        }
    }

    async fn persist(&mut self) {
        let state = RadioState::with_channel(self.radio.last_channel());
        if let Err(e) = self.store.set(RADIO, &state) {
            warn!("core: cannot store radio state: {}", e);
            return;
        }
        if let Err(e) = self.store.save().await {
            warn!("core: cannot save state to {:?}: {}", self.store.path(), e);
        }
    }

    async fn shutdown(&mut self) {
        info!("core: stopping playback");
        self.decoder.stop().await;
        self.radio.stop_recording().await;
        self.persist().await;
        info!("core: stopped");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::decoder::tests::fake_config;
    use crate::display::{Content, DisplayScheduler};

    const CHANNELS: &str = "WDR2@http://stream.example/wdr2\nBR@http://stream.example/br\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
        quit: CancellationToken,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.debug = true;
        config.general.state_file = dir.path().join("state.json");
        config.decoder = fake_config(script);
        config.record.dir = dir.path().join("recordings");
        std::fs::create_dir_all(&config.record.dir).unwrap();
        Fixture {
            _dir: dir,
            config,
            quit: CancellationToken::new(),
        }
    }

    fn core(f: &Fixture) -> RadioCore {
        core_with_queue(f, ContentQueue::new())
    }

    fn core_with_queue(f: &Fixture, queue: ContentQueue) -> RadioCore {
        RadioCore::new(
            &f.config,
            ChannelCatalog::parse(CHANNELS),
            StateStore::load(f.config.general.state_file.clone()),
            queue,
            f.quit.clone(),
        )
    }

    async fn key(core: &mut RadioCore, key: &str) {
        assert!(core.handle_event(CoreEvent::Key(key.to_string())).await);
    }

    async fn invoke(core: &mut RadioCore, command: &str, arg: Option<&str>) {
        let evt = CoreEvent::Invoke {
            command: command.to_string(),
            arg: arg.map(str::to_string),
        };
        assert!(core.handle_event(evt).await);
    }

    #[tokio::test]
    async fn test_channel_keys_and_persistence() {
        let f = fixture("exec sleep 30");
        let mut core = core(&f);

        key(&mut core, "1").await;
        assert_eq!(core.render(Local::now()).title.label, "WDR2");
        key(&mut core, "14").await;
        assert_eq!(core.radio().channel(), Some(1));
        assert_eq!(core.render(Local::now()).title.label, "BR");
        key(&mut core, "14").await;
        assert_eq!(core.radio().channel(), Some(0));

        let saved = StateStore::load(f.config.general.state_file.clone());
        assert_eq!(saved.get::<RadioState>(RADIO).last_channel(), Some(0));

        assert!(!core.handle_event(CoreEvent::Shutdown).await);
        core.shutdown().await;
        assert!(!core.decoder.is_active());
    }

    #[tokio::test]
    async fn test_channel_switch_blanks_previous_metadata() {
        // only WDR2 sends a stream title
        let mut f = fixture(
            r#"case "$1" in *wdr2) echo "StreamTitle='Old Song';" >&2 ;; esac; exec sleep 30"#,
        );
        f.config.display.rows = 2;
        f.config.display.cols = 16;
        let queue = ContentQueue::new();
        let mut core = core_with_queue(&f, queue.clone());
        let mut display = DisplayScheduler::new(Layout { rows: 2, cols: 16 }, queue);

        key(&mut core, "1").await;
        let mut shown = false;
        for _ in 0..200 {
            let rows = display.frame(&core.render(Local::now()));
            if rows[1].trim_end() == "Old Song" {
                shown = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(shown);

        key(&mut core, "2").await;
        for _ in 0..3 {
            let rows = display.frame(&core.render(Local::now()));
            assert!(rows[0].starts_with("BR "), "{:?}", rows);
            assert_eq!(rows[1].trim(), "", "{:?}", rows);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        core.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_and_unknown_commands_are_ignored() {
        let f = fixture("exec sleep 30");
        let mut core = core(&f);

        invoke(&mut core, "switch_channel", Some("x")).await;
        invoke(&mut core, "warp_drive", None).await;
        key(&mut core, "99").await;
        assert_eq!(core.radio().channel(), None);
        assert!(!core.decoder.is_active());
    }

    #[tokio::test]
    async fn test_player_commands_need_player_mode() {
        let f = fixture("exec sleep 30");
        std::fs::write(f.config.record.dir.join("20240101_080000_BR.mp3"), b"x").unwrap();
        let mut core = core(&f);

        invoke(&mut core, "toggle_play", None).await;
        assert!(!core.player().is_loaded());

        key(&mut core, "2").await;
        assert_eq!(core.radio().channel(), Some(1));

        // start_playmode stops the radio first
        key(&mut core, "15").await;
        assert_eq!(core.mode(), Mode::Player);
        assert_eq!(core.radio().channel(), None);
        assert!(!core.decoder.is_active());

        invoke(&mut core, "switch_channel", Some("1")).await;
        assert_eq!(core.radio().channel(), None);

        // key "1" now means toggle_play
        key(&mut core, "1").await;
        assert!(core.player().is_loaded());
        assert!(core.decoder.is_active());

        // the length shows up once the probe task reports back
        let probed = tokio::time::timeout(Duration::from_secs(5), core.probe_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(core.handle_event(probed).await);
        let Content::Lines(lines) = core.render(Local::now()).content else {
            panic!("expected progress line");
        };
        assert!(lines[0].ends_with("/02:05"), "{}", lines[0]);

        key(&mut core, "15").await;
        assert_eq!(core.mode(), Mode::Radio);
        assert!(!core.player().is_loaded());
        assert!(!core.decoder.is_active());
        assert_eq!(core.radio().channel(), None);
    }

    #[tokio::test]
    async fn test_empty_recordings_then_new_file() {
        let f = fixture("exec sleep 30");
        let mut core = core(&f);

        invoke(&mut core, "start_playmode", None).await;
        let screen = core.render(Local::now());
        assert_eq!(screen.title.label, "no recordings");
        assert_eq!(screen.content, Content::Lines(vec![]));

        std::fs::write(f.config.record.dir.join("20240101_080000_BR.mp3"), b"x").unwrap();
        invoke(&mut core, "exit_playmode", None).await;
        invoke(&mut core, "start_playmode", None).await;
        assert_eq!(core.player().index(), Some(0));
        let screen = core.render(Local::now());
        assert_eq!(screen.title.label, "20240101_080000_BR");
        assert_eq!(screen.content, Content::Lines(vec!["1/1".into()]));
    }

    #[tokio::test]
    async fn test_dead_stream_reverts_to_idle() {
        let f = fixture("echo \"StreamTitle='Last words';\" >&2; exit 1");
        let mut core = core(&f);

        key(&mut core, "2").await;
        assert_eq!(core.radio().channel(), Some(1));

        let mut idle = false;
        for _ in 0..200 {
            let screen = core.render(Local::now());
            if core.radio().channel().is_none() {
                assert_eq!(screen.content, Content::Lines(vec![]));
                idle = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(idle);
        // no reconnect, but radio_on remembers the channel
        assert_eq!(core.radio().last_channel(), Some(1));
    }

    #[tokio::test]
    async fn test_huge_recording_limit_is_accepted() {
        let mut f = fixture("exec sleep 30");
        f.config.record.duration_minutes = u64::MAX;
        let mut core = core(&f);
        key(&mut core, "1").await;
        assert_eq!(core.render(Local::now()).title.label, "WDR2");
        core.shutdown().await;
    }

    #[tokio::test]
    async fn test_system_commands_skip_in_debug_mode() {
        let f = fixture("exec sleep 30");
        let mut core = core(&f);
        invoke(&mut core, "shutdown", None).await;
        invoke(&mut core, "reboot", None).await;
        assert!(!f.quit.is_cancelled());
    }

    #[tokio::test]
    async fn test_run_answers_render_and_stops() {
        let f = fixture("exec sleep 30");
        let core = core(&f);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(core.run(rx));

        tx.send(CoreEvent::Key("1".into())).await.unwrap();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(CoreEvent::Render(reply_tx)).await.unwrap();
        let screen = reply_rx.await.unwrap();
        assert_eq!(screen.title.label, "WDR2");
        assert_eq!(screen.content, Content::Metadata);

        tx.send(CoreEvent::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
        let saved = StateStore::load(f.config.general.state_file.clone());
        assert_eq!(saved.get::<RadioState>(RADIO).last_channel(), Some(0));
    }
}
