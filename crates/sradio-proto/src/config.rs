use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub record: RecordConfig,
    #[serde(default)]
    pub keypad: KeypadConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub lirc: LircConfig,
    #[serde(default)]
    pub amp: AmpConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default)]
    pub debug: bool,
    /// Flat `name@url` channel list.
    #[serde(default = "default_channel_file")]
    pub channel_file: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// External decoder process.  The stream source is appended after `options`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_decoder_binary")]
    pub binary: String,
    #[serde(default = "default_decoder_options")]
    pub options: Vec<String>,
    /// Command printing the duration of a file in seconds; the file path is
    /// appended as last argument.
    #[serde(default = "default_probe")]
    pub probe: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_cols")]
    pub cols: usize,
    #[serde(default = "default_scroll_secs")]
    pub scroll_secs: u64,
    /// Clear the terminal between frames of the console display.
    #[serde(default = "default_true")]
    pub clear_screen: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Target directory for recordings; also browsed in player mode.
    #[serde(default = "default_record_dir")]
    pub dir: PathBuf,
    /// Recordings stop automatically after this many minutes.
    #[serde(default = "default_duration_minutes")]
    pub duration_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypadConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keypad_fifo")]
    pub fifo: PathBuf,
}

/// Key identifier → `command [arg]`.  Without an explicit argument the key
/// identifier itself is passed to the command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_radio_keys")]
    pub radio: BTreeMap<String, String>,
    #[serde(default = "default_player_keys")]
    pub player: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LircConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_lirc_socket")]
    pub socket: PathBuf,
    /// `KEY_NAME` → `command [repeat [delay]]`.
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmpConfig {
    #[serde(default = "default_mixer")]
    pub mixer: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default = "default_volume_step")]
    pub step: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_shutdown_cmd")]
    pub shutdown: Vec<String>,
    #[serde(default = "default_reboot_cmd")]
    pub reboot: Vec<String>,
    #[serde(default = "default_restart_cmd")]
    pub restart: Vec<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug: false,
            channel_file: default_channel_file(),
            state_file: default_state_file(),
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            binary: default_decoder_binary(),
            options: default_decoder_options(),
            probe: default_probe(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            scroll_secs: default_scroll_secs(),
            clear_screen: true,
        }
    }
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            dir: default_record_dir(),
            duration_minutes: default_duration_minutes(),
        }
    }
}

impl Default for KeypadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fifo: default_keypad_fifo(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            radio: default_radio_keys(),
            player: default_player_keys(),
        }
    }
}

impl Default for LircConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            socket: default_lirc_socket(),
            keys: BTreeMap::new(),
        }
    }
}

impl Default for AmpConfig {
    fn default() -> Self {
        Self {
            mixer: default_mixer(),
            options: Vec::new(),
            step: default_volume_step(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            shutdown: default_shutdown_cmd(),
            reboot: default_reboot_cmd(),
            restart: default_restart_cmd(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_channel_file() -> PathBuf {
    platform::home_dir().join("simple-radio.channels")
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_decoder_binary() -> String {
    "mpg123".to_string()
}

fn default_decoder_options() -> Vec<String> {
    vec!["-b".to_string(), "1024".to_string()]
}

fn default_probe() -> Vec<String> {
    [
        "ffprobe",
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_rows() -> usize {
    2
}

fn default_cols() -> usize {
    16
}

fn default_scroll_secs() -> u64 {
    3
}

fn default_record_dir() -> PathBuf {
    platform::home_dir().join("recordings")
}

fn default_duration_minutes() -> u64 {
    60
}

fn default_keypad_fifo() -> PathBuf {
    PathBuf::from(platform::KEYPAD_FIFO)
}

fn default_lirc_socket() -> PathBuf {
    PathBuf::from(platform::LIRC_SOCKET)
}

fn default_mixer() -> String {
    "PCM".to_string()
}

fn default_volume_step() -> u8 {
    1
}

fn default_shutdown_cmd() -> Vec<String> {
    vec!["sudo".to_string(), "/sbin/halt".to_string()]
}

fn default_reboot_cmd() -> Vec<String> {
    vec!["sudo".to_string(), "/sbin/reboot".to_string()]
}

fn default_restart_cmd() -> Vec<String> {
    vec![
        "sudo".to_string(),
        "/bin/systemctl".to_string(),
        "restart".to_string(),
        "simple-radio.service".to_string(),
    ]
}

fn keys(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// Layout of the 16-key ttp229 pad: 1-9 select channels, the bottom row
// navigates.
fn default_radio_keys() -> BTreeMap<String, String> {
    keys(&[
        ("1", "switch_channel"),
        ("2", "switch_channel"),
        ("3", "switch_channel"),
        ("4", "switch_channel"),
        ("5", "switch_channel"),
        ("6", "switch_channel"),
        ("7", "switch_channel"),
        ("8", "switch_channel"),
        ("9", "switch_channel"),
        ("10", "radio_off"),
        ("11", "radio_on"),
        ("12", "toggle_record"),
        ("13", "prev_channel"),
        ("14", "next_channel"),
        ("15", "start_playmode"),
        ("16", "toggle_mute"),
    ])
}

fn default_player_keys() -> BTreeMap<String, String> {
    keys(&[
        ("1", "toggle_play"),
        ("2", "stop_play"),
        ("13", "prev_recording"),
        ("14", "next_recording"),
        ("15", "exit_playmode"),
        ("16", "toggle_mute"),
    ])
}

impl Config {
    /// Load `config_path`, writing a default file on first run.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            if let Err(e) = config.save_to(config_path) {
                warn!("could not write default config {:?}: {}", config_path, e);
            }
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.expand_paths();
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    fn expand_paths(&mut self) {
        self.general.channel_file = platform::expand_home(&self.general.channel_file);
        self.general.state_file = platform::expand_home(&self.general.state_file);
        self.record.dir = platform::expand_home(&self.record.dir);
    }
}
