//! Volume control through `amixer`.

use std::sync::OnceLock;

use regex::Regex;
use sradio_proto::config::AmpConfig;
use sradio_proto::protocol::{Command, Scope};
use tokio::process::Command as Process;
use tracing::{debug, warn};

use crate::dispatch::CommandSpec;

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec::fixed("volume_up", Scope::Any, Command::VolumeUp),
    CommandSpec::fixed("volume_down", Scope::Any, Command::VolumeDown),
    CommandSpec::fixed("toggle_mute", Scope::Any, Command::ToggleMute),
];

/// First percentage in `amixer get` output.
pub fn parse_volume(output: &str) -> Option<u8> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+)%").expect("valid volume regex"));
    let value: u32 = re.captures(output)?.get(1)?.as_str().parse().ok()?;
    Some(value.min(100) as u8)
}

pub struct Mixer {
    binary: String,
    control: String,
    options: Vec<String>,
    step: u8,
    /// Last volume read or set; queried lazily.
    volume: Option<u8>,
}

impl Mixer {
    pub fn new(config: &AmpConfig) -> Self {
        Self::with_binary("amixer", config)
    }

    pub fn with_binary(binary: &str, config: &AmpConfig) -> Self {
        Self {
            binary: binary.to_string(),
            control: config.mixer.clone(),
            options: config.options.clone(),
            step: config.step.max(1),
            volume: None,
        }
    }

    pub fn volume(&self) -> Option<u8> {
        self.volume
    }

    async fn current_volume(&mut self) -> Option<u8> {
        if self.volume.is_some() {
            return self.volume;
        }
        let output = Process::new(&self.binary)
            .args(&self.options)
            .arg("get")
            .arg(&self.control)
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                self.volume = parse_volume(&String::from_utf8_lossy(&out.stdout));
                debug!("amp: current volume is {:?}%", self.volume);
            }
            Ok(out) => warn!("amp: {} get failed: {}", self.binary, out.status),
            Err(e) => warn!("amp: cannot run {}: {}", self.binary, e),
        }
        self.volume
    }

    async fn set_volume(&mut self, volume: u8) {
        debug!("amp: setting volume to {}%", volume);
        let status = Process::new(&self.binary)
            .args(&self.options)
            .args(["-q", "set", self.control.as_str(), format!("{}%", volume).as_str()])
            .status()
            .await;
        match status {
            Ok(s) if s.success() => self.volume = Some(volume),
            Ok(s) => warn!("amp: {} set failed: {}", self.binary, s),
            Err(e) => warn!("amp: cannot run {}: {}", self.binary, e),
        }
    }

    pub async fn volume_up(&mut self) {
        if let Some(current) = self.current_volume().await {
            self.set_volume(current.saturating_add(self.step).min(100)).await;
        }
    }

    pub async fn volume_down(&mut self) {
        if let Some(current) = self.current_volume().await {
            self.set_volume(current.saturating_sub(self.step)).await;
        }
    }

    pub async fn toggle_mute(&mut self) {
        debug!("amp: toggle mute");
        let status = Process::new(&self.binary)
            .args(&self.options)
            .args(["-q", "sset", self.control.as_str(), "toggle"])
            .status()
            .await;
        if let Err(e) = status {
            warn!("amp: cannot run {}: {}", self.binary, e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const AMIXER_GET: &str = "Simple mixer control 'PCM',0\n  \
        Capabilities: pvolume pvolume-joined pswitch pswitch-joined\n  \
        Mono: Playback -1345 [83%] [-13.45dB] [on]\n";

    #[test]
    fn test_parse_volume() {
        assert_eq!(parse_volume(AMIXER_GET), Some(83));
        assert_eq!(parse_volume("no volume here"), None);
        assert_eq!(parse_volume("[250%]"), Some(100));
    }

    /// An `amixer` stand-in run through `sh`; it logs its arguments and
    /// reports 50%.
    fn fake_amixer(dir: &std::path::Path) -> (String, std::path::PathBuf) {
        let log = dir.join("calls.log");
        let script = dir.join("amixer.sh");
        std::fs::write(
            &script,
            format!(
                "echo \"$@\" >> {}\necho 'Mono: Playback 50 [50%] [on]'\n",
                log.display()
            ),
        )
        .unwrap();
        (script.to_string_lossy().into_owned(), log)
    }

    #[tokio::test]
    async fn test_volume_steps_through_amixer() {
        let dir = tempfile::tempdir().unwrap();
        let (script, log) = fake_amixer(dir.path());
        let config = AmpConfig {
            options: vec![script],
            step: 5,
            ..AmpConfig::default()
        };
        let mut mixer = Mixer::with_binary("sh", &config);

        mixer.volume_up().await;
        assert_eq!(mixer.volume(), Some(55));
        mixer.volume_down().await;
        mixer.volume_down().await;
        assert_eq!(mixer.volume(), Some(45));
        mixer.toggle_mute().await;

        let calls = std::fs::read_to_string(log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            vec![
                "get PCM",
                "-q set PCM 55%",
                "-q set PCM 50%",
                "-q set PCM 45%",
                "-q sset PCM toggle",
            ]
        );
    }
}
