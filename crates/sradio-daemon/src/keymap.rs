//! Key identifier → command bindings.
//!
//! Keypad bindings are `command [arg]`; a binding without an argument passes
//! the key itself, so `"3" = "switch_channel"` selects channel 3.  LIRC
//! bindings are `command [repeat [delay]]` and filter autorepeat.

use std::collections::BTreeMap;

use sradio_proto::config::KeysConfig;
use sradio_proto::protocol::Mode;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    pub command: String,
    pub arg: Option<String>,
}

impl KeyBinding {
    pub fn parse(spec: &str) -> Option<Self> {
        let mut words = spec.split_whitespace();
        let command = words.next()?.to_string();
        let arg = words.next().map(str::to_string);
        Some(Self { command, arg })
    }
}

fn parse_map(name: &str, raw: &BTreeMap<String, String>) -> BTreeMap<String, KeyBinding> {
    raw.iter()
        .filter_map(|(key, spec)| match KeyBinding::parse(spec) {
            Some(binding) => Some((key.clone(), binding)),
            None => {
                warn!("keymap: empty binding for key '{}' in {} map", key, name);
                None
            }
        })
        .collect()
}

/// The radio and player keymaps.  Which one applies follows the mode.
#[derive(Debug, Clone, Default)]
pub struct KeymapSet {
    radio: BTreeMap<String, KeyBinding>,
    player: BTreeMap<String, KeyBinding>,
}

impl KeymapSet {
    pub fn from_config(keys: &KeysConfig) -> Self {
        Self {
            radio: parse_map("radio", &keys.radio),
            player: parse_map("player", &keys.player),
        }
    }

    /// Command name and argument for `key` in `mode`.
    pub fn resolve(&self, mode: Mode, key: &str) -> Option<(String, String)> {
        let map = match mode {
            Mode::Radio => &self.radio,
            Mode::Player => &self.player,
        };
        let Some(binding) = map.get(key) else {
            debug!("keymap: unsupported key '{}' in {} mode", key, mode);
            return None;
        };
        let arg = binding.arg.clone().unwrap_or_else(|| key.to_string());
        Some((binding.command.clone(), arg))
    }
}

// ── LIRC ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LircBinding {
    pub command: String,
    /// Accept every nth repeat; 0 ignores repeats.
    pub repeat: u32,
    /// Drop repeats once the repeat count reaches this value; 0 disables.
    pub delay: u32,
}

impl LircBinding {
    pub fn parse(spec: &str) -> Option<Self> {
        let mut words = spec.split_whitespace();
        let command = words.next()?.to_string();
        let number = |w: Option<&str>| -> u32 { w.and_then(|w| w.parse().ok()).unwrap_or(0) };
        let repeat = number(words.next());
        let delay = number(words.next());
        Some(Self {
            command,
            repeat,
            delay,
        })
    }

    /// Whether a press with the given repeat count should fire.
    pub fn accepts(&self, rep_count: u32) -> bool {
        if rep_count == 0 {
            return true;
        }
        if self.delay > 0 && self.delay <= rep_count {
            return false;
        }
        self.repeat != 0 && rep_count % self.repeat == 0
    }
}

/// One decoded lircd line: `<hex> <repeat> <KEY_NAME> <remote>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LircEvent {
    pub rep_count: u32,
    pub key_name: String,
}

impl LircEvent {
    pub fn parse(line: &str) -> Option<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let [_code, rep, key, _remote] = words.as_slice() else {
            return None;
        };
        let rep_count = u32::from_str_radix(rep, 16).ok()?;
        Some(Self {
            rep_count,
            key_name: key.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LircKeymap {
    bindings: BTreeMap<String, LircBinding>,
}

impl LircKeymap {
    pub fn from_config(keys: &BTreeMap<String, String>) -> Self {
        let bindings = keys
            .iter()
            .filter_map(|(key, spec)| LircBinding::parse(spec).map(|b| (key.clone(), b)))
            .collect();
        Self { bindings }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Command name and argument for a remote event, after repeat filtering.
    /// The argument is the key name without its `KEY_` prefix.
    pub fn resolve(&self, event: &LircEvent) -> Option<(String, String)> {
        let Some(binding) = self.bindings.get(&event.key_name) else {
            debug!("lirc: unsupported key {}", event.key_name);
            return None;
        };
        if !binding.accepts(event.rep_count) {
            return None;
        }
        let arg = event
            .key_name
            .strip_prefix("KEY_")
            .unwrap_or(&event.key_name)
            .to_string();
        Some((binding.command.clone(), arg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(command: &str, arg: &str) -> Option<(String, String)> {
        Some((command.to_string(), arg.to_string()))
    }

    #[test]
    fn test_binding_without_arg_passes_key() {
        let keymaps = KeymapSet::from_config(&KeysConfig::default());
        assert_eq!(keymaps.resolve(Mode::Radio, "3"), pair("switch_channel", "3"));
        assert_eq!(keymaps.resolve(Mode::Radio, "14"), pair("next_channel", "14"));
    }

    #[test]
    fn test_binding_with_explicit_arg() {
        let mut keys = KeysConfig::default();
        keys.radio.insert("A".into(), "switch_channel 7".into());
        let keymaps = KeymapSet::from_config(&keys);
        assert_eq!(keymaps.resolve(Mode::Radio, "A"), pair("switch_channel", "7"));
    }

    #[test]
    fn test_map_follows_mode() {
        let keymaps = KeymapSet::from_config(&KeysConfig::default());
        assert_eq!(keymaps.resolve(Mode::Radio, "15"), pair("start_playmode", "15"));
        assert_eq!(keymaps.resolve(Mode::Player, "15"), pair("exit_playmode", "15"));
        assert_eq!(keymaps.resolve(Mode::Player, "3"), None);
        assert_eq!(keymaps.resolve(Mode::Radio, "unknown"), None);
    }

    #[test]
    fn test_lirc_event_parse() {
        assert_eq!(
            LircEvent::parse("0000000000000010 0a KEY_VOLUMEUP RM-D420"),
            Some(LircEvent {
                rep_count: 10,
                key_name: "KEY_VOLUMEUP".into()
            })
        );
        assert_eq!(LircEvent::parse("garbage"), None);
        assert_eq!(LircEvent::parse("00 zz KEY_1 remote"), None);
    }

    #[test]
    fn test_lirc_repeat_filter() {
        let no_repeat = LircBinding::parse("radio_off").unwrap();
        assert!(no_repeat.accepts(0));
        assert!(!no_repeat.accepts(1));

        let every_third = LircBinding::parse("volume_up 3").unwrap();
        assert!(every_third.accepts(0));
        assert!(!every_third.accepts(1));
        assert!(every_third.accepts(3));
        assert!(every_third.accepts(6));

        let delayed = LircBinding::parse("volume_up 1 5").unwrap();
        assert!(delayed.accepts(4));
        assert!(!delayed.accepts(5));
    }

    #[test]
    fn test_lirc_arg_strips_prefix() {
        let mut keys = BTreeMap::new();
        keys.insert("KEY_3".to_string(), "switch_channel".to_string());
        let map = LircKeymap::from_config(&keys);
        let event = LircEvent::parse("00 00 KEY_3 remote").unwrap();
        assert_eq!(map.resolve(&event), pair("switch_channel", "3"));
        let repeat = LircEvent::parse("00 01 KEY_3 remote").unwrap();
        assert_eq!(map.resolve(&repeat), None);
    }
}
