use serde::{Deserialize, Serialize};

/// Top-level operating mode.  Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Radio,
    Player,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Radio => write!(f, "radio"),
            Mode::Player => write!(f, "player"),
        }
    }
}

/// Which modes a command may run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Radio,
    Player,
    Any,
}

impl Scope {
    pub fn admits(self, mode: Mode) -> bool {
        match self {
            Scope::Any => true,
            Scope::Radio => mode == Mode::Radio,
            Scope::Player => mode == Mode::Player,
        }
    }
}

/// Every logical command a key or remote can trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // ── radio ────────────────────────────────────────────────────────────────
    /// 1-based channel number.
    SwitchChannel(usize),
    NextChannel,
    PrevChannel,
    RadioOff,
    RadioOn,
    ToggleRecord,
    StartPlaymode,

    // ── player ───────────────────────────────────────────────────────────────
    ExitPlaymode,
    TogglePlay,
    StopPlay,
    NextRecording,
    PrevRecording,

    // ── amplifier ────────────────────────────────────────────────────────────
    VolumeUp,
    VolumeDown,
    ToggleMute,

    // ── system ───────────────────────────────────────────────────────────────
    Shutdown,
    Reboot,
    Restart,
}
