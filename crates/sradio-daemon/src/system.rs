//! Shutdown, reboot and service restart.

use sradio_proto::config::SystemConfig;
use sradio_proto::protocol::{Command, Scope};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dispatch::CommandSpec;

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec::fixed("shutdown", Scope::Any, Command::Shutdown),
    CommandSpec::fixed("reboot", Scope::Any, Command::Reboot),
    CommandSpec::fixed("restart", Scope::Any, Command::Restart),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shutdown,
    Reboot,
    Restart,
}

pub struct SystemControl {
    config: SystemConfig,
    /// Commands are only logged in debug mode.
    debug: bool,
    /// Cancelled to make the daemon exit once the command is launched.
    quit: CancellationToken,
}

impl SystemControl {
    pub fn new(config: SystemConfig, debug: bool, quit: CancellationToken) -> Self {
        Self {
            config,
            debug,
            quit,
        }
    }

    fn command_for(&self, action: Action) -> &[String] {
        match action {
            Action::Shutdown => &self.config.shutdown,
            Action::Reboot => &self.config.reboot,
            Action::Restart => &self.config.restart,
        }
    }

    /// Launch the system command in the background and ask the daemon to
    /// quit.  Returns true if the daemon is going down.
    pub fn execute(&self, action: Action) -> bool {
        let argv = self.command_for(action);
        if self.debug {
            info!("system: {:?} skipped in debug mode ({:?})", action, argv);
            return false;
        }
        let Some((binary, args)) = argv.split_first() else {
            warn!("system: no command configured for {:?}", action);
            return false;
        };

        info!("system: {:?}: {:?}", action, argv);
        match tokio::process::Command::new(binary).args(args).spawn() {
            // the command outlives us, nobody waits for it
            Ok(_child) => {}
            Err(e) => warn!("system: cannot run {}: {}", binary, e),
        }
        self.quit.cancel();
        true
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(marker: &std::path::Path) -> SystemConfig {
        let touch = vec!["touch".to_string(), marker.to_string_lossy().into_owned()];
        SystemConfig {
            shutdown: touch.clone(),
            reboot: touch.clone(),
            restart: touch,
        }
    }

    #[tokio::test]
    async fn test_debug_mode_skips_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let quit = CancellationToken::new();
        let system = SystemControl::new(config(&marker), true, quit.clone());

        assert!(!system.execute(Action::Shutdown));
        assert!(!quit.is_cancelled());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_command_runs_and_daemon_quits() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let quit = CancellationToken::new();
        let system = SystemControl::new(config(&marker), false, quit.clone());

        assert!(system.execute(Action::Restart));
        assert!(quit.is_cancelled());
        for _ in 0..200 {
            if marker.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_missing_binary_still_quits() {
        let quit = CancellationToken::new();
        let config = SystemConfig {
            reboot: vec!["/nonexistent/reboot".to_string()],
            ..SystemConfig::default()
        };
        let system = SystemControl::new(config, false, quit.clone());
        assert!(system.execute(Action::Reboot));
        assert!(quit.is_cancelled());
    }
}
