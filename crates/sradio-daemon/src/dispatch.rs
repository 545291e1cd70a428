//! Command registry.
//!
//! Every component contributes a table of [`CommandSpec`]s.  Resolution
//! checks the name, the scope against the current mode and the argument, in
//! that order; a failure at any step is a debug-logged no-op.

use std::collections::HashMap;

use sradio_proto::protocol::{Command, Mode, Scope};
use tracing::debug;

/// How a command is built from its key argument.
#[derive(Clone)]
pub enum Build {
    /// The argument is ignored.
    Fixed(Command),
    /// The argument is parsed; `None` rejects it.
    Parse(fn(&str) -> Option<Command>),
}

#[derive(Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub scope: Scope,
    pub build: Build,
}

impl CommandSpec {
    pub const fn fixed(name: &'static str, scope: Scope, command: Command) -> Self {
        Self {
            name,
            scope,
            build: Build::Fixed(command),
        }
    }
}

#[derive(Default)]
pub struct CommandRegistry {
    specs: HashMap<&'static str, CommandSpec>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component's table.  Later registrations replace earlier ones
    /// with the same name.
    pub fn register(&mut self, table: &[CommandSpec]) {
        for spec in table {
            if self.specs.insert(spec.name, spec.clone()).is_some() {
                debug!("dispatch: '{}' registered twice", spec.name);
            }
        }
    }

    pub fn resolve(&self, name: &str, arg: Option<&str>, mode: Mode) -> Option<Command> {
        let Some(spec) = self.specs.get(name) else {
            debug!("dispatch: unknown command '{}'", name);
            return None;
        };
        if !spec.scope.admits(mode) {
            debug!("dispatch: '{}' is not active in {} mode", name, mode);
            return None;
        }
        match &spec.build {
            Build::Fixed(command) => Some(command.clone()),
            Build::Parse(parse) => {
                let command = arg.and_then(|a| parse(a.trim()));
                if command.is_none() {
                    debug!("dispatch: invalid argument {:?} for '{}'", arg, name);
                }
                command
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_number(arg: &str) -> Option<Command> {
        arg.parse().ok().map(Command::SwitchChannel)
    }

    const TABLE: &[CommandSpec] = &[
        CommandSpec {
            name: "switch_channel",
            scope: Scope::Radio,
            build: Build::Parse(parse_number),
        },
        CommandSpec::fixed("stop_play", Scope::Player, Command::StopPlay),
        CommandSpec::fixed("toggle_mute", Scope::Any, Command::ToggleMute),
    ];

    fn registry() -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        registry.register(TABLE);
        registry
    }

    #[test]
    fn test_resolve_with_argument() {
        assert_eq!(
            registry().resolve("switch_channel", Some("3"), Mode::Radio),
            Some(Command::SwitchChannel(3))
        );
        assert_eq!(registry().resolve("switch_channel", Some("x"), Mode::Radio), None);
        assert_eq!(registry().resolve("switch_channel", None, Mode::Radio), None);
    }

    #[test]
    fn test_scope_gates_commands() {
        let registry = registry();
        assert_eq!(registry.resolve("switch_channel", Some("1"), Mode::Player), None);
        assert_eq!(registry.resolve("stop_play", None, Mode::Radio), None);
        assert_eq!(
            registry.resolve("stop_play", None, Mode::Player),
            Some(Command::StopPlay)
        );
        assert_eq!(
            registry.resolve("toggle_mute", Some("16"), Mode::Radio),
            Some(Command::ToggleMute)
        );
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        assert_eq!(registry().resolve("self_destruct", None, Mode::Radio), None);
    }
}
