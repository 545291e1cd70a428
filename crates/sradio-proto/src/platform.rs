use std::path::PathBuf;

/// Default location of the keypad FIFO written by the ttp229 keypad service.
pub const KEYPAD_FIFO: &str = "/var/run/ttp229-keypad.fifo";

/// Default lircd socket.
pub const LIRC_SOCKET: &str = "/var/run/lirc/lircd";

pub fn data_dir() -> PathBuf {
    // ~/.local/share/simple-radio/ (XDG standard)
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("simple-radio")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("simple-radio")
}

pub fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Expand a leading `~/` in a user supplied path.
pub fn expand_home(path: &std::path::Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_home() {
        let expanded = expand_home(Path::new("~/radio.channels"));
        assert_eq!(expanded, home_dir().join("radio.channels"));
        assert_eq!(expand_home(Path::new("/etc/x")), PathBuf::from("/etc/x"));
    }

    #[test]
    fn test_dirs_are_namespaced() {
        assert!(data_dir().ends_with("simple-radio"));
        assert!(config_dir().ends_with(".config/simple-radio"));
    }
}
