//! Channel catalog: an ordered list of `name@url` entries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read channel file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read-only after load.  Channels are addressed by 0-based index internally
/// and by 1-based number on the command surface.
#[derive(Debug, Clone, Default)]
pub struct ChannelCatalog {
    channels: Vec<Channel>,
}

impl ChannelCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::parse(&content);
        debug!("loaded {} channels from {:?}", catalog.len(), path);
        Ok(catalog)
    }

    /// Parse `name@url` lines.  The line is split at the first `@`; blank
    /// lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        let mut channels = Vec::new();
        for (nr, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('@') {
                Some((name, url)) => channels.push(Channel {
                    name: name.to_string(),
                    url: url.trim().to_string(),
                }),
                None => warn!("channel file line {}: missing '@', skipped", nr + 1),
            }
        }
        Self { channels }
    }

    pub fn get(&self, idx: usize) -> Option<&Channel> {
        self.channels.get(idx)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Map a 1-based channel number onto a valid index, clamping out-of-range
    /// numbers to the first/last channel.
    pub fn clamp_number(&self, nr: usize) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }
        Some(nr.saturating_sub(1).min(self.channels.len() - 1))
    }
}
