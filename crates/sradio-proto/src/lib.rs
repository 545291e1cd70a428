//! Shared data model for simple-radio: configuration, platform paths, the
//! command vocabulary, the channel catalog and persisted state.

pub mod channels;
pub mod config;
pub mod platform;
pub mod protocol;
pub mod state;
