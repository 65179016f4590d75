//! Error types shared across the crate.
//!
//! Cores report [`CoreError`], the slot store and coordinator report
//! [`SaveStateError`]. Neither escapes the [`crate::session::Session`]
//! save/load surface: failures there are logged and swallowed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::slot::SlotId;

/// Errors raised by an emulator core while serializing or restoring state.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The requested state file is not on disk.
    #[error("save state does not exist: {0}")]
    DoesNotExist(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The blob is truncated, has a bad header, or fails to decode.
    #[error("corrupt save state: {0}")]
    Corrupt(String),

    /// The blob was produced by a different core.
    #[error("save state belongs to core {found:?}, expected {expected:?}")]
    Incompatible { expected: String, found: String },

    #[error("unsupported by this core: {0}")]
    Unsupported(&'static str),
}

impl CoreError {
    pub fn is_missing(&self) -> bool {
        matches!(self, CoreError::DoesNotExist(_))
    }
}

/// Errors raised by the slot store and the save-state coordinator.
#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The per-game slot index could not be read or written.
    #[error("slot index error: {0}")]
    Index(String),

    #[error("no such slot: {0}")]
    NoSuchSlot(SlotId),

    /// Game ids name a directory in the store and must not be empty.
    #[error("invalid game id: {0:?}")]
    InvalidGameId(String),
}

/// Errors raised while loading or writing a [`crate::config::Config`] file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
