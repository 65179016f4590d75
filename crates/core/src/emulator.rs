//! Contract between the save-state machinery and an emulation core.
//!
//! Cores are opaque: they own their memory image and are the only writers of
//! blob contents. The coordinator only decides *where* a blob goes and *when*
//! the core may touch it.

use std::fmt;
use std::path::Path;

use crate::error::CoreError;

/// Run state of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::Paused => "paused",
        })
    }
}

/// Per-core feature flags consulted by the coordinator and bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreCapabilities {
    /// The core can serialize while running. Rewind snapshots are only taken
    /// on cores that set this.
    pub live_snapshot: bool,
    /// The core has a codegen mode that can only be toggled across a
    /// full stop/start.
    pub jit_toggle: bool,
    /// Saving a state also flushes the in-game save, so refreshing the auto
    /// slot on a game save would loop.
    pub saves_game_on_state_save: bool,
}

/// A captured video frame, row-major RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// An emulation core as seen by the save-state machinery.
pub trait EmulatorCore: Send {
    /// Stable identifier recorded on every slot this core writes.
    fn identifier(&self) -> &str;

    fn state(&self) -> RunState;

    /// Stopped → Running. Resets emulation to power-on.
    fn start(&mut self);

    /// Any → Stopped.
    fn stop(&mut self);

    /// Running → Paused. No-op otherwise.
    fn pause(&mut self);

    /// Paused → Running. Returns whether the core is running afterwards.
    fn resume(&mut self) -> bool;

    /// Serialize the current memory image to `path`.
    fn save_state(&mut self, path: &Path) -> Result<(), CoreError>;

    /// Replace the memory image with the blob at `path`.
    ///
    /// Must report a missing file as [`CoreError::DoesNotExist`] and leave
    /// the current image untouched on any error.
    fn load_state(&mut self, path: &Path) -> Result<(), CoreError>;

    /// Best-effort capture of the current frame for previews.
    fn frame_snapshot(&self) -> Option<Frame>;

    /// Emulate one video frame. Does nothing unless running.
    fn run_frame(&mut self);

    /// Latch the pressed-button mask for the next frames.
    fn set_input(&mut self, _buttons: u8) {}

    fn capabilities(&self) -> CoreCapabilities {
        CoreCapabilities::default()
    }

    fn set_jit_enabled(&mut self, _enabled: bool) -> Result<(), CoreError> {
        Err(CoreError::Unsupported("jit"))
    }

    fn is_jit_enabled(&self) -> bool {
        false
    }
}
