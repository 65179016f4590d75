//! # savekeep-core
//!
//! Save-state lifecycle management for an emulator front-end: slot
//! bookkeeping, pause → act → resume sequencing around the emulation core,
//! and periodic rewind snapshots with retention.
//!
//! The emulation itself is an opaque collaborator behind [`EmulatorCore`];
//! a small deterministic [`DemoCore`] is bundled so the machinery can be
//! driven end to end.
//!
//! ## Architecture
//!
//! - [`Session`]: UI-facing surface (quick save/load, restart, pause menu, deep links)
//! - [`SaveStateCoordinator`]: sole writer of slot files and metadata
//! - [`LifecycleBridge`]: owns the core, suspend envelope, state-change channel
//! - [`RewindScheduler`]: interval timer for rewind snapshots
//! - [`SlotStore`]: on-disk slot layout, atomic writes, metadata index
//! - [`savestate`]: versioned, compressed blob container used by cores
//! - [`png`]: preview image encoder
//! - [`background`]: serial worker for deferred persistence work
//!
//! ## Failure policy
//!
//! No save-state failure stops emulation. Operations log and report a
//! `bool`; only successful operations produce a [`Notice`].

pub mod error;
pub mod slot;
pub mod clock;
pub mod config;
pub mod store;
pub mod savestate;
pub mod png;
pub mod emulator;
pub mod demo;
pub mod bridge;
pub mod background;
pub mod notice;
pub mod rewind;
pub mod coordinator;
pub mod session;

pub use bridge::{LifecycleBridge, StateChange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use coordinator::SaveStateCoordinator;
pub use demo::DemoCore;
pub use emulator::{CoreCapabilities, EmulatorCore, Frame, RunState};
pub use error::{ConfigError, CoreError, SaveStateError};
pub use notice::Notice;
pub use rewind::RewindScheduler;
pub use session::{DeepLink, Session};
pub use slot::{GameRef, SlotId, SlotKind, SlotRecord};
pub use store::SlotStore;
