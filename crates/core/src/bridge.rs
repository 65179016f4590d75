//! Emulator lifecycle bridge.
//!
//! Owns the core and routes every run-state transition through one place so
//! that:
//!
//! - save/load/restart work happens inside a pause → act → resume envelope
//!   ([`LifecycleBridge::with_suspended_emulation`]) and leaves the run state
//!   as it found it;
//! - every transition is published as a [`StateChange`] on an explicit
//!   channel instead of being observed on the core;
//! - `resume_emulation` is refused while a modal surface is up.
//!
//! The envelope closure receives the core, not the bridge, so envelopes
//! cannot nest.

use std::path::Path;

use crossbeam_channel::{Receiver, Sender};

use crate::emulator::{EmulatorCore, RunState};
use crate::error::CoreError;

/// A run-state transition issued through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: RunState,
    pub to: RunState,
}

pub struct LifecycleBridge {
    core: Box<dyn EmulatorCore>,
    modal_active: bool,
    subscribers: Vec<Sender<StateChange>>,
}

impl LifecycleBridge {
    pub fn new(core: Box<dyn EmulatorCore>) -> Self {
        LifecycleBridge { core, modal_active: false, subscribers: Vec::new() }
    }

    pub fn core(&self) -> &dyn EmulatorCore {
        self.core.as_ref()
    }

    /// Direct core access for frame stepping and input. Transitions made
    /// through this reference are not published.
    pub fn core_mut(&mut self) -> &mut dyn EmulatorCore {
        self.core.as_mut()
    }

    pub fn state(&self) -> RunState {
        self.core.state()
    }

    /// Receive every subsequent transition.
    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, from: RunState) {
        let to = self.core.state();
        if from == to {
            return;
        }
        log::debug!("Core {}: {} -> {}", self.core.identifier(), from, to);
        let change = StateChange { from, to };
        self.subscribers.retain(|tx| tx.send(change).is_ok());
    }

    pub fn set_modal_active(&mut self, active: bool) {
        self.modal_active = active;
    }

    pub fn is_modal_active(&self) -> bool {
        self.modal_active
    }

    pub fn start(&mut self) {
        let from = self.core.state();
        self.core.start();
        self.publish(from);
    }

    pub fn stop(&mut self) {
        let from = self.core.state();
        self.core.stop();
        self.publish(from);
    }

    pub fn pause_emulation(&mut self) {
        let from = self.core.state();
        self.core.pause();
        self.publish(from);
    }

    /// Resume the core unless a modal surface is active.
    pub fn resume_emulation(&mut self) -> bool {
        if self.modal_active {
            log::debug!("Resume refused: modal surface active");
            return false;
        }
        self.resume_core()
    }

    fn resume_core(&mut self) -> bool {
        let from = self.core.state();
        let resumed = self.core.resume();
        self.publish(from);
        resumed
    }

    /// Run `action` with emulation suspended.
    ///
    /// If the core was running it is paused first and resumed afterwards;
    /// a paused or stopped core is left as is.
    pub fn with_suspended_emulation<R>(
        &mut self,
        action: impl FnOnce(&mut dyn EmulatorCore) -> R,
    ) -> R {
        let was_running = self.core.state() == RunState::Running;
        if was_running {
            self.pause_emulation();
        }
        let result = action(self.core.as_mut());
        if was_running {
            self.resume_core();
        }
        result
    }

    /// Reset the core to power-on, keeping its paused/running state.
    pub fn restart(&mut self) {
        let previous = self.core.state();
        self.stop();
        self.start();
        if previous == RunState::Paused {
            self.pause_emulation();
        }
    }

    /// Turn on the core's JIT mode.
    ///
    /// A stopped core is toggled in place. A live core cannot be toggled, so
    /// its state is saved to `scratch`, the core is stopped, toggled,
    /// restarted, paused and reloaded from `scratch`, then resumed if it was
    /// running. Returns `Ok(false)` if JIT was already on. The caller owns
    /// `scratch` and deletes it.
    pub fn enable_jit(&mut self, scratch: &Path) -> Result<bool, CoreError> {
        if !self.core.capabilities().jit_toggle {
            return Err(CoreError::Unsupported("jit"));
        }
        if self.core.is_jit_enabled() {
            return Ok(false);
        }
        if self.core.state() == RunState::Stopped {
            self.core.set_jit_enabled(true)?;
            return Ok(true);
        }

        let was_running = self.core.state() == RunState::Running;
        if was_running {
            self.pause_emulation();
        }
        if let Err(e) = self.core.save_state(scratch) {
            if was_running {
                self.resume_core();
            }
            return Err(e);
        }

        self.stop();
        let toggled = self.core.set_jit_enabled(true);
        self.start();
        self.pause_emulation();
        if let Err(e) = self.core.load_state(scratch) {
            log::error!("Failed to load save state after enabling JIT: {}", e);
        }
        if was_running {
            self.resume_core();
        }
        toggled.map(|_| true)
    }
}
