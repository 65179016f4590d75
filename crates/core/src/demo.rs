//! Deterministic demo core.
//!
//! A tiny frame-counter machine: a PRNG scribbles into RAM every frame and a
//! cursor moves with the d-pad. It has no purpose beyond exercising the
//! save-state machinery end to end, but it honours the [`EmulatorCore`]
//! contract exactly: blobs go through the [`crate::savestate`] container,
//! missing files are `DoesNotExist`, and a failed load leaves the machine
//! untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::emulator::{CoreCapabilities, EmulatorCore, Frame, RunState};
use crate::error::CoreError;
use crate::savestate;

/// Demo screen width in pixels
pub const SCREEN_WIDTH: usize = 64;
/// Demo screen height in pixels
pub const SCREEN_HEIGHT: usize = 48;
/// RAM size in bytes
pub const RAM_SIZE: usize = 256;

/// D-pad bits for [`EmulatorCore::set_input`]
pub const BUTTON_UP: u8 = 1 << 0;
pub const BUTTON_DOWN: u8 = 1 << 1;
pub const BUTTON_LEFT: u8 = 1 << 2;
pub const BUTTON_RIGHT: u8 = 1 << 3;

const CURSOR_SIZE: i16 = 4;
const RNG_SEED: u32 = 0x2545_F491;

/// Everything a save state captures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoMachine {
    pub frame: u64,
    pub cursor_x: i16,
    pub cursor_y: i16,
    pub rng: u32,
    pub ram: Vec<u8>,
}

impl DemoMachine {
    fn power_on() -> Self {
        DemoMachine {
            frame: 0,
            cursor_x: (SCREEN_WIDTH / 2) as i16,
            cursor_y: (SCREEN_HEIGHT / 2) as i16,
            rng: RNG_SEED,
            ram: vec![0; RAM_SIZE],
        }
    }

    fn step(&mut self, buttons: u8) {
        // xorshift32
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rng = x;
        self.ram[(self.frame as usize) % RAM_SIZE] = x as u8;

        if buttons & BUTTON_LEFT != 0 { self.cursor_x -= 1; }
        if buttons & BUTTON_RIGHT != 0 { self.cursor_x += 1; }
        if buttons & BUTTON_UP != 0 { self.cursor_y -= 1; }
        if buttons & BUTTON_DOWN != 0 { self.cursor_y += 1; }
        self.cursor_x = self.cursor_x.rem_euclid(SCREEN_WIDTH as i16);
        self.cursor_y = self.cursor_y.rem_euclid(SCREEN_HEIGHT as i16);
        self.frame += 1;
    }
}

/// The demo core.
pub struct DemoCore {
    id: String,
    run_state: RunState,
    machine: DemoMachine,
    buttons: u8,
    caps: CoreCapabilities,
    jit_enabled: bool,
}

impl DemoCore {
    pub fn new(id: impl Into<String>) -> Self {
        DemoCore {
            id: id.into(),
            run_state: RunState::Stopped,
            machine: DemoMachine::power_on(),
            buttons: 0,
            caps: CoreCapabilities { live_snapshot: true, ..CoreCapabilities::default() },
            jit_enabled: false,
        }
    }

    pub fn with_capabilities(mut self, caps: CoreCapabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn machine(&self) -> &DemoMachine {
        &self.machine
    }

    pub fn frame(&self) -> u64 {
        self.machine.frame
    }

    /// Render the machine as RGBA.
    pub fn framebuffer_rgba(&self) -> Vec<u8> {
        let m = &self.machine;
        let mut out = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 4);
        for y in 0..SCREEN_HEIGHT as i16 {
            for x in 0..SCREEN_WIDTH as i16 {
                let in_cursor = (x - m.cursor_x).rem_euclid(SCREEN_WIDTH as i16) < CURSOR_SIZE
                    && (y - m.cursor_y).rem_euclid(SCREEN_HEIGHT as i16) < CURSOR_SIZE;
                if in_cursor {
                    out.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    let v = m.ram[(y as usize * SCREEN_WIDTH + x as usize) % RAM_SIZE];
                    out.extend_from_slice(&[v / 4, v / 3, v / 2, 255]);
                }
            }
        }
        out
    }
}

impl EmulatorCore for DemoCore {
    fn identifier(&self) -> &str {
        &self.id
    }

    fn state(&self) -> RunState {
        self.run_state
    }

    fn start(&mut self) {
        self.machine = DemoMachine::power_on();
        self.run_state = RunState::Running;
    }

    fn stop(&mut self) {
        self.run_state = RunState::Stopped;
    }

    fn pause(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Paused;
        }
    }

    fn resume(&mut self) -> bool {
        if self.run_state == RunState::Paused {
            self.run_state = RunState::Running;
        }
        self.run_state == RunState::Running
    }

    fn save_state(&mut self, path: &Path) -> Result<(), CoreError> {
        savestate::save_to_file(&self.machine, &self.id, path)
    }

    fn load_state(&mut self, path: &Path) -> Result<(), CoreError> {
        let machine: DemoMachine = savestate::load_from_file(path, &self.id)?;
        if machine.ram.len() != RAM_SIZE {
            return Err(CoreError::Corrupt(format!("RAM size {} (expected {})",
                machine.ram.len(), RAM_SIZE)));
        }
        self.machine = machine;
        Ok(())
    }

    fn frame_snapshot(&self) -> Option<Frame> {
        if self.run_state == RunState::Stopped {
            return None;
        }
        Some(Frame {
            width: SCREEN_WIDTH as u32,
            height: SCREEN_HEIGHT as u32,
            rgba: self.framebuffer_rgba(),
        })
    }

    fn run_frame(&mut self) {
        if self.run_state == RunState::Running {
            self.machine.step(self.buttons);
        }
    }

    fn set_input(&mut self, buttons: u8) {
        self.buttons = buttons;
    }

    fn capabilities(&self) -> CoreCapabilities {
        self.caps
    }

    fn set_jit_enabled(&mut self, enabled: bool) -> Result<(), CoreError> {
        if !self.caps.jit_toggle {
            return Err(CoreError::Unsupported("jit"));
        }
        if self.run_state != RunState::Stopped {
            return Err(CoreError::Unsupported("jit toggle on a live core"));
        }
        self.jit_enabled = enabled;
        Ok(())
    }

    fn is_jit_enabled(&self) -> bool {
        self.jit_enabled
    }
}
