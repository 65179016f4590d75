//! UI-facing session.
//!
//! A [`Session`] ties one core, one slot store and the rewind scheduler to
//! the game currently being played. Every action takes `&mut self`, so two
//! saves or loads can never overlap; the frontend drives it from a single
//! loop by calling [`Session::poll`] once per frame.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;

use crate::bridge::{LifecycleBridge, StateChange};
use crate::clock::Clock;
use crate::config::Config;
use crate::coordinator::SaveStateCoordinator;
use crate::emulator::{EmulatorCore, RunState};
use crate::error::SaveStateError;
use crate::notice::Notice;
use crate::rewind::RewindScheduler;
use crate::slot::{GameRef, SlotId, SlotKind, SlotRecord};
use crate::store::{SlotStore, TempStateFile};

/// An external request to resume a game, optionally from a given state file.
#[derive(Debug, Clone)]
pub struct DeepLink {
    pub game: GameRef,
    pub save_state: Option<PathBuf>,
}

/// A state staged by a deep link, waiting for the core to run.
#[derive(Debug)]
struct StagedResume {
    game_id: String,
    file: TempStateFile,
}

pub struct Session {
    coordinator: SaveStateCoordinator,
    bridge: LifecycleBridge,
    events: Receiver<StateChange>,
    notices: Receiver<Notice>,
    scheduler: RewindScheduler,
    game: Option<GameRef>,
    staged: Option<StagedResume>,
    in_pause_menu: bool,
}

impl Session {
    pub fn new(
        config: Config,
        core: Box<dyn EmulatorCore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SaveStateError> {
        let store = SlotStore::open(&config.save_root)?;
        log::info!("Save states in {}", store.root().display());
        let (notice_tx, notices) = crossbeam_channel::unbounded();
        let mut bridge = LifecycleBridge::new(core);
        let events = bridge.subscribe();
        Ok(Session {
            coordinator: SaveStateCoordinator::new(store, config, clock, notice_tx),
            bridge,
            events,
            notices,
            scheduler: RewindScheduler::new(),
            game: None,
            staged: None,
            in_pause_menu: false,
        })
    }

    pub fn bridge(&self) -> &LifecycleBridge {
        &self.bridge
    }

    pub fn coordinator(&self) -> &SaveStateCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &Config {
        self.coordinator.config()
    }

    /// Notices for the UI to display, in emission order.
    pub fn notices(&self) -> &Receiver<Notice> {
        &self.notices
    }

    pub fn game(&self) -> Option<&GameRef> {
        self.game.as_ref()
    }

    pub fn is_in_pause_menu(&self) -> bool {
        self.in_pause_menu
    }

    pub fn has_staged_resume(&self) -> bool {
        self.staged.is_some()
    }

    /// Switch to `game`. The core is not touched; call [`Session::start`].
    pub fn set_game(&mut self, game: GameRef) {
        if self.game.as_ref() == Some(&game) {
            return;
        }
        log::info!("Game: {} ({})", game.name, game.id);
        self.scheduler.deactivate();
        if self.in_pause_menu {
            // Close the menu without resuming the outgoing game's core.
            self.in_pause_menu = false;
            self.bridge.set_modal_active(false);
        }
        self.coordinator.end_pause_context();
        if self.staged.as_ref().is_some_and(|s| s.game_id != game.id) {
            log::debug!("Discarding resume state staged for another game");
            self.staged = None;
        }
        self.coordinator.clear_rewind(&game);
        self.game = Some(game);
    }

    /// Start the core from power-on, stopping it first if it is live.
    pub fn start(&mut self) {
        if self.bridge.state() != RunState::Stopped {
            self.bridge.stop();
        }
        self.bridge.start();
    }

    pub fn run_frame(&mut self) {
        self.bridge.core_mut().run_frame();
    }

    pub fn set_input(&mut self, buttons: u8) {
        self.bridge.core_mut().set_input(buttons);
    }

    /// Consume core state changes and run a rewind tick if one is due.
    pub fn poll(&mut self, now: Instant) {
        let changes: Vec<StateChange> = self.events.try_iter().collect();
        for change in changes {
            match change.to {
                RunState::Running if self.staged.is_some() => self.apply_staged(),
                RunState::Stopped => self.scheduler.deactivate(),
                _ => {}
            }
        }

        // `now` is the scheduler's only time source.
        let rewind = &self.coordinator.config().rewind;
        if rewind.enabled && !self.scheduler.is_active() && self.bridge.state() == RunState::Running {
            self.scheduler.activate(now, rewind.interval());
        }

        if self.scheduler.poll(now) {
            if let Some(game) = &self.game {
                self.coordinator.take_rewind_snapshot(&mut self.bridge, game);
            }
        }
    }

    // ─── Save and load ──────────────────────────────────────────────────────

    fn current_game(&self, action: &str) -> Option<GameRef> {
        if self.game.is_none() {
            log::warn!("{}: no game loaded", action);
        }
        self.game.clone()
    }

    pub fn perform_quick_save(&mut self) -> bool {
        let Some(game) = self.current_game("Quick save") else { return false };
        self.coordinator.save_singleton(&mut self.bridge, &game, SlotKind::Quick)
    }

    pub fn perform_quick_load(&mut self) -> bool {
        let Some(game) = self.current_game("Quick load") else { return false };
        match self.coordinator.slots(&game, SlotKind::Quick).last() {
            Some(quick) => self.coordinator.load_slot(&mut self.bridge, &game, quick.id, false),
            None => {
                log::debug!("No quick save for {}", game.id);
                false
            }
        }
    }

    /// Force an auto-save, then reset the core to power-on.
    pub fn perform_restart(&mut self) -> bool {
        let Some(game) = self.current_game("Restart") else { return false };
        self.coordinator.update_auto_save_state(&mut self.bridge, &game, true);
        self.bridge.restart();
        if self.coordinator.config().toasts.restart {
            self.coordinator.notify(Notice::GameRestarted);
        }
        if self.in_pause_menu {
            self.leave_pause_menu();
        }
        true
    }

    /// Save into a slot of `kind`. Singleton kinds reuse their slot; auto
    /// saves go through the auto-slot rotation.
    pub fn request_save(&mut self, kind: SlotKind, name: Option<String>) -> Option<SlotId> {
        let game = self.current_game("Save")?;
        match kind {
            SlotKind::Auto => {
                if !self.coordinator.update_auto_save_state(&mut self.bridge, &game, true) {
                    return None;
                }
                self.coordinator.newest_auto(&game).map(|s| s.id)
            }
            kind if kind.is_singleton() => {
                if !self.coordinator.save_singleton(&mut self.bridge, &game, kind) {
                    return None;
                }
                self.coordinator.slots(&game, kind).first().map(|s| s.id)
            }
            kind => self.coordinator.save_new_slot(&mut self.bridge, &game, kind, name),
        }
    }

    /// Overwrite an existing slot. Locked slots are refused.
    pub fn request_save_into(&mut self, id: SlotId) -> bool {
        let Some(game) = self.current_game("Save") else { return false };
        match self.coordinator.store().get(&game, id) {
            Ok(record) if record.kind == SlotKind::Locked => {
                log::warn!("Slot {} is locked", id);
                false
            }
            Ok(_) => self.coordinator.save_slot(&mut self.bridge, &game, id, None),
            Err(e) => {
                log::error!("Saving into slot {} failed: {}", id, e);
                false
            }
        }
    }

    pub fn request_load(&mut self, id: SlotId) -> bool {
        let Some(game) = self.current_game("Load") else { return false };
        self.coordinator.load_slot(&mut self.bridge, &game, id, false)
    }

    pub fn delete_slot(&mut self, id: SlotId) -> bool {
        let Some(game) = self.current_game("Delete") else { return false };
        self.coordinator.delete_slot(&game, id)
    }

    pub fn slots(&self, kind: SlotKind) -> Vec<SlotRecord> {
        match &self.game {
            Some(game) => self.coordinator.slots(game, kind),
            None => Vec::new(),
        }
    }

    // ─── Pause context ──────────────────────────────────────────────────────

    /// Pause behind a modal menu and capture the pending pause state.
    pub fn enter_pause_menu(&mut self) {
        let Some(game) = self.current_game("Pause menu") else { return };
        self.bridge.pause_emulation();
        self.bridge.set_modal_active(true);
        self.in_pause_menu = true;
        self.coordinator.begin_pause_context(&mut self.bridge, &game);
    }

    /// Drop the pending pause state and resume.
    pub fn leave_pause_menu(&mut self) {
        self.coordinator.end_pause_context();
        self.in_pause_menu = false;
        self.bridge.set_modal_active(false);
        self.bridge.resume_emulation();
    }

    /// Leaving the game for the library: keep its current state as an auto
    /// save.
    pub fn open_game_browser(&mut self) -> bool {
        let Some(game) = self.current_game("Game browser") else { return false };
        self.coordinator.update_auto_save_state(&mut self.bridge, &game, false)
    }

    // ─── App lifecycle ──────────────────────────────────────────────────────

    pub fn did_enter_background(&mut self) -> bool {
        let Some(game) = self.current_game("Background") else { return false };
        self.coordinator.update_auto_save_state(&mut self.bridge, &game, false)
    }

    /// The game wrote its own save data.
    pub fn on_game_saved(&mut self) {
        let Some(game) = self.current_game("Game save") else { return };
        if self.coordinator.config().toasts.game_save {
            self.coordinator.notify(Notice::GameSaved);
        }
        // A state save on such a core writes the game save again.
        if self.bridge.core().capabilities().saves_game_on_state_save {
            return;
        }
        self.coordinator.update_auto_save_state(&mut self.bridge, &game, false);
    }

    // ─── Deep links ─────────────────────────────────────────────────────────

    /// Resume `link.game`, staging a state to load once the core runs.
    pub fn deep_link(&mut self, link: DeepLink) {
        let same_game = self.game.as_ref().is_some_and(|g| g.id == link.game.id);
        if self.staged.as_ref().is_some_and(|s| s.game_id != link.game.id) {
            self.staged = None;
        }

        let staged = match &link.save_state {
            Some(path) => self.coordinator.stage_copy(path),
            None => self.stage_implicit(&link.game, same_game),
        };
        if let Some(file) = staged {
            log::debug!("Staged resume state for {}", link.game.id);
            self.staged = Some(StagedResume { game_id: link.game.id.clone(), file });
        }

        if self.in_pause_menu {
            self.leave_pause_menu();
        }
        if !same_game {
            self.set_game(link.game);
            self.start();
        }
        if self.staged.is_some() && self.bridge.state() == RunState::Running {
            self.apply_staged();
        }
    }

    /// Newest auto slot when auto-load is on, else the pending pause state
    /// of the current game.
    fn stage_implicit(&self, game: &GameRef, same_game: bool) -> Option<TempStateFile> {
        if self.coordinator.config().save_states.auto_load {
            let auto = self.coordinator.newest_auto(game)?;
            let path = self.coordinator.store().state_path(game, auto.id).ok()?;
            return self.coordinator.stage_copy(&path);
        }
        if !same_game {
            return None;
        }
        let pending = self.coordinator.pending_pause()?;
        if pending.game_id() != game.id {
            return None;
        }
        self.coordinator.stage_copy(pending.path())
    }

    fn apply_staged(&mut self) {
        let Some(staged) = self.staged.take() else { return };
        match &self.game {
            Some(game) if game.id == staged.game_id => {
                self.coordinator.load_file(&mut self.bridge, game, staged.file.path(), true);
            }
            _ => log::debug!("Staged resume state belongs to another game; discarded"),
        }
    }

    // ─── Misc ───────────────────────────────────────────────────────────────

    /// Turn on the core's JIT mode, restarting a live core around a state
    /// save if needed.
    pub fn enable_jit(&mut self) -> bool {
        let scratch = TempStateFile::new(self.coordinator.store().unique_temp_path());
        match self.bridge.enable_jit(scratch.path()) {
            Ok(changed) => {
                log::info!("JIT enabled{}", if changed { "" } else { " (already on)" });
                true
            }
            Err(e) => {
                log::error!("Enabling JIT failed: {}", e);
                false
            }
        }
    }

    /// Replace the configuration. The rewind timer is disarmed and, if
    /// rewind is still on, re-armed by the next [`Session::poll`].
    pub fn update_config(&mut self, config: Config) {
        self.coordinator.set_config(config);
        self.scheduler.deactivate();
    }

    /// Block until background persistence work has finished.
    pub fn flush(&self) {
        self.coordinator.flush();
    }
}
