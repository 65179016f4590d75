//! Save-state coordinator.
//!
//! The only writer of slot files and slot metadata. Every save or load runs
//! against the core inside the bridge's suspend envelope, except rewind
//! snapshots, which are taken live on cores that allow it.
//!
//! Failure policy: nothing here is fatal to emulation. Public operations log
//! and return a `bool` for "did it happen"; internal steps use `Result`.
//!
//! - A missing blob on load is a silent no-op for auto/pause/rewind slots
//!   and a warning for user-created ones.
//! - Any other I/O or decode error is logged and the operation abandoned;
//!   the core keeps its pre-load image.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::Sender;

use crate::background::BackgroundQueue;
use crate::bridge::LifecycleBridge;
use crate::clock::Clock;
use crate::config::Config;
use crate::emulator::{EmulatorCore, RunState};
use crate::error::{CoreError, SaveStateError};
use crate::notice::Notice;
use crate::png;
use crate::rewind::retention_victims;
use crate::slot::{GameRef, SlotId, SlotKind, SlotRecord, AUTO_SLOT_LIMIT};
use crate::store::{self, SlotStore, TempStateFile};

/// The uncommitted state captured when the pause menu opens.
///
/// Dropping it deletes its file. `is_saved` makes promotion into an auto
/// slot one-shot.
#[derive(Debug)]
pub struct PendingPauseState {
    file: TempStateFile,
    game_id: String,
    is_saved: bool,
}

impl PendingPauseState {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn is_saved(&self) -> bool {
        self.is_saved
    }
}

pub struct SaveStateCoordinator {
    store: SlotStore,
    queue: BackgroundQueue,
    config: Config,
    clock: Arc<dyn Clock>,
    pending_pause: Option<PendingPauseState>,
    notices: Sender<Notice>,
}

impl SaveStateCoordinator {
    pub fn new(
        store: SlotStore,
        config: Config,
        clock: Arc<dyn Clock>,
        notices: Sender<Notice>,
    ) -> Self {
        SaveStateCoordinator {
            store,
            queue: BackgroundQueue::new("savekeep-io"),
            config,
            clock,
            pending_pause: None,
            notices,
        }
    }

    pub fn store(&self) -> &SlotStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Wait for queued background work (pruning) to finish.
    pub fn flush(&self) {
        self.queue.flush();
    }

    pub fn notify(&self, notice: Notice) {
        log::info!("{}", notice);
        let _ = self.notices.send(notice);
    }

    // ─── Saving ─────────────────────────────────────────────────────────────

    /// Write the core's state (or a copy of `replacement`) into `record`'s
    /// blob, refresh its preview, and stamp modified time and core id.
    /// The caller persists the record.
    fn write_slot(
        &self,
        core: &mut dyn EmulatorCore,
        game: &GameRef,
        record: &mut SlotRecord,
        replacement: Option<&Path>,
    ) -> Result<(), SaveStateError> {
        let path = self.store.state_path(game, record.id)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        match replacement {
            Some(src) => store::copy_atomic(src, &path)?,
            None => {
                core.save_state(&store::staging_path(&path))?;
                store::commit_partial(&path)?;
            }
        }

        if let Some(frame) = core.frame_snapshot() {
            let preview = png::encode_png(frame.width, frame.height, &frame.rgba);
            let written = self.store.preview_path(game, record.id)
                .and_then(|p| store::write_atomic(&p, &preview).map_err(SaveStateError::from));
            if let Err(e) = written {
                log::warn!("Preview for slot {} not written: {}", record.id, e);
            }
        }

        record.modified = self.clock.now();
        record.core_id = Some(core.identifier().to_string());
        Ok(())
    }

    /// Write a freshly inserted record; on failure the record is dropped so
    /// no blob-less slot is left behind.
    fn write_new_slot(
        &self,
        core: &mut dyn EmulatorCore,
        game: &GameRef,
        mut record: SlotRecord,
        replacement: Option<&Path>,
    ) -> Result<SlotRecord, SaveStateError> {
        let written = self.write_slot(core, game, &mut record, replacement)
            .and_then(|_| self.store.update(game, &record));
        match written {
            Ok(()) => Ok(record),
            Err(e) => {
                if let Err(cleanup) = self.store.remove(game, &[record.id]) {
                    log::warn!("Could not drop unwritten slot {}: {}", record.id, cleanup);
                }
                Err(e)
            }
        }
    }

    fn saved_notice(&self, record: &SlotRecord) {
        if !self.config.toasts.state_save || !record.kind.shows_notice_on_save() {
            return;
        }
        self.notify(match record.kind {
            SlotKind::Quick => Notice::QuickSaved,
            _ => Notice::StateSaved(record.display_name()),
        });
    }

    /// Save into an existing slot inside the suspend envelope.
    pub fn save_slot(
        &mut self,
        bridge: &mut LifecycleBridge,
        game: &GameRef,
        id: SlotId,
        replacement: Option<&Path>,
    ) -> bool {
        let result = self.store.get(game, id).and_then(|mut record| {
            bridge.with_suspended_emulation(|core| {
                self.write_slot(core, game, &mut record, replacement)
            })?;
            self.store.update(game, &record)?;
            Ok(record)
        });
        match result {
            Ok(record) => {
                log::debug!("Saved {} slot {} for {}", record.kind, record.id, game.id);
                self.saved_notice(&record);
                true
            }
            Err(e) => {
                log::error!("Saving slot {} for {} failed: {}", id, game.id, e);
                false
            }
        }
    }

    /// Create a new slot of `kind` and save into it.
    pub fn save_new_slot(
        &mut self,
        bridge: &mut LifecycleBridge,
        game: &GameRef,
        kind: SlotKind,
        name: Option<String>,
    ) -> Option<SlotId> {
        let result = self.store.insert(game, kind, name, self.clock.now()).and_then(|record| {
            bridge.with_suspended_emulation(|core| self.write_new_slot(core, game, record, None))
        });
        match result {
            Ok(record) => {
                self.saved_notice(&record);
                Some(record.id)
            }
            Err(e) => {
                log::error!("Creating {} slot for {} failed: {}", kind, game.id, e);
                None
            }
        }
    }

    /// Save into the singleton slot of `kind`, creating it if needed.
    pub fn save_singleton(
        &mut self,
        bridge: &mut LifecycleBridge,
        game: &GameRef,
        kind: SlotKind,
    ) -> bool {
        debug_assert!(kind.is_singleton());
        match self.store.list(game, kind) {
            Ok(existing) => match existing.first() {
                Some(record) => self.save_slot(bridge, game, record.id, None),
                None => self.save_new_slot(bridge, game, kind, None).is_some(),
            },
            Err(e) => {
                log::error!("Listing {} slots for {} failed: {}", kind, game.id, e);
                false
            }
        }
    }

    // ─── Auto slots ─────────────────────────────────────────────────────────

    /// Take the one-shot promotion right of the pending pause state.
    fn claim_auto_save(&mut self) -> bool {
        match &mut self.pending_pause {
            Some(pending) if pending.is_saved => false,
            Some(pending) => {
                pending.is_saved = true;
                true
            }
            None => true,
        }
    }

    /// Overwrite the oldest auto slot once the limit is reached, otherwise
    /// create one. The pending pause state, if any, is the content.
    fn refresh_auto_slot(
        &mut self,
        core: &mut dyn EmulatorCore,
        game: &GameRef,
    ) -> Result<SlotId, SaveStateError> {
        let replacement: Option<PathBuf> = self.pending_pause.as_ref()
            .filter(|p| p.game_id == game.id && p.file.exists())
            .map(|p| p.path().to_path_buf());

        let mut autos = self.store.list(game, SlotKind::Auto)?;
        if autos.len() > AUTO_SLOT_LIMIT {
            let extra: Vec<SlotId> = autos.iter()
                .take(autos.len() - AUTO_SLOT_LIMIT)
                .map(|s| s.id)
                .collect();
            self.store.remove(game, &extra)?;
            autos = autos.split_off(extra.len());
        }

        if autos.len() >= AUTO_SLOT_LIMIT {
            let mut oldest = autos.swap_remove(0);
            self.write_slot(core, game, &mut oldest, replacement.as_deref())?;
            // Listings sort by creation time, so the refreshed slot moves to the end.
            oldest.created = oldest.modified;
            self.store.update(game, &oldest)?;
            Ok(oldest.id)
        } else {
            let record = self.store.insert(game, SlotKind::Auto, None, self.clock.now())?;
            Ok(self.write_new_slot(core, game, record, replacement.as_deref())?.id)
        }
    }

    /// Refresh the auto slots of `game`.
    ///
    /// Skipped unless auto-save is on or `force` is set, when the core is
    /// stopped, and when the pending pause state was already promoted.
    /// Runs synchronously: callers include app-backgrounding, where deferred
    /// work may never complete.
    pub fn update_auto_save_state(
        &mut self,
        bridge: &mut LifecycleBridge,
        game: &GameRef,
        force: bool,
    ) -> bool {
        if !(self.config.save_states.auto_save || force) {
            return false;
        }
        if bridge.state() == RunState::Stopped {
            return false;
        }
        if !self.claim_auto_save() {
            log::debug!("Pause state already promoted to auto slot; skipping");
            return false;
        }
        match bridge.with_suspended_emulation(|core| self.refresh_auto_slot(core, game)) {
            Ok(id) => {
                log::debug!("Auto slot {} updated for {}", id, game.id);
                true
            }
            Err(e) => {
                log::error!("Auto-save for {} failed: {}", game.id, e);
                false
            }
        }
    }

    /// Newest auto slot of `game`, if any.
    pub fn newest_auto(&self, game: &GameRef) -> Option<SlotRecord> {
        match self.store.list(game, SlotKind::Auto) {
            Ok(mut autos) => autos.pop(),
            Err(e) => {
                log::error!("Listing auto slots for {} failed: {}", game.id, e);
                None
            }
        }
    }

    // ─── Loading ────────────────────────────────────────────────────────────

    fn loaded_notice(&self, record: &SlotRecord) {
        self.notify(match record.kind {
            SlotKind::Quick => Notice::QuickLoaded,
            SlotKind::Rewind => Notice::RewoundTo(record.display_name()),
            _ => Notice::StateLoaded(record.display_name()),
        });
    }

    /// Load a persisted slot into the core.
    ///
    /// A safety auto-save of the current state is taken first. When the
    /// slot being loaded is itself an auto slot, its blob is moved aside
    /// before that auto-save so the core never reads a file that is being
    /// rewritten; the blob is moved back if the auto-save did not reuse the
    /// slot.
    ///
    /// Whether or not the core accepted the blob, rewind slots are then
    /// pruned in the background:
    /// everything at or after a loaded rewind slot's creation time, or all
    /// of them for any other kind.
    pub fn load_slot(
        &mut self,
        bridge: &mut LifecycleBridge,
        game: &GameRef,
        id: SlotId,
        silent: bool,
    ) -> bool {
        let record = match self.store.get(game, id) {
            Ok(record) => record,
            Err(e) => {
                log::error!("Loading slot {} for {} failed: {}", id, game.id, e);
                return false;
            }
        };
        let path = match self.store.state_path(game, record.id) {
            Ok(path) => path,
            Err(e) => {
                log::error!("Loading slot {} for {} failed: {}", id, game.id, e);
                return false;
            }
        };
        let safety_allowed = bridge.state() != RunState::Stopped;

        let result = bridge.with_suspended_emulation(|core| {
            let moved = if record.kind == SlotKind::Auto {
                self.move_aside(&path)
            } else {
                None
            };

            if safety_allowed && self.claim_auto_save() {
                if let Err(e) = self.refresh_auto_slot(&mut *core, game) {
                    log::error!("Safety auto-save before load failed: {}", e);
                }
            }

            let source = moved.as_ref().map(|t| t.path()).unwrap_or(path.as_path());
            let result = core.load_state(source);

            if let Some(tmp) = &moved {
                if !path.exists() {
                    if let Err(e) = fs::rename(tmp.path(), &path) {
                        log::warn!("Could not restore auto slot {}: {}", record.id, e);
                    }
                }
            }
            result
        });

        let loaded = match result {
            Ok(()) => {
                log::info!("Loaded {} slot {} for {}", record.kind, record.id, game.id);
                if self.config.toasts.state_load && !silent {
                    self.loaded_notice(&record);
                }
                true
            }
            Err(e) => {
                self.report_load_failure(&record, &e);
                false
            }
        };
        let after = (record.kind == SlotKind::Rewind).then_some(record.created);
        self.schedule_rewind_prune(game, after);
        loaded
    }

    /// Move a blob to a private temp file. `None` if there was nothing to move.
    fn move_aside(&self, path: &Path) -> Option<TempStateFile> {
        let tmp = TempStateFile::new(self.store.unique_temp_path());
        match fs::rename(path, tmp.path()) {
            Ok(()) => Some(tmp),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!("Could not move {} aside: {}", path.display(), e);
                None
            }
        }
    }

    fn report_load_failure(&self, record: &SlotRecord, err: &CoreError) {
        match err {
            CoreError::DoesNotExist(path) if record.kind.tolerates_missing_file() => {
                log::debug!("Save state {} does not exist", path.display());
            }
            CoreError::DoesNotExist(path) => {
                log::warn!("{} slot {} has no blob at {}", record.kind, record.id, path.display());
            }
            _ => log::error!("Loading {} slot {} failed: {}", record.kind, record.id, err),
        }
    }

    /// Load an unmanaged state file, e.g. a staged deep-link state.
    pub fn load_file(&mut self, bridge: &mut LifecycleBridge, game: &GameRef, path: &Path, silent: bool) -> bool {
        match bridge.with_suspended_emulation(|core| core.load_state(path)) {
            Ok(()) => {
                if self.config.toasts.state_load && !silent {
                    self.notify(Notice::StateLoaded(String::new()));
                }
                self.schedule_rewind_prune(game, None);
                true
            }
            Err(e) if e.is_missing() => {
                log::debug!("Save state {} does not exist", path.display());
                false
            }
            Err(e) => {
                log::error!("Loading {} failed: {}", path.display(), e);
                false
            }
        }
    }

    // ─── Rewind ─────────────────────────────────────────────────────────────

    /// Delete rewind slots of `game` in the background after the configured
    /// delay: those created at or after `after`, or all when `None`.
    /// Does nothing when `rewind.keep_states` is set.
    pub fn schedule_rewind_prune(&self, game: &GameRef, after: Option<SystemTime>) {
        if self.config.rewind.keep_states {
            return;
        }
        let store = self.store.clone();
        let game = game.clone();
        self.queue.submit_after(self.config.prune_delay(), move || {
            let pruned = store.remove_where(&game, |s| {
                s.kind == SlotKind::Rewind && after.map_or(true, |t| s.created >= t)
            });
            match pruned {
                Ok(0) => {}
                Ok(n) => log::debug!("Pruned {} rewind slots for {}", n, game.id),
                Err(e) => log::warn!("Pruning rewind slots for {} failed: {}", game.id, e),
            }
        });
    }

    /// One rewind tick: enforce retention, then snapshot the running core
    /// without pausing it.
    ///
    /// Skipped when rewind is off, the core is not running, or the core
    /// cannot serialize while running.
    pub fn take_rewind_snapshot(&mut self, bridge: &mut LifecycleBridge, game: &GameRef) -> bool {
        let max_states = self.config.rewind.max_states;
        if !self.config.rewind.enabled || max_states == 0 {
            return false;
        }
        if bridge.state() != RunState::Running {
            return false;
        }
        if !bridge.core().capabilities().live_snapshot {
            log::debug!("Core {} cannot snapshot while running; rewind skipped",
                bridge.core().identifier());
            return false;
        }

        let core_id = bridge.core().identifier().to_string();
        match self.store.list_for_core(game, SlotKind::Rewind, &core_id) {
            Ok(existing) => {
                let victims = retention_victims(&existing, max_states);
                if !victims.is_empty() {
                    let store = self.store.clone();
                    let game = game.clone();
                    self.queue.submit(move || {
                        if let Err(e) = store.remove(&game, &victims) {
                            log::warn!("Rewind retention for {} failed: {}", game.id, e);
                        }
                    });
                }
            }
            Err(e) => log::warn!("Counting rewind slots for {} failed: {}", game.id, e),
        }

        let result = self.store.insert(game, SlotKind::Rewind, None, self.clock.now())
            .and_then(|record| self.write_new_slot(bridge.core_mut(), game, record, None));
        match result {
            Ok(record) => {
                log::trace!("Rewind slot {} for {}", record.id, game.id);
                true
            }
            Err(e) => {
                log::warn!("Rewind snapshot for {} failed: {}", game.id, e);
                false
            }
        }
    }

    /// Delete every rewind slot of `game` now, unless `rewind.keep_states`.
    pub fn clear_rewind(&self, game: &GameRef) {
        if self.config.rewind.keep_states {
            return;
        }
        match self.store.remove_where(game, |s| s.kind == SlotKind::Rewind) {
            Ok(0) => {}
            Ok(n) => log::debug!("Cleared {} rewind slots for {}", n, game.id),
            Err(e) => log::warn!("Clearing rewind slots for {} failed: {}", game.id, e),
        }
    }

    // ─── Pause context ──────────────────────────────────────────────────────

    /// Capture the pending pause state. Any previous one is deleted first.
    pub fn begin_pause_context(&mut self, bridge: &mut LifecycleBridge, game: &GameRef) -> bool {
        self.pending_pause = None;
        let file = TempStateFile::new(self.store.unique_temp_path());
        let result = bridge.with_suspended_emulation(|core| core.save_state(file.path()));
        match result {
            Ok(()) => {
                self.pending_pause = Some(PendingPauseState {
                    file,
                    game_id: game.id.clone(),
                    is_saved: false,
                });
                true
            }
            Err(e) => {
                log::error!("Capturing pause state for {} failed: {}", game.id, e);
                false
            }
        }
    }

    /// Drop the pending pause state, deleting its file.
    pub fn end_pause_context(&mut self) {
        self.pending_pause = None;
    }

    pub fn pending_pause(&self) -> Option<&PendingPauseState> {
        self.pending_pause.as_ref()
    }

    // ─── Misc ───────────────────────────────────────────────────────────────

    /// Copy `src` to a private temp file owned by the caller.
    pub fn stage_copy(&self, src: &Path) -> Option<TempStateFile> {
        let tmp = TempStateFile::new(self.store.unique_temp_path());
        match fs::copy(src, tmp.path()) {
            Ok(_) => Some(tmp),
            Err(e) => {
                log::error!("Staging {} failed: {}", src.display(), e);
                None
            }
        }
    }

    pub fn slots(&self, game: &GameRef, kind: SlotKind) -> Vec<SlotRecord> {
        self.store.list(game, kind).unwrap_or_else(|e| {
            log::error!("Listing {} slots for {} failed: {}", kind, game.id, e);
            Vec::new()
        })
    }

    pub fn delete_slot(&mut self, game: &GameRef, id: SlotId) -> bool {
        match self.store.remove(game, &[id]) {
            Ok(n) => n > 0,
            Err(e) => {
                log::error!("Deleting slot {} for {} failed: {}", id, game.id, e);
                false
            }
        }
    }
}
