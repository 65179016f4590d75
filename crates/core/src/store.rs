//! On-disk slot store.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//!   .tmp/                  unique temporary files (pause states, staging)
//!   <game-id>/            id with bytes outside [A-Za-z0-9_-] as %XX
//!     index.toml           slot metadata records
//!     slot-<id>.state      core-produced blob
//!     slot-<id>.png        preview image
//! ```
//!
//! Every file in the store is written to a `.partial` sibling first and then
//! renamed into place, so readers never observe a half-written blob. The
//! index is guarded by a mutex shared between clones of the store, which
//! lets background pruning run alongside foreground saves.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::SaveStateError;
use crate::slot::{GameRef, SlotId, SlotKind, SlotRecord};

const INDEX_FILE: &str = "index.toml";
const TEMP_DIR: &str = ".tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SlotIndex {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    slots: Vec<SlotRecord>,
}

/// Handle to a slot store directory. Clones share the index lock.
#[derive(Debug, Clone)]
pub struct SlotStore {
    root: PathBuf,
    index_lock: Arc<Mutex<()>>,
    temp_counter: Arc<AtomicU64>,
}

impl SlotStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// Leftover temporary files from an earlier run are removed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SaveStateError> {
        let root = root.into();
        let temp = root.join(TEMP_DIR);
        fs::create_dir_all(&temp)?;
        for entry in fs::read_dir(&temp)? {
            let path = entry?.path();
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Could not remove stale temp file {}: {}", path.display(), e);
            }
        }
        Ok(SlotStore {
            root,
            index_lock: Arc::new(Mutex::new(())),
            temp_counter: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn game_dir(&self, game: &GameRef) -> Result<PathBuf, SaveStateError> {
        if game.id.is_empty() {
            return Err(SaveStateError::InvalidGameId(game.id.clone()));
        }
        Ok(self.root.join(dir_name(&game.id)))
    }

    /// Blob location of a slot.
    pub fn state_path(&self, game: &GameRef, id: SlotId) -> Result<PathBuf, SaveStateError> {
        Ok(self.game_dir(game)?.join(format!("slot-{}.state", id.0)))
    }

    /// Preview image location of a slot.
    pub fn preview_path(&self, game: &GameRef, id: SlotId) -> Result<PathBuf, SaveStateError> {
        Ok(self.game_dir(game)?.join(format!("slot-{}.png", id.0)))
    }

    /// A fresh path under the store's temp directory. Nothing is created.
    pub fn unique_temp_path(&self) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        self.root.join(TEMP_DIR).join(format!("{}-{}-{:08x}.state", std::process::id(), n, nanos))
    }

    // ─── Index ──────────────────────────────────────────────────────────────

    fn read_index(&self, game: &GameRef) -> Result<SlotIndex, SaveStateError> {
        let path = self.game_dir(game)?.join(INDEX_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| SaveStateError::Index(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SlotIndex::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_index(&self, game: &GameRef, index: &SlotIndex) -> Result<(), SaveStateError> {
        let dir = self.game_dir(game)?;
        fs::create_dir_all(&dir)?;
        let text = toml::to_string(index).map_err(|e| SaveStateError::Index(e.to_string()))?;
        write_atomic(&dir.join(INDEX_FILE), text.as_bytes())?;
        Ok(())
    }

    /// Read-modify-write the index of `game` under the store lock.
    fn with_index<R>(
        &self,
        game: &GameRef,
        f: impl FnOnce(&mut SlotIndex) -> Result<R, SaveStateError>,
    ) -> Result<R, SaveStateError> {
        let _guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut index = self.read_index(game)?;
        let result = f(&mut index)?;
        self.write_index(game, &index)?;
        Ok(result)
    }

    // ─── Queries ────────────────────────────────────────────────────────────

    /// All slots of `kind` for `game`, oldest first.
    pub fn list(&self, game: &GameRef, kind: SlotKind) -> Result<Vec<SlotRecord>, SaveStateError> {
        let _guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut slots: Vec<SlotRecord> = self.read_index(game)?
            .slots.into_iter()
            .filter(|s| s.kind == kind)
            .collect();
        sort_oldest_first(&mut slots);
        Ok(slots)
    }

    /// Slots of `kind` written by `core_id`, oldest first.
    pub fn list_for_core(
        &self,
        game: &GameRef,
        kind: SlotKind,
        core_id: &str,
    ) -> Result<Vec<SlotRecord>, SaveStateError> {
        let mut slots = self.list(game, kind)?;
        slots.retain(|s| s.core_id.as_deref() == Some(core_id));
        Ok(slots)
    }

    pub fn get(&self, game: &GameRef, id: SlotId) -> Result<SlotRecord, SaveStateError> {
        let _guard = self.index_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_index(game)?
            .slots.into_iter()
            .find(|s| s.id == id)
            .ok_or(SaveStateError::NoSuchSlot(id))
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    /// Create a new record. Its blob does not exist until a save writes it.
    pub fn insert(
        &self,
        game: &GameRef,
        kind: SlotKind,
        name: Option<String>,
        now: SystemTime,
    ) -> Result<SlotRecord, SaveStateError> {
        self.with_index(game, |index| {
            index.next_id += 1;
            let record = SlotRecord {
                id: SlotId(index.next_id),
                kind,
                name,
                core_id: None,
                created: now,
                modified: now,
            };
            index.slots.push(record.clone());
            Ok(record)
        })
    }

    /// Replace the stored record with the same id.
    pub fn update(&self, game: &GameRef, record: &SlotRecord) -> Result<(), SaveStateError> {
        self.with_index(game, |index| {
            let slot = index.slots.iter_mut()
                .find(|s| s.id == record.id)
                .ok_or(SaveStateError::NoSuchSlot(record.id))?;
            *slot = record.clone();
            Ok(())
        })
    }

    /// Delete the given slots: records, blobs and previews.
    pub fn remove(&self, game: &GameRef, ids: &[SlotId]) -> Result<usize, SaveStateError> {
        self.remove_where(game, |s| ids.contains(&s.id))
    }

    /// Delete every slot matching `pred` in a single index update.
    pub fn remove_where(
        &self,
        game: &GameRef,
        pred: impl Fn(&SlotRecord) -> bool,
    ) -> Result<usize, SaveStateError> {
        let removed = self.with_index(game, |index| {
            let (gone, kept): (Vec<_>, Vec<_>) = index.slots.drain(..).partition(|s| pred(s));
            index.slots = kept;
            Ok(gone)
        })?;
        for slot in &removed {
            remove_if_exists(&self.state_path(game, slot.id)?)?;
            remove_if_exists(&self.preview_path(game, slot.id)?)?;
        }
        Ok(removed.len())
    }
}

/// Directory name for a game id. Bytes outside `[A-Za-z0-9_-]` become
/// `%XX`, so distinct ids never share a directory and `.` never appears.
fn dir_name(id: &str) -> String {
    let mut name = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            name.push(b as char);
        } else {
            name.push_str(&format!("%{:02X}", b));
        }
    }
    name
}

fn sort_oldest_first(slots: &mut [SlotRecord]) {
    slots.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Write `bytes` to a sibling file, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let partial = partial_path(path);
    fs::write(&partial, bytes)?;
    fs::rename(&partial, path)
}

/// Copy `src` to a sibling of `dst`, then rename it over `dst`.
///
/// Unlike a replace-style move, `src` is left untouched.
pub fn copy_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    let partial = partial_path(dst);
    fs::copy(src, &partial)?;
    fs::rename(&partial, dst)
}

/// The `.partial` path a blob should be written to before [`commit_partial`].
pub fn staging_path(path: &Path) -> PathBuf {
    partial_path(path)
}

/// Rename the staged sibling of `path` into place.
pub fn commit_partial(path: &Path) -> io::Result<()> {
    fs::rename(partial_path(path), path)
}

pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// A temporary state file that is deleted when dropped.
#[derive(Debug)]
pub struct TempStateFile {
    path: PathBuf,
}

impl TempStateFile {
    /// Take ownership of `path`; the file is removed on drop.
    pub fn new(path: PathBuf) -> Self {
        TempStateFile { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl Drop for TempStateFile {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.path) {
            log::warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}
