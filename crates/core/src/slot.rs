//! Save-state slot model.
//!
//! A slot is one persisted save state of a game: an opaque core-produced
//! blob, an optional preview image and a metadata record. The [`SlotKind`]
//! decides the retention policy:
//!
//! | Kind      | Retention                                          |
//! |-----------|----------------------------------------------------|
//! | `Auto`    | at most two per game, oldest overwritten in place  |
//! | `Quick`   | singleton per game                                 |
//! | `Pause`   | singleton per game                                 |
//! | `Rewind`  | unbounded creation, pruned to `rewind.max_states`  |
//! | `General` | user-named, persistent                             |
//! | `Locked`  | user-named, persistent                             |

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Number of `Auto` slots kept per game.
pub const AUTO_SLOT_LIMIT: usize = 2;

/// Role of a save state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Auto,
    Quick,
    Pause,
    Rewind,
    General,
    Locked,
}

impl SlotKind {
    /// Kinds overwritten in place instead of duplicated.
    pub fn is_singleton(self) -> bool {
        matches!(self, SlotKind::Quick | SlotKind::Pause)
    }

    /// Whether saving into this kind produces a user-facing notice.
    pub fn shows_notice_on_save(self) -> bool {
        !matches!(self, SlotKind::Auto | SlotKind::Rewind)
    }

    /// Kinds whose blob may legitimately be absent when loaded.
    ///
    /// Auto and rewind slots are produced in the background and may be swept
    /// at any time; a missing user-created blob is reported louder.
    pub fn tolerates_missing_file(self) -> bool {
        matches!(self, SlotKind::Auto | SlotKind::Pause | SlotKind::Rewind)
    }

    pub fn label(self) -> &'static str {
        match self {
            SlotKind::Auto => "auto",
            SlotKind::Quick => "quick",
            SlotKind::Pause => "pause",
            SlotKind::Rewind => "rewind",
            SlotKind::General => "general",
            SlotKind::Locked => "locked",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Slot identifier, allocated monotonically per game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The game owning a set of slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GameRef {
    /// Stable identifier, used as the store directory name.
    pub id: String,
    pub name: String,
}

impl GameRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        GameRef { id: id.into(), name: name.into() }
    }
}

/// Metadata record of one persisted slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub id: SlotId,
    pub kind: SlotKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Identifier of the core that wrote the blob. `None` until first written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_id: Option<String>,
    pub created: SystemTime,
    pub modified: SystemTime,
}

impl SlotRecord {
    /// User-visible name: the explicit name, or the modification time.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format_timestamp(self.modified),
        }
    }
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(t: SystemTime) -> String {
    let secs = t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        y, m, d, rem / 3600, (rem / 60) % 60, rem % 60)
}

// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
    (y, m, d)
}
