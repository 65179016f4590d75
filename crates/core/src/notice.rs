//! Transient user-facing notices ("toasts").
//!
//! Only successful operations produce notices; failures are logged.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    StateSaved(String),
    QuickSaved,
    StateLoaded(String),
    QuickLoaded,
    RewoundTo(String),
    GameRestarted,
    GameSaved,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::StateSaved(name) if name.is_empty() => f.write_str("Saved State"),
            Notice::StateSaved(name) => write!(f, "Saved State {}", name),
            Notice::QuickSaved => f.write_str("Quick Saved"),
            Notice::StateLoaded(name) if name.is_empty() => f.write_str("Loaded State"),
            Notice::StateLoaded(name) => write!(f, "Loaded State {}", name),
            Notice::QuickLoaded => f.write_str("Quick Loaded"),
            Notice::RewoundTo(name) => write!(f, "Rewound to {}", name),
            Notice::GameRestarted => f.write_str("Game Restarted"),
            Notice::GameSaved => f.write_str("Game Saved"),
        }
    }
}
