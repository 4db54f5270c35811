//! Identifier newtypes for mods and games.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a mod.
///
/// Identifiers are assigned by the service and are always positive; the
/// distinguished [`ModId::INVALID`] sentinel denotes "unset". Constructing a
/// `ModId` never validates against the server, so callers should check
/// [`ModId::is_valid`] before handing one to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModId(i64);

impl ModId {
    /// Sentinel for an invalid or unset mod identifier.
    pub const INVALID: ModId = ModId(-1);

    pub const fn new(raw: i64) -> Self {
        ModId(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Valid identifiers are strictly positive.
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for ModId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ModId {
    fn from(raw: i64) -> Self {
        ModId(raw)
    }
}

/// Identifier of the game whose mod catalog the engine targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(i64);

impl GameId {
    pub const fn new(raw: i64) -> Self {
        GameId(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
