/// Last-known playback state of every media source seen on the metadata stream.
///
/// Entries are created on the first event naming a source and replaced in full
/// on every later event for it. Nothing is ever removed: a source that goes
/// quiet keeps its last state, and the table survives restarts of the
/// metadata source process.
use std::collections::BTreeMap;
use std::fmt;

use crate::line::SourceUpdate;

/// Playback status reported by a source.
///
/// Anything outside the three well-known values is kept verbatim in
/// [`PlaybackStatus::Other`] so it can be displayed unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    Other(String),
}

impl PlaybackStatus {
    /// Maps a raw status string. Matching is exact and case-sensitive.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            "Stopped" => Self::Stopped,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
            Self::Other(s) => s,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One media-capable application instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub status: PlaybackStatus,
    pub artist: String,
    pub title: String,
}

impl From<&SourceUpdate> for Source {
    fn from(update: &SourceUpdate) -> Self {
        Self {
            status: PlaybackStatus::from_wire(&update.status),
            artist: update.artist.clone(),
            title: update.title.clone(),
        }
    }
}

/// Mapping from source identity to its last-known state.
///
/// Iteration is in identity byte order, which gives the resolver a
/// deterministic tie-break when several sources qualify for the same tier.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceTable {
    sources: BTreeMap<String, Source>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entry for `update.identity` with the update's fields.
    /// Old and new fields are never merged.
    pub fn upsert(&mut self, update: &SourceUpdate) {
        self.sources
            .insert(update.identity.clone(), Source::from(update));
    }

    pub fn get(&self, identity: &str) -> Option<&Source> {
        self.sources.get(identity)
    }

    /// All entries in identity order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Source)> {
        self.sources.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
