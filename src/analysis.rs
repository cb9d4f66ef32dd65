use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// One note onset inside a track. Fields beyond the three the scheduler
/// needs stay addressable by path through the raw document mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteEvent {
    pub midi: i64,
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: Vec<NoteEvent>,
}

/// Parsed performance document plus the raw text it came from.
///
/// The parsed tracks feed the tally pass; path extraction re-parses the raw
/// mirror on demand. Two copies of the same document, kept deliberately:
/// the graph records paths against the raw shape, extra fields included.
#[derive(Debug, Clone)]
pub struct PerformanceDocument {
    pub tracks: Vec<TrackData>,
    pub raw: String,
}

impl PerformanceDocument {
    /// Parses the top-level track array.
    pub fn from_str(raw: &str) -> Result<PerformanceDocument> {
        let tracks: Vec<TrackData> =
            serde_json::from_str(raw).map_err(|source| EngineError::Parse {
                context: "performance document".to_string(),
                source,
            })?;
        Ok(PerformanceDocument {
            tracks,
            raw: raw.to_string(),
        })
    }

    pub fn from_file(path: &Path) -> Result<PerformanceDocument> {
        let raw = fs::read_to_string(path)?;
        Self::from_str(&raw)
    }

    /// Re-parses the raw mirror for path-based extraction.
    pub fn raw_value(&self) -> Result<serde_json::Value> {
        serde_json::from_str(&self.raw).map_err(|source| EngineError::Parse {
            context: "raw performance document".to_string(),
            source,
        })
    }
}

/// Per-track unique pitch tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackAnalysis {
    pub track_count: usize,
    pub unique_note_counts: Vec<usize>,
    /// Distinct pitches per track, in ascending order. This single ordering
    /// is reused by instance creation, toggles and the apply sweep so that
    /// index-based re-matching can never desynchronize.
    pub unique_notes: Vec<Vec<i64>>,
}

pub fn analyze_tracks(tracks: &[TrackData]) -> TrackAnalysis {
    let mut unique_note_counts = Vec::with_capacity(tracks.len());
    let mut unique_notes = Vec::with_capacity(tracks.len());

    for track in tracks {
        let pitches: BTreeSet<i64> = track.notes.iter().map(|n| n.midi).collect();
        unique_note_counts.push(pitches.len());
        unique_notes.push(pitches.into_iter().collect());
    }

    TrackAnalysis {
        track_count: tracks.len(),
        unique_note_counts,
        unique_notes,
    }
}
