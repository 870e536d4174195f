//! # Blast Pattern Store
//!
//! Tracks the status of every hole in a mission, decoupled from navigation state,
//! grounded on `original_source/amiga_platform/core/blast_pattern.py`'s `BlastPattern`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::pose::Pose;
use chrono::{DateTime, Utc};
use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("hole {0} does not exist")]
    NoSuchHole(usize),

    #[error("hole {index} is already terminal ({status:?})")]
    AlreadyTerminal { index: usize, status: HoleStatus },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Per-hole bookkeeping: position, status, attempt count, error, and module
/// measurements. `position`'s rotation is not persisted (see [`BlastPattern::load`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoleRecord {
    pub index: usize,
    pub position: Pose,
    pub status: HoleStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub measurements: serde_json::Value,
    pub timestamp_completed: Option<DateTime<Utc>>,
}

impl HoleRecord {
    fn new(index: usize, position: Pose) -> Self {
        Self {
            index,
            position,
            status: HoleStatus::Pending,
            attempts: 0,
            last_error: None,
            measurements: serde_json::Value::Null,
            timestamp_completed: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CompletionStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// On-disk representation used by [`BlastPattern::save`]/[`BlastPattern::load`].
/// Mirrors `blast_pattern.py`'s `save_state`/`load_state` JSON shape.
#[derive(Debug, Serialize, Deserialize)]
struct PatternSnapshot {
    mission_name: String,
    last_row_index: usize,
    current_hole_index: Option<usize>,
    holes: Vec<HoleRecord>,
}

/// Mission state manager for a list of holes: which are completed, pending, failed;
/// positions and measurements; resume persistence. Deliberately separate from
/// [`crate::planner::PathPlanner`] to decouple mission state from navigation.
pub struct BlastPattern {
    pub mission_name: String,
    pub last_row_index: usize,
    pub current_hole_index: Option<usize>,
    holes: Vec<HoleRecord>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BlastPattern {
    pub fn new(holes: Vec<Pose>, last_row_index: usize, mission_name: impl Into<String>) -> Self {
        let mission_name = mission_name.into();
        let records = holes
            .into_iter()
            .enumerate()
            .map(|(i, pose)| HoleRecord::new(i, pose))
            .collect::<Vec<_>>();

        log::info!(
            "blast pattern initialized: {} holes, last row index {}",
            records.len(),
            last_row_index
        );

        Self {
            mission_name,
            last_row_index,
            current_hole_index: None,
            holes: records,
        }
    }

    /// The lowest-index hole with status `Pending`, or `None` if there isn't one.
    pub fn next_pending(&self) -> Option<&HoleRecord> {
        self.holes.iter().find(|h| h.status == HoleStatus::Pending)
    }

    pub fn get(&self, index: usize) -> Option<&HoleRecord> {
        self.holes.get(index)
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut HoleRecord, PatternError> {
        self.holes.get_mut(index).ok_or(PatternError::NoSuchHole(index))
    }

    fn require_non_terminal(hole: &HoleRecord) -> Result<(), PatternError> {
        if matches!(
            hole.status,
            HoleStatus::Completed | HoleStatus::Failed | HoleStatus::Skipped
        ) {
            return Err(PatternError::AlreadyTerminal {
                index: hole.index,
                status: hole.status,
            });
        }
        Ok(())
    }

    pub fn mark_in_progress(&mut self, index: usize) -> Result<(), PatternError> {
        let hole = self.get_mut(index)?;
        Self::require_non_terminal(hole)?;
        hole.status = HoleStatus::InProgress;
        hole.attempts += 1;
        log::info!("hole {} marked IN_PROGRESS (attempt {})", index, hole.attempts);
        self.current_hole_index = Some(index);
        Ok(())
    }

    pub fn mark_completed(
        &mut self,
        index: usize,
        measurements: Option<serde_json::Value>,
    ) -> Result<(), PatternError> {
        let hole = self.get_mut(index)?;
        Self::require_non_terminal(hole)?;
        hole.status = HoleStatus::Completed;
        hole.timestamp_completed = Some(Utc::now());
        if let Some(measurements) = measurements {
            hole.measurements = measurements;
        }
        log::info!("hole {} marked COMPLETED", index);
        Ok(())
    }

    pub fn mark_failed(&mut self, index: usize, error: impl Into<String>) -> Result<(), PatternError> {
        let hole = self.get_mut(index)?;
        Self::require_non_terminal(hole)?;
        hole.status = HoleStatus::Failed;
        hole.last_error = Some(error.into());
        log::error!("hole {} marked FAILED: {}", index, hole.last_error.as_deref().unwrap_or(""));
        Ok(())
    }

    pub fn mark_skipped(&mut self, index: usize, reason: impl Into<String>) -> Result<(), PatternError> {
        let hole = self.get_mut(index)?;
        Self::require_non_terminal(hole)?;
        hole.status = HoleStatus::Skipped;
        hole.last_error = Some(reason.into());
        log::warn!("hole {} marked SKIPPED: {}", index, hole.last_error.as_deref().unwrap_or(""));
        Ok(())
    }

    /// All holes have reached a terminal status (completed, failed, or skipped).
    pub fn is_complete(&self) -> bool {
        self.holes.iter().all(|h| {
            matches!(
                h.status,
                HoleStatus::Completed | HoleStatus::Failed | HoleStatus::Skipped
            )
        })
    }

    /// Whether `index` is the last hole of its echelon/row, e.g. with
    /// `last_row_index=3`, holes 3, 7, 11, ... are echelon ends.
    pub fn is_echelon_end(&self, index: usize) -> bool {
        (index + 1) % (self.last_row_index + 1) == 0
    }

    pub fn stats(&self) -> CompletionStats {
        let mut stats = CompletionStats {
            total: self.holes.len(),
            ..Default::default()
        };
        for hole in &self.holes {
            match hole.status {
                HoleStatus::Pending => stats.pending += 1,
                HoleStatus::InProgress => stats.in_progress += 1,
                HoleStatus::Completed => stats.completed += 1,
                HoleStatus::Failed => stats.failed += 1,
                HoleStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }

    pub fn progress_percentage(&self) -> f64 {
        let stats = self.stats();
        if stats.total == 0 {
            return 0.0;
        }
        let processed = stats.completed + stats.failed + stats.skipped;
        (processed as f64 / stats.total as f64) * 100.0
    }

    /// Serialize the full state to `writer` as JSON, enabling mission resume.
    pub fn save<W: Write>(&self, writer: W) -> Result<(), PatternError> {
        let snapshot = PatternSnapshot {
            mission_name: self.mission_name.clone(),
            last_row_index: self.last_row_index,
            current_hole_index: self.current_hole_index,
            holes: self.holes.clone(),
        };
        serde_json::to_writer_pretty(writer, &snapshot)?;
        log::info!("blast pattern state saved");
        Ok(())
    }

    /// Reconstruct a [`BlastPattern`] from a previously [`BlastPattern::save`]d
    /// snapshot. Two deliberate deviations from `blast_pattern.py::load_state`
    /// (documented in DESIGN.md):
    ///
    /// - Each hole's [`Pose`] rotation is not round-tripped; it is rebuilt with
    ///   identity rotation. The planner/coordinate loader remain the heading
    ///   authority for a resumed mission.
    /// - Any hole left `InProgress` by a prior crash is reopened as `Pending`,
    ///   preserving its `attempts` counter, rather than being resumed verbatim.
    pub fn load<R: Read>(reader: R) -> Result<Self, PatternError> {
        let snapshot: PatternSnapshot = serde_json::from_reader(reader)?;

        let holes = snapshot
            .holes
            .into_iter()
            .map(|mut hole| {
                hole.position = Pose::new(
                    hole.position.translation,
                    UnitQuaternion::<f64>::identity(),
                    hole.position.frame_a.clone(),
                    hole.position.frame_b.clone(),
                );
                if hole.status == HoleStatus::InProgress {
                    log::warn!(
                        "hole {} was IN_PROGRESS on load, reopening as PENDING (attempt {} preserved)",
                        hole.index,
                        hole.attempts
                    );
                    hole.status = HoleStatus::Pending;
                }
                hole
            })
            .collect();

        log::info!("blast pattern state loaded");

        let pattern = Self {
            mission_name: snapshot.mission_name,
            last_row_index: snapshot.last_row_index,
            current_hole_index: snapshot.current_hole_index,
            holes,
        };
        log::info!("progress: {:.1}%", pattern.progress_percentage());
        Ok(pattern)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    fn holes(n: usize) -> Vec<Pose> {
        (0..n)
            .map(|i| Pose::new(Vector3::new(i as f64, 0.0, 0.0), UnitQuaternion::identity(), "world", "hole"))
            .collect()
    }

    #[test]
    fn next_pending_returns_lowest_index_pending_hole() {
        let mut pattern = BlastPattern::new(holes(3), 7, "mission");
        pattern.mark_in_progress(0).unwrap();
        pattern.mark_completed(0, None).unwrap();
        assert_eq!(pattern.next_pending().unwrap().index, 1);
    }

    #[test]
    fn stats_and_completion_reflect_terminal_statuses() {
        let mut pattern = BlastPattern::new(holes(3), 7, "mission");
        pattern.mark_in_progress(0).unwrap();
        pattern.mark_completed(0, None).unwrap();
        pattern.mark_in_progress(1).unwrap();
        pattern.mark_failed(1, "stuck").unwrap();
        pattern.mark_in_progress(2).unwrap();
        pattern.mark_skipped(2, "blocked").unwrap();

        assert!(pattern.is_complete());
        let stats = pattern.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn echelon_end_matches_last_row_index_pattern() {
        let pattern = BlastPattern::new(holes(8), 3, "mission");
        assert!(pattern.is_echelon_end(3));
        assert!(pattern.is_echelon_end(7));
        assert!(!pattern.is_echelon_end(2));
    }

    #[test]
    fn marking_a_terminal_hole_again_is_rejected() {
        let mut pattern = BlastPattern::new(holes(1), 7, "mission");
        pattern.mark_in_progress(0).unwrap();
        pattern.mark_completed(0, None).unwrap();
        assert!(matches!(
            pattern.mark_failed(0, "too late"),
            Err(PatternError::AlreadyTerminal { .. })
        ));
    }

    #[test]
    fn save_then_load_round_trips_through_an_in_memory_buffer() {
        let mut pattern = BlastPattern::new(holes(2), 7, "mission");
        pattern.mark_in_progress(0).unwrap();
        pattern.mark_completed(0, Some(serde_json::json!({"depth_cm": 45}))).unwrap();

        let mut buf = Vec::new();
        pattern.save(&mut buf).unwrap();

        let loaded = BlastPattern::load(buf.as_slice()).unwrap();
        assert_eq!(loaded.stats().completed, 1);
        assert_eq!(loaded.get(0).unwrap().measurements, serde_json::json!({"depth_cm": 45}));
    }

    #[test]
    fn load_reopens_in_progress_holes_as_pending_and_preserves_attempts() {
        let mut pattern = BlastPattern::new(holes(1), 7, "mission");
        pattern.mark_in_progress(0).unwrap();

        let mut buf = Vec::new();
        pattern.save(&mut buf).unwrap();

        let loaded = BlastPattern::load(buf.as_slice()).unwrap();
        let hole = loaded.get(0).unwrap();
        assert_eq!(hole.status, HoleStatus::Pending);
        assert_eq!(hole.attempts, 1);
    }
}
