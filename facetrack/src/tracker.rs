//! Multi-face tracker: three-phase data association over active, inactive
//! and pending track sets
//!
//! Each phase gates (track, detection) pairs, commits unambiguous pairs
//! directly and resolves the remainder with the rectangular assignment
//! solver. Unmatched tracks take misses; unmatched detections with
//! embeddings spawn new pending tracks.

use crate::config::TrackerConfig;
use crate::detection::Detection;
use crate::error::Result;
use crate::face_processor::FaceProcessor;
use crate::frame::{Frame, Orientation};
use crate::rect::Rect;
use crate::rlap;
use crate::track::{AssociationCosts, Track, TrackStatus};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

/// Request to fold one deleted track's downstream references into a
/// surviving track with matching appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeRequest {
    pub source_id: Uuid,
    pub target_id: Uuid,
}

pub type MergeSink = Box<dyn FnMut(MergeRequest) + Send>;

/// Immutable view of one track, safe to ship across task boundaries.
#[derive(Debug, Clone)]
pub struct TrackSnapshot {
    pub id: Uuid,
    pub status: TrackStatus,
    pub rect: Rect,
    pub misses: i32,
    pub cost_summary: String,
}

/// Gated candidate pairs for one association phase, keyed by track, then
/// by detection index.
type CandidateMap = HashMap<Uuid, HashMap<usize, AssociationCosts>>;

pub struct Tracker {
    config: TrackerConfig,
    face_processor: FaceProcessor,
    tracks: HashMap<Uuid, Track>,
    active: Vec<Uuid>,
    pending: Vec<Uuid>,
    inactive: Vec<Uuid>,
    on_merge: Option<MergeSink>,
}

impl Tracker {
    pub fn new(face_processor: FaceProcessor, config: TrackerConfig) -> Self {
        Self {
            config,
            face_processor,
            tracks: HashMap::new(),
            active: Vec::new(),
            pending: Vec::new(),
            inactive: Vec::new(),
            on_merge: None,
        }
    }

    /// Install the sink that receives merge requests emitted when an
    /// inactive track is deleted in favor of a look-alike.
    pub fn set_merge_sink(&mut self, sink: MergeSink) {
        self.on_merge = Some(sink);
    }

    pub fn track(&self, id: &Uuid) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn active_ids(&self) -> &[Uuid] {
        &self.active
    }

    pub fn pending_ids(&self) -> &[Uuid] {
        &self.pending
    }

    pub fn inactive_ids(&self) -> &[Uuid] {
        &self.inactive
    }

    /// Register a permanent track for a known identity. Surfaces
    /// embedding-shape problems synchronously.
    pub fn register_permanent_track(
        &mut self,
        embedding: Vec<f32>,
        detection: Option<&Detection>,
    ) -> Result<Uuid> {
        let track = Track::new_permanent(embedding, detection, self.config.clone())?;
        let id = track.id;
        match track.status() {
            TrackStatus::Active => self.active.push(id),
            TrackStatus::Inactive => self.inactive.push(id),
            TrackStatus::Pending => self.pending.push(id),
        }
        self.tracks.insert(id, track);
        Ok(id)
    }

    /// Release a permanent track back to normal lifecycle rules.
    pub fn release_track(&mut self, id: &Uuid) {
        if let Some(track) = self.tracks.get_mut(id) {
            track.release();
        }
    }

    /// Run one frame through the association pipeline.
    pub fn update(&mut self, frame: &Frame, orientation: Orientation) -> Result<Vec<TrackSnapshot>> {
        for id in self.active.iter().chain(self.pending.iter()) {
            if let Some(track) = self.tracks.get_mut(id) {
                track.predict();
            }
        }

        let mut detections = self.face_processor.detect(frame, orientation)?;
        let mut in_play = vec![true; detections.len()];
        let mut assignments: Vec<(Uuid, usize, AssociationCosts)> = Vec::new();

        // Tracks deactivated by phase A's misses must not take a second
        // miss in phase B on the same frame.
        let inactive_at_start = self.inactive.clone();

        self.associate_active(&mut detections, &mut in_play, &mut assignments, frame, orientation);
        self.associate_inactive(&inactive_at_start, &detections, &mut in_play, &mut assignments);
        self.associate_pending(&detections, &mut in_play, &mut assignments);

        self.register_hits(&detections, &assignments);
        self.spawn_tracks(detections, &in_play, &assignments);

        Ok(self.snapshots())
    }

    /// Phase A: active tracks, motion gate then appearance gate.
    fn associate_active(
        &mut self,
        detections: &mut [Detection],
        in_play: &mut [bool],
        assignments: &mut Vec<(Uuid, usize, AssociationCosts)>,
        frame: &Frame,
        orientation: Orientation,
    ) {
        let phase_tracks = self.active.clone();
        let mut working = phase_tracks.clone();
        let mut candidates = self.initial_cost_filter(
            &working,
            detections,
            in_play,
            GateKind::Motion,
        );
        self.commit_unique_pairs(
            &mut working,
            &mut candidates,
            in_play,
            assignments,
            true,
        );

        // Gate two needs appearance vectors; fill them for every
        // detection still in play, lazily and in one batch.
        let mut to_embed: Vec<&mut Detection> = detections
            .iter_mut()
            .enumerate()
            .filter(|(i, d)| in_play[*i] && !d.has_embedding())
            .map(|(_, d)| d)
            .collect();
        self.face_processor.embed(frame, &mut to_embed, orientation);

        self.appearance_cost_filter(&mut working, detections, &mut candidates);
        self.commit_unique_pairs(
            &mut working,
            &mut candidates,
            in_play,
            assignments,
            false,
        );
        self.solve_phase(&working, &candidates, in_play, assignments);

        self.register_phase_misses(&phase_tracks, assignments, false);
    }

    /// Phase B: inactive tracks, appearance-only gate. Deletion of an
    /// unmatched inactive track triggers the merge policy.
    fn associate_inactive(
        &mut self,
        phase_tracks: &[Uuid],
        detections: &[Detection],
        in_play: &mut [bool],
        assignments: &mut Vec<(Uuid, usize, AssociationCosts)>,
    ) {
        let mut working = phase_tracks.to_vec();
        let mut candidates = self.initial_cost_filter(
            &working,
            detections,
            in_play,
            GateKind::Appearance,
        );
        self.commit_unique_pairs(
            &mut working,
            &mut candidates,
            in_play,
            assignments,
            true,
        );
        self.solve_phase(&working, &candidates, in_play, assignments);

        self.register_phase_misses(phase_tracks, assignments, true);
    }

    /// Phase C: pending tracks, motion gate then appearance gate.
    fn associate_pending(
        &mut self,
        detections: &[Detection],
        in_play: &mut [bool],
        assignments: &mut Vec<(Uuid, usize, AssociationCosts)>,
    ) {
        let phase_tracks = self.pending.clone();
        let mut working = phase_tracks.clone();
        let mut candidates = self.initial_cost_filter(
            &working,
            detections,
            in_play,
            GateKind::Motion,
        );
        self.commit_unique_pairs(
            &mut working,
            &mut candidates,
            in_play,
            assignments,
            true,
        );
        self.appearance_cost_filter(&mut working, detections, &mut candidates);
        self.commit_unique_pairs(
            &mut working,
            &mut candidates,
            in_play,
            assignments,
            false,
        );
        self.solve_phase(&working, &candidates, in_play, assignments);

        self.register_phase_misses(&phase_tracks, assignments, false);
    }

    /// Walk all (track, detection) pairs in parallel, apply the phase
    /// gate and record the survivors.
    fn initial_cost_filter(
        &self,
        working: &[Uuid],
        detections: &[Detection],
        in_play: &[bool],
        gate: GateKind,
    ) -> CandidateMap {
        let tracks = &self.tracks;
        let config = &self.config;
        working
            .par_iter()
            .filter_map(|id| {
                let track = tracks.get(id)?;
                let mut row = HashMap::new();
                for (idx, detection) in detections.iter().enumerate() {
                    if !in_play[idx] {
                        continue;
                    }
                    let costs = match gate {
                        GateKind::Motion => {
                            let iou = track.iou(detection);
                            if iou >= config.min_iou {
                                Some(AssociationCosts {
                                    iou: Some(1.0 - iou),
                                    appearance: None,
                                })
                            } else {
                                None
                            }
                        }
                        GateKind::Appearance => {
                            let appearance = track.cosine_distance(detection);
                            if appearance <= config.max_appearance_cost {
                                Some(AssociationCosts {
                                    iou: None,
                                    appearance: Some(appearance),
                                })
                            } else {
                                None
                            }
                        }
                    };
                    if let Some(costs) = costs {
                        row.insert(idx, costs);
                    }
                }
                if row.is_empty() {
                    None
                } else {
                    Some((*id, row))
                }
            })
            .collect()
    }

    /// Re-check appearance on the surviving pairs, pruning entries over
    /// the gate and tracks whose candidate set empties out.
    fn appearance_cost_filter(
        &self,
        working: &mut Vec<Uuid>,
        detections: &[Detection],
        candidates: &mut CandidateMap,
    ) {
        for id in working.iter() {
            let Some(row) = candidates.get_mut(id) else {
                continue;
            };
            let Some(track) = self.tracks.get(id) else {
                continue;
            };
            row.retain(|idx, costs| {
                let appearance = track.cosine_distance(&detections[*idx]);
                if appearance <= self.config.max_appearance_cost {
                    costs.appearance = Some(appearance);
                    true
                } else {
                    false
                }
            });
        }
        candidates.retain(|_, row| !row.is_empty());
        working.retain(|id| candidates.contains_key(id));
    }

    /// Commit pairs where the track has exactly one candidate detection
    /// and vice versa, bypassing the assignment solver. Must produce the
    /// same matches the solver would on a single-candidate pair.
    ///
    /// When `require_fresh_embedding` is set, tracks still waiting on an
    /// embedding refresh are left for the appearance stage.
    fn commit_unique_pairs(
        &self,
        working: &mut Vec<Uuid>,
        candidates: &mut CandidateMap,
        in_play: &mut [bool],
        assignments: &mut Vec<(Uuid, usize, AssociationCosts)>,
        require_fresh_embedding: bool,
    ) {
        let mut detection_fanout: HashMap<usize, usize> = HashMap::new();
        for row in candidates.values() {
            for idx in row.keys() {
                *detection_fanout.entry(*idx).or_insert(0) += 1;
            }
        }

        let mut committed: Vec<Uuid> = Vec::new();
        for id in working.iter() {
            let Some(row) = candidates.get(id) else {
                continue;
            };
            if row.len() != 1 {
                continue;
            }
            let (&idx, &costs) = row.iter().next().unwrap();
            if detection_fanout.get(&idx) != Some(&1) {
                continue;
            }
            if require_fresh_embedding {
                let needs_update = self
                    .tracks
                    .get(id)
                    .map(|t| t.needs_embedding_update())
                    .unwrap_or(true);
                if needs_update {
                    continue;
                }
            }
            assignments.push((*id, idx, costs));
            in_play[idx] = false;
            committed.push(*id);
        }

        for id in &committed {
            candidates.remove(id);
        }
        working.retain(|id| !committed.contains(id));
    }

    /// Build the fused-cost matrix over the remaining bipartite graph and
    /// apply the solver's matching. Solver failures degrade to an empty
    /// phase result.
    fn solve_phase(
        &self,
        working: &[Uuid],
        candidates: &CandidateMap,
        in_play: &mut [bool],
        assignments: &mut Vec<(Uuid, usize, AssociationCosts)>,
    ) {
        let rows: Vec<Uuid> = working
            .iter()
            .filter(|id| candidates.contains_key(id))
            .copied()
            .collect();
        if rows.is_empty() {
            return;
        }
        let mut cols: Vec<usize> = candidates
            .values()
            .flat_map(|row| row.keys().copied())
            .collect();
        cols.sort_unstable();
        cols.dedup();

        let mut cost = Array2::from_elem((rows.len(), cols.len()), f32::INFINITY);
        for (ri, id) in rows.iter().enumerate() {
            let row = &candidates[id];
            for (ci, idx) in cols.iter().enumerate() {
                if let Some(costs) = row.get(idx) {
                    cost[[ri, ci]] = costs.total(self.config.motion_weight);
                }
            }
        }

        let solution = match rlap::solve(cost.view()) {
            Ok(solution) => solution,
            Err(e) => {
                log::warn!("assignment solver failed on {}x{} matrix: {}", rows.len(), cols.len(), e);
                return;
            }
        };

        for (ri, ci) in solution.pairs() {
            let id = rows[ri];
            let idx = cols[ci];
            let Some(costs) = candidates.get(&id).and_then(|row| row.get(&idx)) else {
                log::warn!("solver matched a forbidden pair; dropping it");
                continue;
            };
            assignments.push((id, idx, *costs));
            in_play[idx] = false;
        }
    }

    /// Misses for every phase track that did not end up assigned. For the
    /// inactive phase this is also where deletion and merging happen.
    fn register_phase_misses(
        &mut self,
        phase_tracks: &[Uuid],
        assignments: &[(Uuid, usize, AssociationCosts)],
        merge_on_delete: bool,
    ) {
        for id in phase_tracks {
            if assignments.iter().any(|(aid, _, _)| aid == id) {
                continue;
            }
            let (before, after, deletable) = {
                let Some(track) = self.tracks.get_mut(id) else {
                    continue;
                };
                let before = track.status();
                track.register_miss();
                (before, track.status(), track.is_deletable())
            };
            if before != after {
                self.set_for(before).retain(|t| t != id);
                self.set_for(after).push(*id);
            }
            if deletable {
                if merge_on_delete {
                    self.merge_and_delete(*id);
                } else {
                    self.delete_track(*id);
                }
            }
        }
    }

    /// Delete `victim`, first looking for the closest-appearance live
    /// track to merge its downstream references into.
    fn merge_and_delete(&mut self, victim: Uuid) {
        let candidate = self.best_merge_candidate(&victim);
        match candidate {
            Some(target_id) => {
                log::debug!("merging deleted track {} into {}", victim, target_id);
                if let Some(sink) = self.on_merge.as_mut() {
                    sink(MergeRequest {
                        source_id: victim,
                        target_id,
                    });
                }
            }
            None => {
                log::debug!("deleting track {} without merge candidate", victim);
            }
        }
        self.delete_track(victim);
    }

    fn best_merge_candidate(&self, victim: &Uuid) -> Option<Uuid> {
        let victim_track = self.tracks.get(victim)?;
        let ceiling = self.config.max_appearance_cost.next_up();
        let mut best: Option<(f32, Uuid)> = None;
        for (id, track) in &self.tracks {
            if id == victim {
                continue;
            }
            let dist = crate::detection::cosine_distance(
                victim_track.embedding(),
                track.embedding(),
            );
            if dist < ceiling && best.map(|(d, _)| dist < d).unwrap_or(true) {
                best = Some((dist, *id));
            }
        }
        best.map(|(_, id)| id)
    }

    fn delete_track(&mut self, id: Uuid) {
        self.tracks.remove(&id);
        self.active.retain(|t| *t != id);
        self.pending.retain(|t| *t != id);
        self.inactive.retain(|t| *t != id);
    }

    /// Apply hits and move tracks between status sets.
    fn register_hits(
        &mut self,
        detections: &[Detection],
        assignments: &[(Uuid, usize, AssociationCosts)],
    ) {
        for (id, idx, costs) in assignments {
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            let before = track.status();
            track.register_hit(&detections[*idx], *costs);
            let after = track.status();
            if before != after {
                self.set_for(before).retain(|t| t != id);
                self.set_for(after).push(*id);
            }
        }
    }

    fn set_for(&mut self, status: TrackStatus) -> &mut Vec<Uuid> {
        match status {
            TrackStatus::Active => &mut self.active,
            TrackStatus::Pending => &mut self.pending,
            TrackStatus::Inactive => &mut self.inactive,
        }
    }

    /// New pending tracks from unassigned detections. A detection with no
    /// embedding cannot seed a track and is dropped.
    fn spawn_tracks(
        &mut self,
        detections: Vec<Detection>,
        in_play: &[bool],
        assignments: &[(Uuid, usize, AssociationCosts)],
    ) {
        for (idx, detection) in detections.into_iter().enumerate() {
            if !in_play[idx] || assignments.iter().any(|(_, aidx, _)| *aidx == idx) {
                continue;
            }
            match Track::new(&detection, self.config.clone()) {
                Ok(track) => {
                    let id = track.id;
                    self.tracks.insert(id, track);
                    self.pending.push(id);
                }
                Err(e) => {
                    log::warn!("dropping unmatched detection: {}", e);
                }
            }
        }
    }

    fn snapshots(&self) -> Vec<TrackSnapshot> {
        let motion_weight = self.config.motion_weight;
        self.active
            .iter()
            .chain(self.pending.iter())
            .chain(self.inactive.iter())
            .filter_map(|id| self.tracks.get(id))
            .map(|track| TrackSnapshot {
                id: track.id,
                status: track.status(),
                rect: track.rect(),
                misses: track.misses(),
                cost_summary: track.last_costs().summary(motion_weight),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum GateKind {
    Motion,
    Appearance,
}
