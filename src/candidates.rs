use crate::raster::MaskRaster;
use serde::{Deserialize, Serialize};

/// Number of ranked mask hypotheses a single decode call returns.
pub const CANDIDATE_COUNT: usize = 3;

/// One ranked mask hypothesis from a decode call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskCandidate {
    pub raster: MaskRaster,
    pub score: f32,
}

/// Exactly three candidates from one decode, ordered by model output index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBatch {
    candidates: [MaskCandidate; CANDIDATE_COUNT],
}

impl CandidateBatch {
    pub fn new(candidates: [MaskCandidate; CANDIDATE_COUNT]) -> Self {
        Self { candidates }
    }

    /// Index of the highest-scoring candidate; ties resolve to the lowest
    /// index.
    pub fn best_index(&self) -> usize {
        let mut best = 0usize;
        for (idx, candidate) in self.candidates.iter().enumerate().skip(1) {
            if candidate.score > self.candidates[best].score {
                best = idx;
            }
        }
        best
    }

    pub fn get(&self, index: usize) -> Option<&MaskCandidate> {
        self.candidates.get(index)
    }

    pub fn best(&self) -> &MaskCandidate {
        &self.candidates[self.best_index()]
    }

    pub fn candidates(&self) -> &[MaskCandidate; CANDIDATE_COUNT] {
        &self.candidates
    }

    pub fn scores(&self) -> [f32; CANDIDATE_COUNT] {
        [
            self.candidates[0].score,
            self.candidates[1].score,
            self.candidates[2].score,
        ]
    }
}
