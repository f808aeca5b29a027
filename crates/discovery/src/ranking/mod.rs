//! Score fusion for the two ranked surfaces
//!
//! Both rankers blend bounded [0,1] signals with fixed weights and
//! break every tie deterministically, so identical inputs always
//! produce identical orderings and identical explanation strings.

pub mod experts;
pub mod search;

pub use experts::{rank_experts, ExpertEvidence, ExpertRow, PaperMatch, PaperSummary};
pub use search::{fuse_candidates, ScoreBreakdown, SearchCandidate, SearchResultRow};

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

pub(crate) fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
