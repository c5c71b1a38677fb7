//! Candidate fetching, staged narrowing and seniority labelling.

pub mod fetcher;
pub mod prompts;
pub mod selector;
pub mod seniority;

use serde::Serialize;

pub use fetcher::fetch_in_order;
pub use selector::{SelectionRound, StagedSelector};
pub use seniority::{Seniority, SeniorityClassifier};

/// Pipeline step that talks to the completion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Enrichment,
    Stage1,
    Stage2,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Enrichment => "enrichment",
            Stage::Stage1 => "stage1",
            Stage::Stage2 => "stage2",
        })
    }
}
