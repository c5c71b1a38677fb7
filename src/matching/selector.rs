//! Model-assisted narrowing of a candidate list.
//!
//! One round: show the model a context, parse `{"selected": [id, ...]}`
//! strictly, then narrow the input candidates to that selection. When the
//! model under-selects, the round is filled from the head of the input so a
//! round never returns fewer than `min(limit, candidates)` vacancies.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{CompletionClient, CompletionError, CompletionRequest, Message};
use crate::matching::Stage;
use crate::vacancies::{Vacancy, VacancyId};

/// JSON schema the completion is constrained to.
pub fn selection_schema() -> serde_json::Value {
    json!({
        "title": "PickN",
        "type": "object",
        "properties": {
            "selected": {
                "type": "array",
                "items": { "type": "integer" }
            }
        },
        "required": ["selected"]
    })
}

#[derive(Debug, Deserialize)]
struct Selection {
    selected: Vec<VacancyId>,
}

/// Result of one narrowing round.
#[derive(Debug, Clone)]
pub struct SelectionRound {
    pub stage: Stage,
    /// Ids the model picked, deduplicated and capped at `limit`.
    pub selected: Vec<VacancyId>,
    /// Model picks in input order, then any padding.
    pub survivors: Vec<Vacancy>,
    /// True when survivors were padded from the head of the input.
    pub fell_back: bool,
}

impl SelectionRound {
    pub fn survivor_ids(&self) -> Vec<VacancyId> {
        self.survivors.iter().map(|v| v.idx).collect()
    }
}

pub struct StagedSelector<'a> {
    client: &'a dyn CompletionClient,
    max_tokens: u32,
}

impl<'a> StagedSelector<'a> {
    pub fn new(client: &'a dyn CompletionClient, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    /// Asks the model for at most `limit` ids.
    ///
    /// Service errors propagate. An answer that does not parse as a
    /// selection yields an empty list.
    pub fn select(
        &self,
        instruction: &str,
        context: &str,
        limit: usize,
    ) -> Result<Vec<VacancyId>, CompletionError> {
        let request = CompletionRequest::new(vec![
            Message::system(instruction),
            Message::user(context),
        ])
        .with_schema(selection_schema())
        .with_max_tokens(self.max_tokens);

        let raw = self.client.complete(&request)?;

        let Some(mut selected) = parse_selection(&raw) else {
            log::warn!("unusable selection from model: {}", preview(&raw));
            return Ok(vec![]);
        };

        let mut seen = HashSet::new();
        selected.retain(|id| seen.insert(*id));
        selected.truncate(limit);
        Ok(selected)
    }

    /// Runs `select` and narrows `candidates` to the outcome.
    pub fn run_round(
        &self,
        stage: Stage,
        instruction: &str,
        context: &str,
        candidates: &[Vacancy],
        limit: usize,
    ) -> Result<SelectionRound, CompletionError> {
        let selected = self.select(instruction, context, limit)?;
        let (survivors, fell_back) = narrow(candidates, &selected, limit);

        if fell_back {
            log::warn!(
                "{stage}: model selected {} ids, padded to {} of {} from ranking order",
                selected.len(),
                survivors.len(),
                candidates.len()
            );
        }

        Ok(SelectionRound {
            stage,
            selected,
            survivors,
            fell_back,
        })
    }
}

/// Parses the model's answer into ids.
///
/// Tolerates a markdown code fence and prose around the JSON object; a
/// missing or non-integer `selected` field is `None`.
pub fn parse_selection(raw: &str) -> Option<Vec<VacancyId>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(selection) = serde_json::from_str::<Selection>(trimmed) {
        return Some(selection.selected);
    }

    // prose around the object: decode the first value starting at a brace
    // and ignore whatever follows it
    let start = trimmed.find('{')?;
    serde_json::Deserializer::from_str(&trimmed[start..])
        .into_iter::<Selection>()
        .next()?
        .ok()
        .map(|s| s.selected)
}

/// Keeps the candidates the model selected, in input order and capped at
/// `limit`. If fewer than `min(limit, candidates.len())` remain, the earliest
/// unselected candidates are appended after them until that many do. Returns
/// whether padding happened.
pub fn narrow(
    candidates: &[Vacancy],
    selected: &[VacancyId],
    limit: usize,
) -> (Vec<Vacancy>, bool) {
    let target = limit.min(candidates.len());
    let wanted: HashSet<VacancyId> = selected.iter().copied().collect();

    let (picked, rest): (Vec<&Vacancy>, Vec<&Vacancy>) =
        candidates.iter().partition(|v| wanted.contains(&v.idx));

    let fell_back = picked.len() < target;
    let survivors = picked
        .into_iter()
        .chain(rest)
        .take(target)
        .cloned()
        .collect();

    (survivors, fell_back)
}

fn preview(raw: &str) -> String {
    let mut text: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        text.push_str("...");
    }
    text
}
