use crate::{
    app::errors::MatchError,
    config::MatchingConfig,
    llm::CompletionClient,
    matching::{
        fetch_in_order,
        prompts::{stage1_context, stage1_instruction, stage2_context, stage2_instruction},
        SelectionRound, Seniority, SeniorityClassifier, Stage, StagedSelector,
    },
    semantic::{enrich_query, normalize_query, EmbedKind, Embedder, IndexService, IndexStats},
    vacancies::{Vacancy, VacancyId, VacancyStore},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};

pub const K_FAISS_MAX: usize = 2000;
pub const K_STAGE1_MAX: usize = 200;
pub const K_STAGE2_MAX: usize = 100;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MatchRequest {
    pub resume: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_faiss: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_stage1: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k_stage2: Option<usize>,
}

/// Per-request size bounds after defaults are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBounds {
    pub k_faiss: usize,
    pub k_stage1: usize,
    pub k_stage2: usize,
}

impl MatchRequest {
    pub fn new(resume: impl Into<String>) -> Self {
        Self {
            resume: resume.into(),
            ..Default::default()
        }
    }

    /// Fills unset bounds from `defaults` and range-checks all three. The
    /// relative order of the bounds is left to the caller.
    pub fn bounds(&self, defaults: &MatchingConfig) -> Result<MatchBounds, MatchError> {
        let bounds = MatchBounds {
            k_faiss: self.k_faiss.unwrap_or(defaults.k_faiss),
            k_stage1: self.k_stage1.unwrap_or(defaults.k_stage1),
            k_stage2: self.k_stage2.unwrap_or(defaults.k_stage2),
        };

        let checks = [
            ("k_faiss", bounds.k_faiss, K_FAISS_MAX),
            ("k_stage1", bounds.k_stage1, K_STAGE1_MAX),
            ("k_stage2", bounds.k_stage2, K_STAGE2_MAX),
        ];
        for (name, value, max) in checks {
            if !(1..=max).contains(&value) {
                return Err(MatchError::InvalidRequest(format!(
                    "{name} must be between 1 and {max}, got {value}"
                )));
            }
        }

        Ok(bounds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedVacancy {
    pub idx: VacancyId,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub experience: String,
    pub job_type: String,
    pub description: String,
    pub key_skills: String,
    pub hh_url: String,
    pub seniority_level: Seniority,
}

impl MatchedVacancy {
    fn new(vacancy: &Vacancy, seniority_level: Seniority) -> Self {
        Self {
            idx: vacancy.idx,
            title: vacancy.title.clone(),
            company: vacancy.company.clone(),
            location: vacancy.location.clone(),
            salary: vacancy.salary.clone(),
            experience: vacancy.experience.clone(),
            job_type: vacancy.job_type.clone(),
            description: vacancy.description.clone(),
            key_skills: vacancy.key_skills.clone(),
            hh_url: vacancy.url(),
            seniority_level,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResponse {
    /// Ids from the vector index, most similar first.
    pub top_idx: Vec<VacancyId>,
    /// Stage 1 survivors, in ranking order.
    pub stage1: Vec<VacancyId>,
    pub result: Vec<MatchedVacancy>,
}

/// Runs the match pipeline: normalise, enrich, embed, search, fetch,
/// narrow twice, label.
pub struct MatchService {
    index: Arc<IndexService>,
    embedder: Arc<dyn Embedder>,
    completion: Arc<dyn CompletionClient>,
    store: Arc<dyn VacancyStore>,
    settings: MatchingConfig,
}

impl MatchService {
    pub fn new(
        index: Arc<IndexService>,
        embedder: Arc<dyn Embedder>,
        completion: Arc<dyn CompletionClient>,
        store: Arc<dyn VacancyStore>,
        settings: MatchingConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            completion,
            store,
            settings,
        }
    }

    pub fn index(&self) -> &IndexService {
        &self.index
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn vacancies_total(&self) -> Result<usize, MatchError> {
        self.store.count_total().map_err(MatchError::Store)
    }

    pub fn run(&self, request: &MatchRequest) -> Result<MatchResponse, MatchError> {
        let started = Instant::now();
        let bounds = request.bounds(&self.settings)?;
        let resume = normalize_query(&request.resume)
            .ok_or_else(|| MatchError::InvalidRequest("resume is empty".to_string()))?;

        // checked before any model call so an unbuilt index fails fast
        let index = self.index.snapshot()?;

        let query = if self.settings.enrich_query {
            enrich_query(self.completion.as_ref(), &resume)
                .map_err(MatchError::completion(Stage::Enrichment))?
        } else {
            resume.clone()
        };

        let vector = self.embedder.embed(&query, EmbedKind::Query)?;
        let top_idx = index.search(&vector, bounds.k_faiss)?;
        if top_idx.is_empty() {
            return Err(MatchError::IndexUnavailable(
                "vector search returned no candidates".to_string(),
            ));
        }

        let candidates =
            fetch_in_order(self.store.as_ref(), &top_idx).map_err(MatchError::Store)?;
        log::info!(
            "vector search: {} ids, {} found in store",
            top_idx.len(),
            candidates.len()
        );

        if candidates.is_empty() {
            log::warn!(
                "no vacancy records for any of {} search hits; are the shards and the store from the same dataset?",
                top_idx.len()
            );
            return Ok(MatchResponse {
                top_idx,
                ..Default::default()
            });
        }

        let selector = StagedSelector::new(
            self.completion.as_ref(),
            self.settings.selection_max_tokens,
        );

        let stage1 = selector
            .run_round(
                Stage::Stage1,
                &stage1_instruction(bounds.k_stage1),
                &stage1_context(&resume, &candidates),
                &candidates,
                bounds.k_stage1,
            )
            .map_err(MatchError::completion(Stage::Stage1))?;
        log_round(&stage1);

        let stage2 = selector
            .run_round(
                Stage::Stage2,
                &stage2_instruction(bounds.k_stage2),
                &stage2_context(&resume, &stage1.survivors),
                &stage1.survivors,
                bounds.k_stage2,
            )
            .map_err(MatchError::completion(Stage::Stage2))?;
        log_round(&stage2);

        let classifier = SeniorityClassifier::new(self.completion.as_ref());
        let result = stage2
            .survivors
            .iter()
            .map(|vacancy| MatchedVacancy::new(vacancy, classifier.classify(vacancy)))
            .collect();

        log::info!("match finished in {:.2?}", started.elapsed());

        Ok(MatchResponse {
            top_idx,
            stage1: stage1.survivor_ids(),
            result,
        })
    }
}

fn log_round(round: &SelectionRound) {
    log::info!(
        "{}: model picked {}, {} survive{}",
        round.stage,
        round.selected.len(),
        round.survivors.len(),
        if round.fell_back { " after padding" } else { "" }
    );
}
