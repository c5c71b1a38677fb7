use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;

use crate::app::MatchService;
use crate::config::{IndexConfig, MatchingConfig};
use crate::llm::{CompletionClient, CompletionError, CompletionRequest};
use crate::semantic::{EmbedKind, Embedder, EmbeddingError, IndexService};
use crate::vacancies::{CsvVacancyStore, Vacancy, VacancyId};

/// Writes one `embeddings_batch_{n}.npy` / `indices_batch_{n}.npy` pair.
pub fn write_batch(dir: &Path, n: u32, ids: &[VacancyId], rows: &[Vec<f32>]) {
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    let vectors = Array2::from_shape_vec((rows.len(), dim), flat).unwrap();

    write_npy(dir.join(format!("embeddings_batch_{n}.npy")), &vectors).unwrap();
    write_npy(
        dir.join(format!("indices_batch_{n}.npy")),
        &Array1::from(ids.to_vec()),
    )
    .unwrap();
}

/// Unit vector along `axis`.
pub fn unit(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

/// Nine vacancies 1..=9, each embedded as its own axis, split across three
/// batches.
pub fn write_nine_shards(dir: &Path) {
    for (batch, ids) in [[1, 2, 3], [4, 5, 6], [7, 8, 9]].iter().enumerate() {
        let rows: Vec<Vec<f32>> = ids.iter().map(|&id| unit(9, id as usize - 1)).collect();
        write_batch(dir, batch as u32, ids, &rows);
    }
}

/// A query whose similarity strictly decreases from id 1 to id 9.
pub fn descending_query() -> Vec<f32> {
    (0..9).map(|i| 10.0 - i as f32).collect()
}

pub fn vacancy(idx: VacancyId, title: &str) -> Vacancy {
    Vacancy {
        idx,
        title: title.to_string(),
        company: format!("Company {idx}"),
        description: format!("Описание вакансии {idx}"),
        ..Default::default()
    }
}

/// Titles without seniority keywords unless stated.
pub fn nine_vacancies() -> Vec<Vacancy> {
    let mut vacancies: Vec<Vacancy> = (1..=9)
        .map(|idx| vacancy(idx, &format!("Бухгалтер {idx}")))
        .collect();
    vacancies[6].title = "Финансовый директор".to_string();
    vacancies[2].title = "Стажер-аналитик".to_string();
    vacancies
}

pub struct FixedEmbedder {
    result: Result<Vec<f32>, String>,
    pub calls: Mutex<Vec<(String, EmbedKind)>>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            result: Ok(vector),
            calls: Mutex::new(vec![]),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            result: Err("invalid api key".to_string()),
            calls: Mutex::new(vec![]),
        }
    }
}

impl Embedder for FixedEmbedder {
    fn embed(&self, text: &str, kind: EmbedKind) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().unwrap().push((text.to_string(), kind));
        self.result
            .clone()
            .map_err(EmbeddingError::Unauthorized)
    }
}

/// Completion double that answers per request kind from scripted queues.
///
/// - selection requests carry a response schema; default `{"selected":[]}`
/// - seniority prompts start with "Определи уровень"; default "Средний"
/// - everything else is enrichment; default echoes the user text
#[derive(Default)]
pub struct ScriptedCompletion {
    pub enrichment: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub selections: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub seniority: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn with_selections(answers: &[&str]) -> Self {
        let scripted = Self::default();
        for answer in answers {
            scripted.push_selection(Ok(answer.to_string()));
        }
        scripted
    }

    pub fn push_selection(&self, answer: Result<String, CompletionError>) {
        self.selections.lock().unwrap().push_back(answer);
    }

    pub fn push_enrichment(&self, answer: Result<String, CompletionError>) {
        self.enrichment.lock().unwrap().push_back(answer);
    }

    pub fn selection_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.response_schema.is_some())
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl CompletionClient for ScriptedCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());

        let first_text = request
            .messages
            .first()
            .map(|m| m.text.as_str())
            .unwrap_or_default();

        if request.response_schema.is_some() {
            return self
                .selections
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(r#"{"selected":[]}"#.to_string()));
        }

        if first_text.trim_start().starts_with("Определи уровень") {
            return self
                .seniority
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("Средний".to_string()));
        }

        let user_text = request
            .messages
            .get(1)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        self.enrichment
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(user_text))
    }
}

pub struct Fixture {
    pub service: Arc<MatchService>,
    pub completion: Arc<ScriptedCompletion>,
    pub embedder: Arc<FixedEmbedder>,
    pub _tmp: tempfile::TempDir,
}

pub struct FixtureBuilder {
    vacancies: Vec<Vacancy>,
    embedder: FixedEmbedder,
    completion: ScriptedCompletion,
    settings: MatchingConfig,
    build_index: bool,
    write_shards: bool,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            vacancies: nine_vacancies(),
            embedder: FixedEmbedder::new(descending_query()),
            completion: ScriptedCompletion::default(),
            settings: MatchingConfig {
                enrich_query: false,
                ..Default::default()
            },
            build_index: true,
            write_shards: true,
        }
    }

    pub fn vacancies(mut self, vacancies: Vec<Vacancy>) -> Self {
        self.vacancies = vacancies;
        self
    }

    pub fn embedder(mut self, embedder: FixedEmbedder) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn completion(mut self, completion: ScriptedCompletion) -> Self {
        self.completion = completion;
        self
    }

    pub fn settings(mut self, settings: MatchingConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn without_index_build(mut self) -> Self {
        self.build_index = false;
        self
    }

    pub fn without_shards(mut self) -> Self {
        self.write_shards = false;
        self
    }

    pub fn build(self) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let shards_dir = tmp.path().join("shards");
        if self.write_shards {
            std::fs::create_dir_all(&shards_dir).unwrap();
            write_nine_shards(&shards_dir);
        }

        let index = Arc::new(IndexService::new(shards_dir, IndexConfig::default()));
        if self.build_index {
            index.build_at_startup();
        }

        let completion = Arc::new(self.completion);
        let embedder = Arc::new(self.embedder);
        let service = Arc::new(MatchService::new(
            index,
            embedder.clone(),
            completion.clone(),
            Arc::new(CsvVacancyStore::from_records(self.vacancies)),
            self.settings,
        ));

        Fixture {
            service,
            completion,
            embedder,
            _tmp: tmp,
        }
    }
}
