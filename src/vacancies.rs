use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    io::ErrorKind,
    path::Path,
    time::Instant,
};

/// Identifier shared by the embedding shards and the vacancy store.
pub type VacancyId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vacancy {
    pub idx: VacancyId,

    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub salary: String,
    #[serde(default)]
    pub experience: String,
    #[serde(default)]
    pub job_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key_skills: String,
    #[serde(default)]
    pub hh_url: String,
}

impl Vacancy {
    /// Public posting URL, derived from `idx` when the record has none.
    pub fn url(&self) -> String {
        if self.hh_url.trim().is_empty() {
            format!("https://hh.ru/vacancy/{}", self.idx)
        } else {
            self.hh_url.clone()
        }
    }
}

/// Read access to the vacancy document store.
pub trait VacancyStore: Send + Sync {
    /// Returns the records that exist for `ids`, in no particular order.
    fn find_by_ids(&self, ids: &[VacancyId]) -> anyhow::Result<Vec<Vacancy>>;

    fn count_total(&self) -> anyhow::Result<usize>;
}

pub const CSV_HEADERS: [&str; 10] = [
    "idx",
    "title",
    "company",
    "location",
    "salary",
    "experience",
    "job_type",
    "description",
    "key_skills",
    "hh_url",
];

/// Vacancies loaded once from a CSV file and served from memory.
pub struct CsvVacancyStore {
    rows: Vec<Vacancy>,
    by_id: HashMap<VacancyId, usize>,
}

impl CsvVacancyStore {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::warn!("vacancy file {} not found, creating empty store", path.display());
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut rows = vec![];
        for (line, record) in csv_reader.deserialize::<Vacancy>().enumerate() {
            let vacancy =
                record.with_context(|| format!("bad vacancy record at row {}", line + 1))?;
            rows.push(vacancy);
        }

        log::debug!(
            "took {}ms to read vacancies csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        let store = Self::from_records(rows);
        log::info!("loaded {} vacancies from {}", store.rows.len(), path.display());

        Ok(store)
    }

    /// Builds a store from records. The first record wins on duplicate ids.
    pub fn from_records(records: Vec<Vacancy>) -> Self {
        let mut rows = Vec::with_capacity(records.len());
        let mut by_id = HashMap::with_capacity(records.len());

        for vacancy in records {
            if by_id.contains_key(&vacancy.idx) {
                log::warn!("duplicate vacancy idx {}, keeping first", vacancy.idx);
                continue;
            }
            by_id.insert(vacancy.idx, rows.len());
            rows.push(vacancy);
        }

        Self {
            rows,
            by_id,
        }
    }
}

impl VacancyStore for CsvVacancyStore {
    fn find_by_ids(&self, ids: &[VacancyId]) -> anyhow::Result<Vec<Vacancy>> {
        // file order, like a natural-order scan of a document collection
        let positions: HashSet<usize> = ids
            .iter()
            .filter_map(|id| self.by_id.get(id).copied())
            .collect();
        let mut positions: Vec<usize> = positions.into_iter().collect();
        positions.sort_unstable();

        Ok(positions
            .into_iter()
            .map(|pos| self.rows[pos].clone())
            .collect())
    }

    fn count_total(&self) -> anyhow::Result<usize> {
        Ok(self.rows.len())
    }
}
