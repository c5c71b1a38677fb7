use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_ENDPOINT: &str = "https://llm.api.cloud.yandex.net/foundationModels/v1";
const DEFAULT_COMPLETION_MODEL: &str = "yandexgpt";
const DEFAULT_MODEL_VERSION: &str = "rc";
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const DEFAULT_QUERY_MODEL: &str = "text-search-query";
const DEFAULT_DOC_MODEL: &str = "text-search-doc";
/// Default local embedding model (must match the dimension of the shard files)
const DEFAULT_LOCAL_MODEL: &str = "bge-base-en-v1.5";

/// HNSW out-degree; mirrors the graph the shards were first indexed with.
const DEFAULT_MAX_NB_CONNECTION: usize = 32;
const DEFAULT_EF_CONSTRUCTION: usize = 200;
const DEFAULT_EF_SEARCH: usize = 64;
const DEFAULT_MAX_LAYER: usize = 16;

const DEFAULT_K_FAISS: usize = 100;
const DEFAULT_K_STAGE1: usize = 20;
const DEFAULT_K_STAGE2: usize = 15;
const DEFAULT_SELECTION_MAX_TOKENS: u32 = 800;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("configuration errors:\n{}", .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Invalid(Vec<String>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Credentials and model selection for the hosted completion/embedding API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub folder_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub iam_token: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    #[serde(default = "default_model_version")]
    pub model_version: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-call timeout for outbound model requests
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            folder_id: String::new(),
            api_key: String::new(),
            iam_token: String::new(),
            endpoint: default_endpoint(),
            completion_model: default_completion_model(),
            model_version: default_model_version(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_string()
}

fn default_model_version() -> String {
    DEFAULT_MODEL_VERSION.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Remote,
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Directory holding `embeddings_batch_N.npy` / `indices_batch_N.npy`.
    /// Empty means `<base>/embeddings/vacancies`.
    #[serde(default)]
    pub shards_dir: String,

    #[serde(default = "default_query_model")]
    pub query_model: String,
    #[serde(default = "default_doc_model")]
    pub doc_model: String,

    #[serde(default = "default_local_model")]
    pub local_model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            shards_dir: String::new(),
            query_model: default_query_model(),
            doc_model: default_doc_model(),
            local_model: default_local_model(),
        }
    }
}

fn default_query_model() -> String {
    DEFAULT_QUERY_MODEL.to_string()
}

fn default_doc_model() -> String {
    DEFAULT_DOC_MODEL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexConfig {
    #[serde(default = "default_max_nb_connection")]
    pub max_nb_connection: usize,
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
    #[serde(default = "default_max_layer")]
    pub max_layer: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: DEFAULT_MAX_NB_CONNECTION,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            max_layer: DEFAULT_MAX_LAYER,
        }
    }
}

fn default_max_nb_connection() -> usize {
    DEFAULT_MAX_NB_CONNECTION
}

fn default_ef_construction() -> usize {
    DEFAULT_EF_CONSTRUCTION
}

fn default_ef_search() -> usize {
    DEFAULT_EF_SEARCH
}

fn default_max_layer() -> usize {
    DEFAULT_MAX_LAYER
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_k_faiss")]
    pub k_faiss: usize,
    #[serde(default = "default_k_stage1")]
    pub k_stage1: usize,
    #[serde(default = "default_k_stage2")]
    pub k_stage2: usize,

    /// Rewrite the query with the completion model before embedding it
    #[serde(default = "default_true")]
    pub enrich_query: bool,

    #[serde(default = "default_selection_max_tokens")]
    pub selection_max_tokens: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            k_faiss: DEFAULT_K_FAISS,
            k_stage1: DEFAULT_K_STAGE1,
            k_stage2: DEFAULT_K_STAGE2,
            enrich_query: true,
            selection_max_tokens: DEFAULT_SELECTION_MAX_TOKENS,
        }
    }
}

fn default_k_faiss() -> usize {
    DEFAULT_K_FAISS
}

fn default_k_stage1() -> usize {
    DEFAULT_K_STAGE1
}

fn default_k_stage2() -> usize {
    DEFAULT_K_STAGE2
}

fn default_true() -> bool {
    true
}

fn default_selection_max_tokens() -> u32 {
    DEFAULT_SELECTION_MAX_TOKENS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Empty means `<base>/vacancies.csv`.
    #[serde(default)]
    pub vacancies_path: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn shards_dir(&self) -> PathBuf {
        if self.embeddings.shards_dir.is_empty() {
            self.base_path.join("embeddings").join("vacancies")
        } else {
            PathBuf::from(&self.embeddings.shards_dir)
        }
    }

    pub fn vacancies_path(&self) -> PathBuf {
        if self.store.vacancies_path.is_empty() {
            self.base_path.join("vacancies.csv")
        } else {
            PathBuf::from(&self.store.vacancies_path)
        }
    }

    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = vec![];
        self.check_llm(&mut errors);
        self.check_index(&mut errors);
        self.check_matching(&mut errors);
        into_result(errors)
    }

    /// The subset needed to build the vector index alone.
    pub fn validate_index(&self) -> Result<(), ConfigError> {
        let mut errors = vec![];
        self.check_index(&mut errors);
        into_result(errors)
    }

    fn check_llm(&self, errors: &mut Vec<String>) {
        let llm = &self.llm;
        if llm.folder_id.trim().is_empty() {
            errors.push("llm.folder_id (YANDEX_FOLDER_ID) is required".to_string());
        }
        if llm.api_key.trim().is_empty() && llm.iam_token.trim().is_empty() {
            errors.push(
                "either llm.api_key (YANDEX_API_KEY) or llm.iam_token (YANDEX_IAM_TOKEN) is required"
                    .to_string(),
            );
        }
        if url::Url::parse(&llm.endpoint).is_err() {
            errors.push(format!("llm.endpoint is not a valid url: '{}'", llm.endpoint));
        }
        if llm.timeout_secs == 0 {
            errors.push("llm.timeout_secs must be greater than 0".to_string());
        }
    }

    fn check_index(&self, errors: &mut Vec<String>) {
        let index = &self.index;
        if index.max_nb_connection == 0 {
            errors.push("index.max_nb_connection must be greater than 0".to_string());
        }
        if index.ef_construction == 0 {
            errors.push("index.ef_construction must be greater than 0".to_string());
        }
        if !(1..=16).contains(&index.max_layer) {
            errors.push(format!(
                "index.max_layer must be between 1 and 16, got {}",
                index.max_layer
            ));
        }
    }

    fn check_matching(&self, errors: &mut Vec<String>) {
        let matching = &self.matching;
        for (name, value) in [
            ("k_faiss", matching.k_faiss),
            ("k_stage1", matching.k_stage1),
            ("k_stage2", matching.k_stage2),
        ] {
            if value == 0 {
                errors.push(format!("matching.{name} must be greater than 0"));
            }
        }
    }

    /// Environment variables override the file but are never written back to it.
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(folder_id) = env("YANDEX_FOLDER_ID") {
            self.llm.folder_id = folder_id;
        }
        if let Some(api_key) = env("YANDEX_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(iam_token) = env("YANDEX_IAM_TOKEN") {
            self.llm.iam_token = iam_token;
        }
        if let Some(dir) = env("EMBEDDINGS_DIR") {
            self.embeddings.shards_dir = Path::new(&dir)
                .join("vacancies")
                .to_string_lossy()
                .to_string();
        }
        if let Some(path) = env("VACANCIES_PATH") {
            self.store.vacancies_path = path;
        }
        if let Some(port) = env("PORT").and_then(|port| port.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Loads `config.yaml` from `base_path`, creating it with defaults when missing.
    ///
    /// Does not validate: callers decide whether credentials are required.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(base_path, |key| {
            std::env::var(key).ok().filter(|value| !value.is_empty())
        })
    }

    fn load_with_env(
        base_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            log::info!("writing default config to {}", config_path.display());
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env(env);

        Ok(config)
    }

    /// Persists the file-backed part of the config.
    ///
    /// Secrets coming from the environment are not known here, since `save`
    /// runs before `apply_env`.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = self.base_path.join(CONFIG_FILE);
        let temp_path = config_path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, serde_yml::to_string(&self)?)?;
        std::fs::rename(&temp_path, &config_path)?;
        Ok(())
    }
}

fn into_result(errors: Vec<String>) -> Result<(), ConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_creates_default_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(tmp.path(), env_from(&[])).unwrap();

        assert!(tmp.path().join(CONFIG_FILE).exists());
        assert_eq!(config.matching.k_faiss, 100);
        assert_eq!(config.matching.k_stage1, 20);
        assert_eq!(config.matching.k_stage2, 15);
        assert_eq!(config.index.max_nb_connection, 32);
        assert_eq!(config.index.ef_construction, 200);
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Remote);
        assert_eq!(
            config.shards_dir(),
            tmp.path().join("embeddings").join("vacancies")
        );
        assert_eq!(config.vacancies_path(), tmp.path().join("vacancies.csv"));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE),
            "matching:\n  k_faiss: 50\nindex:\n  ef_search: 128\n",
        )
        .unwrap();

        let config = Config::load_with_env(tmp.path(), env_from(&[])).unwrap();
        assert_eq!(config.matching.k_faiss, 50);
        assert_eq!(config.matching.k_stage1, 20);
        assert!(config.matching.enrich_query);
        assert_eq!(config.index.ef_search, 128);
        assert_eq!(config.index.ef_construction, 200);
    }

    #[test]
    fn test_env_overrides_are_not_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(
            tmp.path(),
            env_from(&[
                ("YANDEX_FOLDER_ID", "b1gfolder"),
                ("YANDEX_API_KEY", "secret"),
                ("EMBEDDINGS_DIR", "/data/embeddings"),
                ("PORT", "9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.llm.folder_id, "b1gfolder");
        assert_eq!(config.llm.api_key, "secret");
        assert_eq!(config.shards_dir(), PathBuf::from("/data/embeddings/vacancies"));
        assert_eq!(config.server.port, 9000);
        assert!(config.validate().is_ok());

        let on_disk = std::fs::read_to_string(tmp.path().join(CONFIG_FILE)).unwrap();
        assert!(!on_disk.contains("secret"));
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with_env(tmp.path(), env_from(&[])).unwrap();

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("folder_id"));
                assert!(errors[1].contains("api_key"));
            }
            other => panic!("expected invalid config, got {other:?}"),
        }

        // building the index alone does not need credentials
        assert!(config.validate_index().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_index_params() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::load_with_env(
            tmp.path(),
            env_from(&[("YANDEX_FOLDER_ID", "f"), ("YANDEX_IAM_TOKEN", "t")]),
        )
        .unwrap();
        config.index.max_layer = 17;
        config.index.ef_construction = 0;
        config.matching.k_stage2 = 0;

        let Err(ConfigError::Invalid(errors)) = config.validate() else {
            panic!("expected invalid config");
        };
        assert_eq!(errors.len(), 3);

        let Err(ConfigError::Invalid(errors)) = config.validate_index() else {
            panic!("expected invalid index config");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_malformed_config() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(CONFIG_FILE), "matching: [1, 2").unwrap();

        let result = Config::load_with_env(tmp.path(), env_from(&[]));
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }
}
