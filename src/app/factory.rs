use crate::{
    app::service::MatchService,
    config::{Config, EmbeddingProvider},
    llm::{CompletionClient, YandexClient, YandexCredentials},
    semantic::{Embedder, IndexService},
    vacancies::{CsvVacancyStore, VacancyStore},
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::path::PathBuf;
use std::sync::Arc;

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// `$JOBMATCH_BASE_PATH`, or `~/.local/share/jobmatch`. Created if missing.
    pub fn base_path() -> Result<PathBuf> {
        let base_path = match std::env::var("JOBMATCH_BASE_PATH") {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => {
                let home = my_home()
                    .context("Could not determine home directory")?
                    .context("Home directory path is empty")?;
                home.join(".local").join("share").join("jobmatch")
            }
        };

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(base_path)
    }

    /// Loads `config.yaml` plus environment overrides. Callers validate
    /// what their command needs.
    pub fn load_config() -> Result<Config> {
        let base_path = Self::base_path()?;
        let config = Config::load_with(&base_path)
            .with_context(|| format!("failed to load config from {}", base_path.display()))?;
        Ok(config)
    }

    /// Wires every collaborator. The index is created but not built; call
    /// `IndexService::build_at_startup` before serving.
    pub fn create_match_service(config: &Config) -> Result<MatchService> {
        let credentials = YandexCredentials::from_config(&config.llm)
            .context("no Yandex credentials configured")?;
        let yandex = Arc::new(YandexClient::new(
            &config.llm,
            credentials,
            &config.embeddings.query_model,
            &config.embeddings.doc_model,
        )?);

        let embedder: Arc<dyn Embedder> = match config.embeddings.provider {
            EmbeddingProvider::Remote => yandex.clone() as Arc<dyn Embedder>,
            EmbeddingProvider::Local => Self::create_local_embedder(config)?,
        };
        let completion: Arc<dyn CompletionClient> = yandex;

        let store: Arc<dyn VacancyStore> =
            Arc::new(CsvVacancyStore::load(&config.vacancies_path())?);

        let index = Arc::new(Self::create_index_service(config));

        Ok(MatchService::new(
            index,
            embedder,
            completion,
            store,
            config.matching.clone(),
        ))
    }

    /// The index alone needs neither credentials nor the vacancy store.
    pub fn create_index_service(config: &Config) -> IndexService {
        IndexService::new(config.shards_dir(), config.index)
    }

    #[cfg(feature = "local-embeddings")]
    fn create_local_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
        let model = crate::semantic::LocalEmbedder::new(
            &config.embeddings.local_model,
            config.base_path().to_path_buf(),
        )?;
        log::info!(
            "using local embeddings '{}' ({} dims)",
            model.name(),
            model.dimensions()
        );
        Ok(Arc::new(model))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn create_local_embedder(_config: &Config) -> Result<Arc<dyn Embedder>> {
        anyhow::bail!("embeddings.provider is 'local' but the local-embeddings feature is disabled")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(base: &std::path::Path) -> Config {
        let mut config = Config::load_with(base).unwrap();
        config.llm.folder_id = "b1g-test".into();
        config.llm.api_key = "key".into();
        config.llm.iam_token.clear();
        config.embeddings.provider = EmbeddingProvider::Remote;
        config.embeddings.shards_dir = base.join("shards").to_string_lossy().into_owned();
        config.store.vacancies_path = base.join("vacancies.csv").to_string_lossy().into_owned();
        config
    }

    #[test]
    fn test_create_match_service_with_remote_provider() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        config.validate().unwrap();

        let service = AppFactory::create_match_service(&config).unwrap();

        let stats = service.index_stats();
        assert!(!stats.ready);
        assert_eq!(stats.shards_dir, tmp.path().join("shards"));
        assert_eq!(service.vacancies_total().unwrap(), 0);
        assert!(tmp.path().join("vacancies.csv").exists());
    }

    #[test]
    fn test_index_service_needs_no_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.llm.api_key.clear();

        let index = AppFactory::create_index_service(&config);
        let stats = index.build_at_startup();

        assert!(!stats.ready);
        assert_eq!(stats.shards_dir, tmp.path().join("shards"));
        assert!(!tmp.path().join("vacancies.csv").exists());
    }

    #[test]
    fn test_missing_credentials_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        config.llm.api_key.clear();
        assert!(AppFactory::create_match_service(&config).is_err());
    }
}
