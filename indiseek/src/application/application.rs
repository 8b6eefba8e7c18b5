// This is where we define the core application and how to start it up:
// every store handle plus the single-slot task manager, shared by the
// webserver handlers and the background tasks.

use std::sync::Arc;
use std::time::Duration;

use llm_client::broker::LLMBroker;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::chunking::languages::TSLanguageParsing;
use crate::chunking::types::SourceParser;
use crate::db::{init_sqlite_db, SqlDb};
use crate::lexical::LexicalStore;
use crate::semantic::VectorStore;
use crate::tasks::TaskManager;

use super::config::configuration::Configuration;
use super::logging::tracing::tracing_subscribe;

static LOGGER_INSTALLED: OnceCell<bool> = OnceCell::new();

#[derive(Clone)]
pub struct Application {
    pub config: Arc<Configuration>,
    pub sql: SqlDb,
    pub semantic: Arc<VectorStore>,
    pub lexical: Arc<LexicalStore>,
    pub parser: Arc<dyn SourceParser>,
    pub llm_broker: Arc<LLMBroker>,
    pub task_manager: Arc<TaskManager>,
}

impl Application {
    pub async fn initialize(config: Configuration) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        tokio::fs::create_dir_all(config.repos_dir()).await?;
        tokio::fs::create_dir_all(config.lancedb_dir()).await?;

        let sql = init_sqlite_db(&config.index_db_path(), config.repo_path.as_deref()).await?;
        let semantic =
            Arc::new(VectorStore::open(&config.lancedb_dir(), config.embedding_dims()).await?);
        let lexical = Arc::new(LexicalStore::new(&config.data_dir));
        let parser: Arc<dyn SourceParser> = Arc::new(TSLanguageParsing::init());
        let task_manager = Arc::new(TaskManager::new(
            config.task_timeout_secs.map(Duration::from_secs),
        ));

        debug!("application stores initialized");
        Ok(Self {
            config: Arc::new(config),
            sql,
            semantic,
            lexical,
            parser,
            llm_broker: Arc::new(LLMBroker::new()),
            task_manager,
        })
    }

    pub fn install_logging(config: &Configuration) {
        if let Some(true) = LOGGER_INSTALLED.get() {
            return;
        }

        if !tracing_subscribe(config) {
            warn!("Failed to install tracing_subscriber. There's probably one already...");
        };

        if color_eyre::install().is_err() {
            warn!("Failed to install color-eyre. Oh well...");
        };

        LOGGER_INSTALLED.set(true).unwrap();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::application::config::configuration::Configuration;
    use clap::Parser;

    /// Application over temp directories with no provider keys.
    pub(crate) async fn test_application(data_dir: &std::path::Path) -> Application {
        let config = Configuration::parse_from([
            "indiseek",
            "--data-dir",
            data_dir.to_str().unwrap(),
            "--summary-delay-ms",
            "0",
        ]);
        Application::initialize(config)
            .await
            .expect("test application to initialize")
    }
}
