use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::fetch::Fetcher;
use crate::publish::publish;
use crate::record::WeatherRecord;
use crate::store::ObjectStore;
use crate::warehouse::{LoadReport, Warehouse};

/// Node 1 of the task graph: fetch one city's weather and stage it as CSV.
///
/// Returns `Ok(None)` when the API answered with a non-success status; the
/// run ends without a record and nothing is written to the store. A publish
/// failure does not surface here, by the publisher's best-effort contract.
pub async fn extract_and_publish(
    cfg: &RunConfig,
    fetcher: &Fetcher,
    store: &dyn ObjectStore,
) -> Result<Option<WeatherRecord>> {
    let Some(record) = fetcher.fetch_current(&cfg.api_key, &cfg.city).await? else {
        return Ok(None);
    };

    publish(store, &record).await;
    Ok(Some(record))
}

/// Result of one full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The record produced by the extract node, if the API call succeeded.
    pub record: Option<WeatherRecord>,
    pub load: LoadReport,
}

/// In-process sequencer for the two-node task graph:
/// extract-and-publish, then bulk-load. Fixed linear order, no branching.
/// Each node gets one generic retry, re-running from scratch on failure.
#[derive(Debug)]
pub struct Pipeline {
    fetcher: Fetcher,
    store: Arc<dyn ObjectStore>,
    warehouse: Arc<Mutex<Warehouse>>,
}

impl Pipeline {
    pub fn new(
        fetcher: Fetcher,
        store: Arc<dyn ObjectStore>,
        warehouse: Arc<Mutex<Warehouse>>,
    ) -> Self {
        Self { fetcher, store, warehouse }
    }

    pub async fn run(&self, cfg: &RunConfig) -> Result<PipelineOutcome> {
        info!(city = %cfg.city, "Starting pipeline run");

        let record = with_retry("extract_weather_to_stage", || {
            extract_and_publish(cfg, &self.fetcher, self.store.as_ref())
        })
        .await?;

        let load = with_retry("load_to_warehouse", || async {
            let warehouse = self.warehouse.lock().await;
            warehouse.copy_into(self.store.as_ref()).await
        })
        .await?;

        Ok(PipelineOutcome { record, load })
    }
}

/// Run a task, re-running it once from scratch if it fails. A task that
/// completes without error (including the no-record outcome) is never
/// retried.
async fn with_retry<T, F, Fut>(task: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(err) => {
            warn!(task, error = %err, "Task failed, retrying once");
            op().await
        }
    }
}
