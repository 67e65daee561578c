use anyhow::Result;
use tracing::{error, info};

use crate::record::WeatherRecord;
use crate::store::ObjectStore;

/// Write one record to the staging bucket as a single-row CSV object.
///
/// Best-effort by contract: any failure (serialization, auth, network) is
/// logged and swallowed, and the run still counts as successful from the
/// scheduler's point of view. Observe failures via logs.
pub async fn publish(store: &dyn ObjectStore, record: &WeatherRecord) {
    let key = record.object_name();

    if let Err(err) = try_publish(store, record, &key).await {
        error!(key, error = %err, "Object store upload error");
    }
}

async fn try_publish(store: &dyn ObjectStore, record: &WeatherRecord, key: &str) -> Result<()> {
    let body = record.to_csv()?;
    store.put(key, &body).await?;
    info!(key, "Data successfully uploaded to object store");
    Ok(())
}
