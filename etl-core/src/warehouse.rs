use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

use crate::record::WeatherRecord;
use crate::store::ObjectStore;

/// Staged objects carry this prefix; the loader only considers them.
pub const STAGE_PREFIX: &str = "weather_data_";

/// The dashboard's one and only query. Also the cache key for its results.
pub const RECENT_QUERY: &str = "SELECT city, temperature, humidity, weather_description, \
     wind_speed, timestamp FROM weather_data ORDER BY timestamp DESC LIMIT 50";

/// Outcome of one bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub objects_loaded: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

/// Embedded warehouse holding the `weather_data` table.
///
/// The load history table plays the role of a managed warehouse's stage
/// metadata: objects recorded there are never loaded twice.
#[derive(Debug)]
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open warehouse database: {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory warehouse database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS weather_data (
                 city                TEXT    NOT NULL,
                 temperature         REAL    NOT NULL,
                 humidity            INTEGER NOT NULL,
                 weather_description TEXT    NOT NULL,
                 wind_speed          REAL    NOT NULL,
                 timestamp           TEXT    NOT NULL
             );
             CREATE TABLE IF NOT EXISTS load_history (
                 object_key TEXT PRIMARY KEY,
                 loaded_at  TEXT NOT NULL
             );",
        )
        .context("Failed to create warehouse schema")?;

        Ok(Self { conn })
    }

    /// Bulk-load all staged objects that are not yet in the load history.
    ///
    /// Error policy is per-row continue: a row that fails to parse or insert
    /// is logged and skipped, the rest of the object still loads. An object
    /// that cannot be downloaded at all fails the whole load.
    pub async fn copy_into(&self, store: &dyn ObjectStore) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for key in store.list(STAGE_PREFIX).await? {
            if self.is_loaded(&key)? {
                continue;
            }

            let body = store.get(&key).await?;
            let (rows, skipped) = self.load_object(&key, &body)?;

            report.objects_loaded += 1;
            report.rows_loaded += rows;
            report.rows_skipped += skipped;
        }

        info!(
            objects = report.objects_loaded,
            rows = report.rows_loaded,
            skipped = report.rows_skipped,
            "Bulk load complete"
        );

        Ok(report)
    }

    fn load_object(&self, key: &str, body: &[u8]) -> Result<(usize, usize)> {
        let mut rows = 0usize;
        let mut skipped = 0usize;

        let mut reader = csv::Reader::from_reader(body);
        for result in reader.deserialize::<WeatherRecord>() {
            match result {
                Ok(record) => {
                    if let Err(err) = self.insert_record(&record) {
                        warn!(key, error = %err, "Skipping row that failed to insert");
                        skipped += 1;
                    } else {
                        rows += 1;
                    }
                }
                Err(err) => {
                    warn!(key, error = %err, "Skipping row that failed to parse");
                    skipped += 1;
                }
            }
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO load_history (object_key, loaded_at) VALUES (?1, ?2)",
                (key, Utc::now().to_rfc3339()),
            )
            .context("Failed to record object in load history")?;

        Ok((rows, skipped))
    }

    fn insert_record(&self, record: &WeatherRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO weather_data \
                 (city, temperature, humidity, weather_description, wind_speed, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    &record.city,
                    record.temperature,
                    record.humidity,
                    &record.weather_description,
                    record.wind_speed,
                    record.timestamp.to_rfc3339(),
                ),
            )
            .context("Failed to insert weather record")?;
        Ok(())
    }

    fn is_loaded(&self, key: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM load_history WHERE object_key = ?1",
                [key],
                |row| row.get(0),
            )
            .context("Failed to query load history")?;
        Ok(count > 0)
    }

    /// The most recent rows, newest first (the dashboard's fixed query).
    pub fn recent(&self) -> Result<Vec<WeatherRecord>> {
        let mut stmt = self
            .conn
            .prepare(RECENT_QUERY)
            .context("Failed to prepare dashboard query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })
            .context("Failed to run dashboard query")?;

        let mut records = Vec::new();
        for row in rows {
            let (city, temperature, humidity, weather_description, wind_speed, timestamp) =
                row.context("Failed to read warehouse row")?;

            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .context("Invalid timestamp stored in warehouse")?
                .with_timezone(&Utc);

            records.push(WeatherRecord {
                city,
                temperature,
                humidity,
                weather_description,
                wind_speed,
                timestamp,
            });
        }

        Ok(records)
    }
}
