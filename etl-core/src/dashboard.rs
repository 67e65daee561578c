use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::record::WeatherRecord;
use crate::warehouse::{RECENT_QUERY, Warehouse};

/// One point of the temperature time series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
}

/// What the dashboard renders for one refresh.
#[derive(Debug, Clone)]
pub enum DashboardView {
    /// Nothing in the warehouse yet; no metrics, no chart.
    Empty,
    Data {
        /// Most recent record, shown as the four metric tiles.
        latest: WeatherRecord,
        /// Temperature over the fetched window, oldest first.
        series: Vec<SeriesPoint>,
        /// The raw rows backing the view, newest first.
        rows: Vec<WeatherRecord>,
    },
}

/// Query surface over the warehouse with a fixed-TTL result cache.
///
/// The warehouse connection is acquired once and reused for the life of the
/// process. Query results are cached keyed by query text; a refresh inside
/// the TTL window returns stale rows by design, to bound warehouse cost.
pub struct Dashboard {
    warehouse: Arc<Mutex<Warehouse>>,
    cache: Cache<&'static str, Arc<Vec<WeatherRecord>>>,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("cached_entries", &self.cache.entry_count())
            .finish()
    }
}

impl Dashboard {
    pub fn new(warehouse: Arc<Mutex<Warehouse>>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(16)
            .time_to_live(cache_ttl)
            .build();

        Self { warehouse, cache }
    }

    /// The most recent rows, served from cache when fresh enough.
    pub async fn recent_rows(&self) -> Result<Arc<Vec<WeatherRecord>>> {
        let warehouse = Arc::clone(&self.warehouse);

        self.cache
            .try_get_with(RECENT_QUERY, async move {
                let warehouse = warehouse.lock().await;
                warehouse.recent().map(Arc::new)
            })
            .await
            .map_err(|err| anyhow!("Dashboard query failed: {err}"))
    }

    pub async fn view(&self) -> Result<DashboardView> {
        let rows = self.recent_rows().await?;

        let Some(latest) = rows.first().cloned() else {
            return Ok(DashboardView::Empty);
        };

        let series = rows
            .iter()
            .rev()
            .map(|record| SeriesPoint {
                timestamp: record.timestamp,
                temperature: record.temperature,
            })
            .collect();

        Ok(DashboardView::Data {
            latest,
            series,
            rows: rows.as_ref().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryObjectStore, ObjectStore};
    use chrono::TimeZone;

    fn record(city: &str, temperature: f64, second: u32) -> WeatherRecord {
        WeatherRecord {
            city: city.to_string(),
            temperature,
            humidity: 60,
            weather_description: "clear sky".to_string(),
            wind_speed: 3.1,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, second).unwrap(),
        }
    }

    async fn stage(store: &MemoryObjectStore, record: &WeatherRecord) {
        store
            .put(&record.object_name(), &record.to_csv().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_warehouse_renders_no_data_state() {
        let warehouse = Arc::new(Mutex::new(Warehouse::open_in_memory().unwrap()));
        let dashboard = Dashboard::new(warehouse, Duration::from_secs(600));

        let view = dashboard.view().await.unwrap();
        assert!(matches!(view, DashboardView::Empty));
    }

    #[tokio::test]
    async fn view_exposes_latest_metrics_and_series() {
        let store = MemoryObjectStore::new();
        stage(&store, &record("London", 22.0, 1)).await;
        stage(&store, &record("Paris", 18.5, 2)).await;

        let warehouse = Warehouse::open_in_memory().unwrap();
        warehouse.copy_into(&store).await.unwrap();

        let dashboard =
            Dashboard::new(Arc::new(Mutex::new(warehouse)), Duration::from_secs(600));

        match dashboard.view().await.unwrap() {
            DashboardView::Data { latest, series, rows } => {
                assert_eq!(latest.city, "Paris");
                assert_eq!(rows.len(), 2);
                // Series runs oldest to newest for charting.
                assert_eq!(series.len(), 2);
                assert_eq!(series[0].temperature, 22.0);
                assert_eq!(series[1].temperature, 18.5);
            }
            DashboardView::Empty => panic!("expected data view"),
        }
    }

    #[tokio::test]
    async fn rows_landing_inside_ttl_are_not_visible() {
        let store = MemoryObjectStore::new();
        stage(&store, &record("London", 22.0, 1)).await;

        let warehouse = Arc::new(Mutex::new(Warehouse::open_in_memory().unwrap()));
        warehouse.lock().await.copy_into(&store).await.unwrap();

        let dashboard = Dashboard::new(Arc::clone(&warehouse), Duration::from_secs(600));
        assert_eq!(dashboard.recent_rows().await.unwrap().len(), 1);

        // New data lands after the first query; the cached result stays.
        stage(&store, &record("Paris", 18.5, 2)).await;
        warehouse.lock().await.copy_into(&store).await.unwrap();

        assert_eq!(dashboard.recent_rows().await.unwrap().len(), 1);
    }
}
