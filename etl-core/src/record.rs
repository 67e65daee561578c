use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One flattened weather observation, ready for tabular storage.
///
/// Exactly one record is produced per pipeline invocation. It is immutable
/// once constructed: the fetcher builds it, the publisher serializes it, and
/// nothing in this crate holds on to it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Location name as resolved by the API (may differ from the query).
    pub city: String,
    /// Degrees Celsius, converted from the API's Kelvin reading.
    pub temperature: f64,
    /// Relative humidity, 0-100.
    pub humidity: u8,
    pub weather_description: String,
    /// Meters per second.
    pub wind_speed: f64,
    /// Collection time, not the measurement time reported by the API.
    pub timestamp: DateTime<Utc>,
}

impl WeatherRecord {
    /// Destination object key: `weather_data_{city}_{YYYYMMDDHHMMSS}.csv`.
    ///
    /// Second-granularity timestamps keep concurrent runs for different
    /// cities from colliding; two runs for the same city within the same
    /// second still would.
    pub fn object_name(&self) -> String {
        format!(
            "weather_data_{}_{}.csv",
            self.city,
            self.timestamp.format("%Y%m%d%H%M%S")
        )
    }

    /// Serialize as a single-row CSV document with a header and no index
    /// column, matching the warehouse file format definition.
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(self).context("Failed to serialize weather record to CSV")?;
        writer
            .into_inner()
            .map_err(|err| anyhow!("Failed to flush CSV writer: {err}"))
    }
}
