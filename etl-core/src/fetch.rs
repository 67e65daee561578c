use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::record::WeatherRecord;

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Thin adapter around the OpenWeather current-weather endpoint.
///
/// The API reports temperature in Kelvin; the fetcher converts to Celsius
/// and stamps the record with the collection time.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
    base_url: String,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Fetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch current weather for one city.
    ///
    /// A non-success HTTP status is not an error from the pipeline's point
    /// of view: the status and body are logged and `Ok(None)` is returned,
    /// ending the run without a record. A malformed or incomplete body on a
    /// success status is fatal and propagates.
    pub async fn fetch_current(&self, api_key: &str, city: &str) -> Result<Option<WeatherRecord>> {
        let url = format!("{}/weather", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[("q", city), ("appid", api_key)])
            .send()
            .await
            .context("Failed to send request to OpenWeather (current weather)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read OpenWeather current response body")?;

        if !status.is_success() {
            warn!(
                status = %status,
                body = %truncate_body(&body),
                "Error fetching weather data, run ends without a record"
            );
            return Ok(None);
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).context("Failed to parse OpenWeather current JSON")?;

        let condition = parsed
            .weather
            .first()
            .map(|w| w.description.clone())
            .context("OpenWeather response contained no weather conditions")?;

        debug!(city = %parsed.name, "Fetched current weather");

        Ok(Some(WeatherRecord {
            city: parsed.name,
            temperature: parsed.main.temp - 273.15,
            humidity: parsed.main.humidity,
            weather_description: condition,
            wind_speed: parsed.wind.speed,
            timestamp: Utc::now(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        format!("{}...", &body[..MAX])
    } else {
        body.to_string()
    }
}
