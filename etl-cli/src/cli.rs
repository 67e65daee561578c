use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use etl_core::{
    Dashboard, Fetcher, ObjectStore, Pipeline, RunConfig, S3ObjectStore, Settings,
    StorageConfig, TriggerPayload, Warehouse, extract_and_publish,
};

use crate::serve;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Weather ETL pipeline")]
pub struct Cli {
    /// Path to the settings file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch one city's weather and stage it as a CSV object.
    Run {
        /// City override, taking precedence over the stored default.
        #[arg(long)]
        city: Option<String>,
    },

    /// Bulk-load staged objects into the warehouse table.
    Load,

    /// Run the full two-node pipeline: extract-and-publish, then bulk-load.
    Pipeline {
        /// City override, taking precedence over the stored default.
        #[arg(long)]
        city: Option<String>,
    },

    /// Serve the warehouse dashboard over HTTP.
    Serve {
        /// Bind address, e.g. "127.0.0.1:8080".
        #[arg(long)]
        addr: Option<String>,
    },

    /// Set a variable in the settings file, e.g. `set-var openweather_api_key <key>`.
    SetVar { key: String, value: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings_path = match &self.config {
            Some(path) => path.clone(),
            None => Settings::settings_file_path()?,
        };
        let settings = Settings::load_from(&settings_path)?;

        match self.command {
            Command::Run { city } => {
                let cfg = RunConfig::resolve(&settings, trigger_for(city).as_ref())?;
                let store = S3ObjectStore::new(cfg.bucket_name.clone(), cfg.connection.clone());

                match extract_and_publish(&cfg, &Fetcher::default(), &store).await? {
                    Some(record) => println!(
                        "Staged {} ({:.1} °C, {})",
                        record.object_name(),
                        record.temperature,
                        record.weather_description
                    ),
                    None => println!("No record produced: the weather API reported an error."),
                }
            }

            Command::Load => {
                let storage = StorageConfig::resolve(&settings)?;
                let store = S3ObjectStore::new(storage.bucket_name, storage.connection);
                let warehouse = Warehouse::open(&settings.warehouse.path)?;

                let report = warehouse.copy_into(&store).await?;
                println!(
                    "Loaded {} objects: {} rows, {} skipped",
                    report.objects_loaded, report.rows_loaded, report.rows_skipped
                );
            }

            Command::Pipeline { city } => {
                let cfg = RunConfig::resolve(&settings, trigger_for(city).as_ref())?;
                let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(
                    cfg.bucket_name.clone(),
                    cfg.connection.clone(),
                ));
                let warehouse = Arc::new(Mutex::new(Warehouse::open(&settings.warehouse.path)?));

                let pipeline = Pipeline::new(Fetcher::default(), store, warehouse);
                let outcome = pipeline.run(&cfg).await?;

                match outcome.record {
                    Some(record) => println!("Extracted weather for {}", record.city),
                    None => println!("Extract step produced no record."),
                }
                println!(
                    "Loaded {} objects: {} rows, {} skipped",
                    outcome.load.objects_loaded,
                    outcome.load.rows_loaded,
                    outcome.load.rows_skipped
                );
            }

            Command::Serve { addr } => {
                let warehouse = Arc::new(Mutex::new(Warehouse::open(&settings.warehouse.path)?));
                let dashboard = Arc::new(Dashboard::new(
                    warehouse,
                    Duration::from_secs(settings.dashboard.cache_ttl_secs),
                ));

                let addr = addr.unwrap_or_else(|| settings.dashboard.bind_addr.clone());
                serve::serve(dashboard, &addr).await?;
            }

            Command::SetVar { key, value } => {
                let mut settings = settings;
                settings.set_variable(&key, value)?;
                settings.save_to(&settings_path)?;
                println!("Set {key} in {}", settings_path.display());
            }
        }

        Ok(())
    }
}

fn trigger_for(city: Option<String>) -> Option<TriggerPayload> {
    city.map(|city| TriggerPayload { city: Some(city) })
}
