// config.rs
// Application configuration: optional prezio.toml overlaid by PREZIO__* environment variables.

use anyhow::Result;
use config::{Config as Cfg, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Base URL of the web app; used for public document links.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    /// Directory holding uploaded template files.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_users_file")]
    pub users_file: String,
    #[serde(default = "default_payment_min")]
    pub payment_min: Decimal,
    #[serde(default = "default_payment_max")]
    pub payment_max: Decimal,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Issue a receipt automatically after every invoice payment.
    #[serde(default = "default_auto_receipts")]
    pub auto_receipts: bool,
}

fn default_mongodb_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_mongodb_db() -> String {
    "prezio".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_templates_dir() -> String {
    "./data/templates".to_string()
}

fn default_users_file() -> String {
    "./data/users.json".to_string()
}

fn default_payment_min() -> Decimal {
    Decimal::from(5)
}

fn default_payment_max() -> Decimal {
    Decimal::from(500_000)
}

fn default_retention_days() -> i64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_auto_receipts() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            bind_address: default_bind_address(),
            frontend_url: default_frontend_url(),
            templates_dir: default_templates_dir(),
            users_file: default_users_file(),
            payment_min: default_payment_min(),
            payment_max: default_payment_max(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval_secs(),
            log_level: default_log_level(),
            auto_receipts: default_auto_receipts(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("prezio").required(false))
            .add_source(
                Environment::with_prefix("PREZIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
