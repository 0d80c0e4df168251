use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

const DEFAULT_DEVICE_ID_PATH: &str = ".cancellation-feedback/device-id";
const DEFAULT_CONTACT_NUMBER: &str = "5212713977168";

pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub device_id_path: PathBuf,
    pub contact_number: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok();
        let max_connections = var_or("DATABASE_MAX_CONNECTIONS", "5")
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        Ok(Self {
            database_url,
            max_connections,
            device_id_path: PathBuf::from(var_or("DEVICE_ID_PATH", DEFAULT_DEVICE_ID_PATH)),
            contact_number: var_or("CONTACT_WHATSAPP", DEFAULT_CONTACT_NUMBER),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}
