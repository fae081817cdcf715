use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

/// Runtime configuration, read once from the environment at startup.
pub struct Config {
    pub database_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub gateway_base_url: String,
    pub gateway_api_key: String,
    pub gateway_model: String,
    pub internal_token: String,
    pub worker_cron: String,
}

pub const DEFAULT_DB_PATH: &str = "data/pathforge.db";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_port: u16 = env_or("PATHFORGE_API_PORT", "8710")
            .parse()
            .context("PATHFORGE_API_PORT must be a port number")?;

        let gateway_api_key = std::env::var("GATEWAY_API_KEY")
            .context("GATEWAY_API_KEY must be set to reach the AI gateway")?;

        let internal_token = match std::env::var("PATHFORGE_INTERNAL_TOKEN") {
            Ok(token) if !token.trim().is_empty() => token,
            _ => {
                let token = format!("pfi_{}", uuid::Uuid::new_v4().simple());
                warn!(
                    "PATHFORGE_INTERNAL_TOKEN not set; generated one for this run. \
                     External cron triggers need the configured value."
                );
                token
            }
        };

        Ok(Self {
            database_path: PathBuf::from(env_or("PATHFORGE_DB_PATH", DEFAULT_DB_PATH)),
            api_host: env_or("PATHFORGE_API_HOST", "127.0.0.1"),
            api_port,
            gateway_base_url: env_or("GATEWAY_BASE_URL", "https://ai-gateway.vercel.sh"),
            gateway_api_key,
            gateway_model: env_or("GATEWAY_MODEL", "google/gemini-2.5-flash"),
            internal_token,
            // Six-field cron, seconds first: every 30 seconds.
            worker_cron: env_or("PATHFORGE_WORKER_CRON", "0/30 * * * * *"),
        })
    }

    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
