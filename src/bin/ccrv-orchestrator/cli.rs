//! Command-line interface definition.

use ccrv_orchestrator::config::{default_config_path, OrchestratorConfig};
use ccrv_orchestrator::{Consent, SubjectIdentity};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Submit a criminal-case-record verification and poll it to completion.
#[derive(Parser, Debug)]
#[command(name = "ccrv-orchestrator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Caller reference id correlating this verification to an order.
    #[arg(long, env = "CCRV_REFERENCE")]
    pub reference: String,

    /// Subject's full name.
    #[arg(long)]
    pub name: String,

    /// Subject's residential address.
    #[arg(long)]
    pub address: String,

    /// Subject's father's name.
    #[arg(long)]
    pub father_name: Option<String>,

    /// Subject's date of birth (YYYY-MM-DD).
    #[arg(long)]
    pub date_of_birth: Option<NaiveDate>,

    /// Affirm that the subject consented to the record search.
    #[arg(long)]
    pub consent: bool,

    /// Provider API base URL.
    #[arg(long, env = "CCRV_BASE_URL")]
    pub base_url: Option<String>,

    /// Provider API key.
    #[arg(long, env = "CCRV_API_KEY")]
    pub api_key: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments into an `OrchestratorConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn to_config(&self) -> color_eyre::Result<OrchestratorConfig> {
        // Start with an explicit file, the default location, or defaults.
        let mut config = if let Some(ref path) = self.config {
            OrchestratorConfig::from_file(path)?
        } else {
            let default_path = default_config_path();
            if default_path.exists() {
                OrchestratorConfig::from_file(&default_path)?
            } else {
                OrchestratorConfig::default()
            }
        };

        // Override with CLI arguments.
        if let Some(ref base_url) = self.base_url {
            config.provider.base_url = base_url.clone();
        }
        if let Some(ref api_key) = self.api_key {
            config.provider.api_key = Some(api_key.clone());
        }
        config.log_level = self.log_level.clone();

        Ok(config)
    }

    /// Identity attributes of the subject to verify.
    #[must_use]
    pub fn identity(&self) -> SubjectIdentity {
        SubjectIdentity {
            name: self.name.clone(),
            address: self.address.clone(),
            father_name: self.father_name.clone(),
            date_of_birth: self.date_of_birth,
        }
    }

    /// Consent marker derived from the `--consent` flag.
    #[must_use]
    pub fn consent_marker(&self) -> Consent {
        if self.consent {
            Consent::Granted
        } else {
            Consent::Denied
        }
    }
}
