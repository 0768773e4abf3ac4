//! Configuration for Loan Desk
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

use crate::lifecycle::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_REFERENCE_PREFIX};
use crate::types::LoanDeskError;

/// Output format for log lines
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Loan Desk - loan application intake and review service
#[derive(Parser, Debug, Clone)]
#[command(name = "loan-desk")]
#[command(about = "Loan application intake and review service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "loan_desk")]
    pub mongodb_db: String,

    /// Prefix for generated reference numbers
    #[arg(long, env = "REFERENCE_PREFIX", default_value = DEFAULT_REFERENCE_PREFIX)]
    pub reference_prefix: String,

    /// Enable development mode (in-memory store when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Static key required on /api/admin/* when set
    #[arg(long, env = "ADMIN_API_KEY")]
    pub admin_api_key: Option<String>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Largest page size accepted by list endpoints
    #[arg(long, env = "MAX_PAGE_SIZE", default_value_t = DEFAULT_MAX_PAGE_SIZE)]
    pub max_page_size: u32,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), LoanDeskError> {
        let prefix = self.reference_prefix.trim();
        if prefix.is_empty() {
            return Err(LoanDeskError::Config("REFERENCE_PREFIX must not be empty".to_string()));
        }
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(LoanDeskError::Config(format!(
                "REFERENCE_PREFIX must be alphanumeric, got `{prefix}`"
            )));
        }

        if self.max_page_size == 0 {
            return Err(LoanDeskError::Config("MAX_PAGE_SIZE must be at least 1".to_string()));
        }

        if self
            .admin_api_key
            .as_deref()
            .is_some_and(|key| key.trim().is_empty())
        {
            return Err(LoanDeskError::Config("ADMIN_API_KEY must not be blank when set".to_string()));
        }

        Ok(())
    }

    /// Configured admin key, if any
    pub fn admin_key(&self) -> Option<&str> {
        self.admin_api_key.as_deref().map(str::trim)
    }
}
