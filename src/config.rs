//! Runtime configuration resolved from the command line and environment.
//!
//! | Flag             | Variable             | Default                 |
//! |------------------|----------------------|-------------------------|
//! | `--api-endpoint` | `HUBSCOPE_API`       | `http://localhost:8000` |
//! | `--log-level`    | `HUBSCOPE_LOG`       | `info`                  |
//! | `--no-stream`    | `HUBSCOPE_NO_STREAM` | off                     |

use thiserror::Error;

use crate::Args;
use crate::net::{Endpoint, EndpointError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid --api-endpoint: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("--log-level must not be empty")]
    EmptyLogFilter,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the hub service.
    pub endpoint: Endpoint,

    /// `tracing` filter directive, e.g. `"hubscope=debug,info"`.
    pub log_filter: String,

    /// When false, only the initial snapshot and manual refreshes are used.
    pub live_updates: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let log_filter = args.log_level.trim();
        if log_filter.is_empty() {
            return Err(ConfigError::EmptyLogFilter);
        }

        Ok(Self {
            endpoint: Endpoint::parse(&args.api_endpoint)?,
            log_filter: log_filter.to_owned(),
            live_updates: !args.no_stream,
        })
    }
}
