//! Tracing setup for the rental lifecycle service.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies with the
//! server stack quieted to warnings so per-request chatter does not drown out
//! lifecycle events.

use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

const QUIET_STACK: &str = "hyper=warn,tower=warn";

#[derive(Debug)]
pub enum TelemetryError {
    Filter { directives: String, source: ParseError },
    Init(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Filter { directives, .. } => {
                write!(f, "invalid tracing filter '{directives}'")
            }
            TelemetryError::Init(err) => write!(f, "failed to install subscriber: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Filter { source, .. } => Some(source),
            TelemetryError::Init(err) => Some(&**err),
        }
    }
}

fn fallback_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    let directives = format!("{},{QUIET_STACK}", config.log_level);
    EnvFilter::try_new(&directives)
        .map_err(|source| TelemetryError::Filter { directives, source })
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => fallback_filter(config)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Init)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_configured_level_builds_a_filter_with_the_stack_quieted() {
        let config = TelemetryConfig {
            log_level: "debug".to_string(),
        };
        assert!(fallback_filter(&config).is_ok());
    }

    #[test]
    fn an_unparseable_level_reports_the_offending_directives() {
        let config = TelemetryConfig {
            log_level: "very loud please".to_string(),
        };
        let err = fallback_filter(&config).expect_err("invalid directives");
        match err {
            TelemetryError::Filter { directives, .. } => {
                assert!(directives.starts_with("very loud please"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
