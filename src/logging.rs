//! Subscriber bootstrap for binaries and tests embedding the crate.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{Result, RowGraphError};

/// Filter used when neither the caller nor `RUST_LOG` names one.
pub const DEFAULT_FILTER: &str = "rowgraph=info";

/// Installs a global `fmt` subscriber writing to stderr.
///
/// `filter` uses `EnvFilter` syntax (e.g. `"rowgraph=debug"`). An empty
/// filter defers to `RUST_LOG`, then to [`DEFAULT_FILTER`]. Fails if the
/// filter does not parse or a global subscriber is already installed.
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(resolve_filter(filter)?)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|_| RowGraphError::invalid("a global tracing subscriber is already installed"))
}

fn resolve_filter(filter: &str) -> Result<EnvFilter> {
    let directives = match filter.trim() {
        "" => std::env::var(EnvFilter::DEFAULT_ENV)
            .ok()
            .filter(|env| !env.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_owned()),
        explicit => explicit.to_owned(),
    };
    EnvFilter::try_new(&directives)
        .map_err(|e| RowGraphError::invalid(format!("invalid log filter `{directives}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_filter_is_rejected() {
        assert!(matches!(
            resolve_filter("rowgraph=loud"),
            Err(RowGraphError::InvalidArgument(_))
        ));
        assert!(resolve_filter(" rowgraph=debug ").is_ok());
    }

    #[test]
    fn empty_filter_falls_back() {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_none() {
            assert!(resolve_filter("").is_ok());
        }
    }

    #[test]
    fn second_init_is_reported() {
        let _ = init_logging("rowgraph=debug");
        assert!(init_logging("rowgraph=debug").is_err());
    }
}
