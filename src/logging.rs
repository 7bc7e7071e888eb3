use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Env var that overrides `RUST_LOG` for the daemon.
pub const LOG_ENV: &str = "PROJECTHUB_LOG";

fn default_directives(component: &str) -> String {
    format!("info,projecthub=debug,{component}=debug")
}

/// Picks the filter: `PROJECTHUB_LOG` first, then `RUST_LOG`, then the
/// built-in default. A value that does not parse is skipped.
fn select_filter(component: &str, own: Option<&str>, rust_log: Option<&str>) -> EnvFilter {
    own.and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| rust_log.and_then(|value| EnvFilter::try_new(value).ok()))
        .unwrap_or_else(|| EnvFilter::new(default_directives(component)))
}

/// Installs the global compact subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing(component: &str) {
    let own = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = select_filter(component, own.as_deref(), rust_log.as_deref());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_variable_wins_over_rust_log() {
        let filter = select_filter("projecthubd", Some("warn"), Some("trace"));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn default_enables_component_debug() {
        let filter = select_filter("projecthubd", None, None);
        let rendered = filter.to_string();
        assert!(rendered.contains("projecthubd=debug"));
        assert!(rendered.contains("projecthub=debug"));
    }

    #[test]
    fn rust_log_used_without_own_variable() {
        let filter = select_filter("projecthubd", None, Some("error"));
        assert_eq!(filter.to_string(), "error");
    }
}
