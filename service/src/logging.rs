use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Direct dependencies of this workspace that log heavily at Debug/Trace.
/// Their output is suppressed unless the operator asks for Trace, where the
/// point is to see everything.
const NOISY_DEPENDENCIES: &[&str] = &["axum", "hyper", "reqwest", "tower", "tracing"];

/// Wire up the process-wide terminal logger from the parsed configuration.
///
/// Panics when a logger is already installed; this is called exactly once
/// from `main` before anything else logs.
pub fn init(config: &Config) {
    let level = config.log_level_filter;
    TermLogger::init(
        to_simplelog(level),
        term_config(level),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("logger already initialized");
}

/// simplelog defines its own copy of `log::LevelFilter`; map between them.
fn to_simplelog(level: LevelFilter) -> simplelog::LevelFilter {
    match level {
        LevelFilter::Off => simplelog::LevelFilter::Off,
        LevelFilter::Error => simplelog::LevelFilter::Error,
        LevelFilter::Warn => simplelog::LevelFilter::Warn,
        LevelFilter::Info => simplelog::LevelFilter::Info,
        LevelFilter::Debug => simplelog::LevelFilter::Debug,
        LevelFilter::Trace => simplelog::LevelFilter::Trace,
    }
}

/// RFC-3339 timestamps, with dependency noise filtered out at every level
/// except Trace.
fn term_config(level: LevelFilter) -> simplelog::Config {
    let mut builder = ConfigBuilder::new();
    builder.set_time_format_rfc3339();
    if level != LevelFilter::Trace {
        for module in NOISY_DEPENDENCIES {
            builder.add_filter_ignore_str(module);
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noisy_dependency_list_matches_workspace_http_stack() {
        for dependency in ["axum", "hyper", "tower", "tracing", "reqwest"] {
            assert!(
                NOISY_DEPENDENCIES.contains(&dependency),
                "{dependency} should be filtered"
            );
        }
    }

    #[test]
    fn test_to_simplelog_covers_every_level() {
        let levels = [
            (LevelFilter::Off, simplelog::LevelFilter::Off),
            (LevelFilter::Error, simplelog::LevelFilter::Error),
            (LevelFilter::Warn, simplelog::LevelFilter::Warn),
            (LevelFilter::Info, simplelog::LevelFilter::Info),
            (LevelFilter::Debug, simplelog::LevelFilter::Debug),
            (LevelFilter::Trace, simplelog::LevelFilter::Trace),
        ];
        for (level, expected) in levels {
            assert_eq!(to_simplelog(level) as u8, expected as u8);
        }
    }

    #[test]
    fn test_term_config_builds_with_and_without_filters() {
        // Trace disables filtering, every other level enables it; both
        // configurations must build cleanly.
        let _trace = term_config(LevelFilter::Trace);
        let _info = term_config(LevelFilter::Info);
    }
}
