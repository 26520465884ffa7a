//! Observability and diagnostics for the decode job and the oracle.
//!
//! Everything logs through the `log` facade. `init_logging` installs an
//! `env_logger` backend once per process; `log_metric!` emits structured
//! key/value lines that are compiled out of release builds.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Once;

use log::LevelFilter;

use crate::error::StripeError;

/// Logs a structured key-value metric line at debug level, only in debug builds.
///
/// # Example
/// ```
/// use stripefile::log_metric;
/// let stripes = 4;
/// log_metric!("event" = "decode_units_planned", "units" = &stripes);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            log::debug!("STRIPEFILE_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs the process-wide logger. Later calls are no-ops.
///
/// Lines are formatted as `[LEVEL] message`. With `log_file`, output is
/// appended to that file instead of stderr.
pub fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<(), StripeError> {
    let file = match log_file {
        Some(path) => Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(path)
                .map_err(|e| StripeError::from_io(path, e))?,
        ),
        None => None,
    };

    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(level);

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(file) = file {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LevelFilter::Debug, None).unwrap();
        init_logging(LevelFilter::Info, None).unwrap();
        log_metric!("event" = "test", "value" = &1);
    }

    #[test]
    fn test_unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("missing_dir").join("log.txt");
        assert!(init_logging(LevelFilter::Info, Some(&bad)).is_err());
    }
}
