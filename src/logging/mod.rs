use crate::cli::TracingFormat;
use crate::config::Config;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::{DefaultFields, Format, JsonFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Plain-text layer appending to the configured log file.
type FileLayer<S> = tracing_subscriber::fmt::Layer<S, DefaultFields, Format, Mutex<File>>;

/// Configure and initialize logging for the application.
///
/// `RUST_LOG` takes precedence over the configured level. When `log_file` is set,
/// a second plain-text layer appends to it; failing to open the file only costs
/// that layer.
pub fn setup_logging(config: &Config, tracing_format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let base_level = &config.log_level;
        EnvFilter::new(format!("warn,enrollment={base_level}"))
    });

    let mut file_error = None;
    let log_file = config.log_file.as_deref().and_then(|path| match open_log_file(path) {
        Ok(file) => Some(file),
        Err(e) => {
            file_error = Some((path.display().to_string(), e));
            None
        }
    });

    // The file layer is built per stack; its subscriber type differs between them.
    match tracing_format {
        TracingFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true).compact())
                .with(log_file.map(file_layer))
                .init();
        }
        TracingFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .json()
                        .with_current_span(true)
                        .fmt_fields(JsonFields::new()),
                )
                .with(log_file.map(file_layer))
                .init();
        }
    }

    if let Some((path, error)) = file_error {
        tracing::warn!(path, error = %error, "Could not open log file, logging to stdout only");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_layer<S>(file: File) -> FileLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_layer_appends_under_both_stacks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enrollment.log");

        let compact = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::sink))
            .with(Some(file_layer(open_log_file(&path).unwrap())));
        tracing::subscriber::with_default(compact, || tracing::info!(site = "uva", "first run"));

        let json = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::sink))
            .with(Some(file_layer(open_log_file(&path).unwrap())));
        tracing::subscriber::with_default(json, || tracing::info!(site = "ucsd", "second run"));

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("first run"));
        assert!(written.contains("second run"));
        assert!(written.contains("ucsd"));
        assert!(!written.contains('\u{1b}'), "file output must not carry ANSI codes");
    }
}
