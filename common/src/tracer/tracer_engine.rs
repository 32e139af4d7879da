use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Invalid log filter in environment, falling back to {default}: {source}")]
    Filter {
        default: LevelFilter,
        source: tracing_subscriber::filter::FromEnvError,
    },
}

pub struct TracerOptions {
    /// Level used when `RUST_LOG` is unset or invalid.
    pub default_level: LevelFilter,
    /// Include the span list of each event in the stdout output.
    pub with_span_events: bool,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self {
            default_level: LevelFilter::INFO,
            with_span_events: false,
        }
    }
}

/// This object initialises the stdout tracer, given a TracerOptions struct.
pub struct TracerEngine {
    filter_error: Option<TracerError>,
}

impl TracerEngine {
    /// Initialises the stdout tracer for the crate
    /// #Arguments
    /// * `options` - The caller-specified instance of TracerOptions.
    /// * `service_name` - The name of the binary, reported once at start up.
    /// #Returns
    /// An instance of TracerEngine
    pub fn new(options: TracerOptions, service_name: &str) -> Self {
        let (log_filter, filter_error) = match EnvFilter::builder()
            .with_default_directive(options.default_level.into())
            .from_env()
        {
            Ok(filter) => (filter, None),
            Err(source) => (
                EnvFilter::default().add_directive(options.default_level.into()),
                Some(TracerError::Filter {
                    default: options.default_level,
                    source,
                }),
            ),
        };

        let stdout_tracer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_span_events(if options.with_span_events {
                tracing_subscriber::fmt::format::FmtSpan::CLOSE
            } else {
                tracing_subscriber::fmt::format::FmtSpan::NONE
            });

        let subscriber =
            tracing_subscriber::Registry::default().with(stdout_tracer.with_filter(log_filter));

        //  This is only called once, so will never panic
        tracing::subscriber::set_global_default(subscriber)
            .expect("tracing::subscriber::set_global_default should only be called once");

        tracing::info!("{service_name} tracing initialised");

        Self { filter_error }
    }

    pub fn filter_error(&self) -> Option<&TracerError> {
        self.filter_error.as_ref()
    }
}
