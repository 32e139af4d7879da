mod tracer_engine;

pub use tracer_engine::{TracerEngine, TracerError, TracerOptions};

/// Should be called once at the start of each binary.
/// Emits a warning through the newly installed subscriber if `RUST_LOG`
/// contained directives that could not be parsed.
#[macro_export]
macro_rules! init_tracer {
    ($options:expr) => {{
        let tracer = TracerEngine::new($options, env!("CARGO_BIN_NAME"));
        if let Some(e) = tracer.filter_error() {
            warn!("{e}");
        }
        tracer
    }};
}
