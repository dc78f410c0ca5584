//! Reports two errors and a recovered panic, then crashes inside the
//! session body so the final panic is delivered before it unwinds.
//!
//! ```text
//! ALERTY_ORG_ID=org_123 ALERTY_INGEST_URL=http://localhost:4318 cargo run --example crash
//! ```

use alerty::{ConfigBuilder, Failure, Session, TracedError};
use std::fs::File;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    let log_level = std::env::var("ALERTY_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

fn load_settings(path: &str) -> Result<File, TracedError> {
    File::open(path).map_err(|e| TracedError::wrap(e, format!("cannot load settings from {}", path)))
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let config = ConfigBuilder::new()
        .organization_id(std::env::var("ALERTY_ORG_ID").unwrap_or_default())
        .ingest_url(std::env::var("ALERTY_INGEST_URL").unwrap_or_default())
        .name("crash-demo")
        .version(env!("CARGO_PKG_VERSION"))
        .environment("development")
        .debug(true)
        .build()?;

    Session::start(config)?.run(|| {
        if let Err(e) = load_settings("/nonexistent/settings.yaml") {
            alerty::capture_error(&e);
        }

        if let Err(e) = std::fs::read_dir("/nonexistent/cache") {
            alerty::capture_error(Failure::of(&e));
        }

        alerty::recover(|| {
            let queue: Vec<u32> = Vec::new();
            queue[3]
        });

        panic!("demo finished with an unhandled panic");
    })
}
