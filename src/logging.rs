//! Logging configuration (SPEC_FULL.md §B), grounded on `core/src/logging.rs`:
//! `tracing_subscriber` with an `EnvFilter` over `RUST_LOG`, human-readable or
//! JSON output, and a layer that drops the high-volume per-tool-invocation
//! span so a single analyst burning its quota doesn't flood the log.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Span name tools are invoked under (see [`crate::tools::invoker::ToolInvoker`]);
/// filtered out of both subscribers below since a quota of 20 calls for one
/// analyst would otherwise dominate the log at INFO.
pub const TOOL_INVOCATION_SPAN_NAME: &str = "conclave.tool_invocation";

/// Initializes human-readable logging, honoring `RUST_LOG` with an `INFO`
/// default.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(ToolSpanFilter)
        .init()
}

/// Initializes JSON logging for aggregation, honoring `RUST_LOG` with an
/// `INFO` default.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .with(ToolSpanFilter)
        .init()
}

struct ToolSpanFilter;

impl<S> tracing_subscriber::layer::Layer<S> for ToolSpanFilter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn event_enabled(
        &self,
        _: &tracing::Event<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) -> bool {
        if let Some(span) = ctx.lookup_current() {
            span.name() != TOOL_INVOCATION_SPAN_NAME
        } else {
            true
        }
    }
}
