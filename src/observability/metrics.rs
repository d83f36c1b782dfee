//! # Metrics
//!
//! Prometheus metrics for stack synthesis and application.
//!
//! ## Metrics Exposed
//!
//! - `unicorn_stack_resources_declared_total{kind}` - Resources declared, by kind
//! - `unicorn_stack_synth_total` - Stack synthesis passes
//! - `unicorn_stack_synth_errors_total` - Failed synthesis passes
//! - `unicorn_stack_synth_duration_seconds` - Duration of synthesis passes
//! - `unicorn_stack_apply_resources_total{outcome}` - Resources applied, by outcome

use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RESOURCES_DECLARED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "unicorn_stack_resources_declared_total",
            "Total number of resources declared by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RESOURCES_DECLARED_TOTAL metric - this should never happen")
});

static SYNTH_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("unicorn_stack_synth_total", "Total number of stack synthesis passes")
        .expect("Failed to create SYNTH_TOTAL metric - this should never happen")
});

static SYNTH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "unicorn_stack_synth_errors_total",
        "Total number of failed stack synthesis passes",
    )
    .expect("Failed to create SYNTH_ERRORS_TOTAL metric - this should never happen")
});

static SYNTH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "unicorn_stack_synth_duration_seconds",
            "Duration of stack synthesis in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
    )
    .expect("Failed to create SYNTH_DURATION metric - this should never happen")
});

static APPLY_RESOURCES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "unicorn_stack_apply_resources_total",
            "Total number of resources applied by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create APPLY_RESOURCES_TOTAL metric - this should never happen")
});

fn register(collector: Box<dyn Collector>) -> Result<()> {
    match REGISTRY.register(collector) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Register all metrics with the registry; safe to call more than once
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    register(Box::new(RESOURCES_DECLARED_TOTAL.clone()))?;
    register(Box::new(SYNTH_TOTAL.clone()))?;
    register(Box::new(SYNTH_ERRORS_TOTAL.clone()))?;
    register(Box::new(SYNTH_DURATION.clone()))?;
    register(Box::new(APPLY_RESOURCES_TOTAL.clone()))?;
    Ok(())
}

/// Encode registered metrics in the text exposition format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn render_metrics() -> Result<String> {
    Ok(TextEncoder::new().encode_to_string(&REGISTRY.gather())?)
}

pub fn increment_resources_declared(kind: &str) {
    RESOURCES_DECLARED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_synth() {
    SYNTH_TOTAL.inc();
}

pub fn increment_synth_errors() {
    SYNTH_ERRORS_TOTAL.inc();
}

pub fn observe_synth_duration(duration: f64) {
    SYNTH_DURATION.observe(duration);
}

pub fn record_applied_resource(outcome: &str) {
    APPLY_RESOURCES_TOTAL.with_label_values(&[outcome]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_resources_declared() {
        let before = RESOURCES_DECLARED_TOTAL
            .with_label_values(&["test_kind"])
            .get();
        increment_resources_declared("test_kind");
        let after = RESOURCES_DECLARED_TOTAL
            .with_label_values(&["test_kind"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_synth_errors() {
        let before = SYNTH_ERRORS_TOTAL.get();
        increment_synth_errors();
        assert_eq!(SYNTH_ERRORS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_record_applied_resource() {
        let before = APPLY_RESOURCES_TOTAL.with_label_values(&["created"]).get();
        record_applied_resource("created");
        assert_eq!(
            APPLY_RESOURCES_TOTAL.with_label_values(&["created"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_render_metrics_contains_registered_names() {
        register_metrics().unwrap();
        increment_synth();
        observe_synth_duration(0.002);
        let text = render_metrics().unwrap();
        assert!(text.contains("unicorn_stack_synth_total"));
        assert!(text.contains("unicorn_stack_synth_duration_seconds"));
    }
}
