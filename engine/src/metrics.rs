//! Business metrics for the reservation engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `stockhold_holds_total{outcome}` - `create_hold` results (reserved, already_held,
//!   out_of_stock, item_capacity, rate_limited)
//! - `stockhold_hold_exits_total{exit}` - holds consumed (confirmed, released)
//! - `stockhold_units_sold_total` - units removed from stock by sales
//! - `stockhold_sweep_cleaned_total{category}` - entries repaired by the sweep
//! - `stockhold_store_errors_total{operation}` - store failures surfaced to callers
//!
//! Metrics go to whatever recorder the binary installs; without one, recording
//! is a no-op.

use metrics::describe_counter;

/// Register descriptions for all engine metrics.
///
/// Call once at startup, after installing the recorder.
pub fn register_engine_metrics() {
    describe_counter!(
        "stockhold_holds_total",
        "create_hold results by outcome (reserved, already_held, out_of_stock, item_capacity, rate_limited)"
    );
    describe_counter!(
        "stockhold_hold_exits_total",
        "Holds consumed by exit (confirmed, released)"
    );
    describe_counter!(
        "stockhold_units_sold_total",
        "Units removed from stock by confirmed or legacy sales"
    );
    describe_counter!(
        "stockhold_sweep_cleaned_total",
        "Entries repaired by the orphan sweep by category"
    );
    describe_counter!(
        "stockhold_store_errors_total",
        "Store failures surfaced to callers by operation"
    );

    tracing::info!("Engine metrics registered");
}

/// Record a `create_hold` result.
pub fn record_hold_outcome(outcome: &'static str) {
    metrics::counter!("stockhold_holds_total", "outcome" => outcome).increment(1);
}

/// Record a consumed hold.
pub fn record_hold_exit(exit: &'static str) {
    metrics::counter!("stockhold_hold_exits_total", "exit" => exit).increment(1);
}

/// Record units sold.
pub fn record_units_sold(units: u64) {
    metrics::counter!("stockhold_units_sold_total").increment(units);
}

/// Record sweep repairs in one category.
pub fn record_sweep_cleaned(category: &'static str, count: usize) {
    if count > 0 {
        metrics::counter!("stockhold_sweep_cleaned_total", "category" => category)
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}

/// Record a store failure.
pub fn record_store_error(operation: &'static str) {
    metrics::counter!("stockhold_store_errors_total", "operation" => operation).increment(1);
}
