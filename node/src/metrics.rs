//! Prometheus metrics for the game-state processor.
//!
//! [`GspMetrics`] owns a dedicated [`Registry`] that the RPC `/metrics`
//! endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Histogram, HistogramOpts, IntCounter, IntGauge, Opts,
    Registry,
};

pub struct GspMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub blocks_connected: IntCounter,
    pub blocks_disconnected: IntCounter,
    pub moves_applied: IntCounter,
    /// Moves skipped because they failed to decode.
    pub moves_rejected: IntCounter,
    /// Reconciliations that disconnected at least one block.
    pub reorgs: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub tip_height: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Time to stage, commit and publish one block, in milliseconds.
    pub block_process_time_ms: Histogram,
}

impl GspMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let blocks_connected = register_int_counter_with_registry!(
            Opts::new("gsp_blocks_connected_total", "Blocks connected to the game state"),
            registry
        )?;
        let blocks_disconnected = register_int_counter_with_registry!(
            Opts::new(
                "gsp_blocks_disconnected_total",
                "Blocks disconnected from the game state"
            ),
            registry
        )?;
        let moves_applied = register_int_counter_with_registry!(
            Opts::new("gsp_moves_applied_total", "Moves applied to the game state"),
            registry
        )?;
        let moves_rejected = register_int_counter_with_registry!(
            Opts::new("gsp_moves_rejected_total", "Invalid moves skipped"),
            registry
        )?;
        let reorgs = register_int_counter_with_registry!(
            Opts::new("gsp_reorgs_total", "Chain reorganisations handled"),
            registry
        )?;

        let tip_height = register_int_gauge_with_registry!(
            Opts::new("gsp_tip_height", "Height of the current game-state tip"),
            registry
        )?;

        let block_process_time_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "gsp_block_process_time_ms",
                "Block connect/disconnect time in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(0.1, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            blocks_connected,
            blocks_disconnected,
            moves_applied,
            moves_rejected,
            reorgs,
            tip_height,
            block_process_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_all_families() {
        let metrics = GspMetrics::new().unwrap();
        metrics.blocks_connected.inc();
        metrics.tip_height.set(7);
        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();
        assert!(names.contains(&"gsp_blocks_connected_total".to_string()));
        assert!(names.contains(&"gsp_reorgs_total".to_string()));
        assert_eq!(metrics.tip_height.get(), 7);
    }

    #[test]
    fn registries_are_independent() {
        assert!(GspMetrics::new().is_ok());
        assert!(GspMetrics::new().is_ok());
    }
}
