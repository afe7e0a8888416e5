//! # Prometheus Metrics
//!
//! Operational counters for a scenario run, rendered in the Prometheus text
//! exposition format at the end of the run.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use margin_contracts::events::Event;

/// Holds all Prometheus metric handles for a run.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Vaults created by any factory.
    pub vaults_created_total: IntCounter,
    /// Transfers added to a factory's queue.
    pub transfers_queued_total: IntCounter,
    /// Queued transfers consumed by the share hook.
    pub transfers_executed_total: IntCounter,
    /// Generic trader swaps that settled.
    pub swaps_executed_total: IntCounter,
    /// Generic trader swaps that failed, labelled by error kind.
    pub swaps_rejected_total: IntCounterVec,
    /// Scenario steps that failed, labelled by error kind.
    pub steps_failed_total: IntCounterVec,
}

impl NodeMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("margin".into()), None)?;

        let vaults_created_total =
            IntCounter::new("vaults_created_total", "Total number of vaults created")?;
        registry.register(Box::new(vaults_created_total.clone()))?;

        let transfers_queued_total = IntCounter::new(
            "transfers_queued_total",
            "Total number of transfers queued by vault factories",
        )?;
        registry.register(Box::new(transfers_queued_total.clone()))?;

        let transfers_executed_total = IntCounter::new(
            "transfers_executed_total",
            "Total number of queued transfers executed by the share hook",
        )?;
        registry.register(Box::new(transfers_executed_total.clone()))?;

        let swaps_executed_total =
            IntCounter::new("swaps_executed_total", "Total number of settled swaps")?;
        registry.register(Box::new(swaps_executed_total.clone()))?;

        let swaps_rejected_total = IntCounterVec::new(
            Opts::new("swaps_rejected_total", "Total number of rejected swaps"),
            &["kind"],
        )?;
        registry.register(Box::new(swaps_rejected_total.clone()))?;

        let steps_failed_total = IntCounterVec::new(
            Opts::new("steps_failed_total", "Total number of failed scenario steps"),
            &["kind"],
        )?;
        registry.register(Box::new(steps_failed_total.clone()))?;

        Ok(Self {
            registry,
            vaults_created_total,
            transfers_queued_total,
            transfers_executed_total,
            swaps_executed_total,
            swaps_rejected_total,
            steps_failed_total,
        })
    }

    /// Counts the state transitions recorded in `events`.
    pub fn observe_events<'a>(&self, events: impl IntoIterator<Item = &'a Event>) {
        for event in events {
            match event {
                Event::VaultCreated { .. } => self.vaults_created_total.inc(),
                Event::TransferQueued { .. } => self.transfers_queued_total.inc(),
                Event::TransferExecuted { .. } => self.transfers_executed_total.inc(),
                Event::SwapExecuted { .. } => self.swaps_executed_total.inc(),
                _ => {}
            }
        }
    }

    pub fn swap_rejected(&self, kind: &str) {
        self.swaps_rejected_total.with_label_values(&[kind]).inc();
    }

    pub fn step_failed(&self, kind: &str) {
        self.steps_failed_total.with_label_values(&[kind]).inc();
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
