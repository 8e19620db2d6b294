//! Metrics for the swap orchestrator.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};

#[derive(Clone, Debug)]
pub struct OrchestratorMetrics {
    /// Deployment cycles started.
    pub cycles: IntCounter,
    /// Cycles that ended in an error.
    pub cycle_failures: IntCounter,
    /// Completed blue-green swaps.
    pub swaps: IntCounter,
    /// 1 while the traffic gate is read-only.
    pub gate_read_only: IntGauge,
    /// Instances seen by the last enumeration.
    pub instances: IntGauge,
}

impl OrchestratorMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            cycles: register_int_counter_with_registry!(
                "portal_loop_cycles_total",
                "Deployment cycles started",
                registry,
            )
            .expect("this is a valid metrics registration"),
            cycle_failures: register_int_counter_with_registry!(
                "portal_loop_cycle_failures_total",
                "Deployment cycles that ended in an error",
                registry,
            )
            .expect("this is a valid metrics registration"),
            swaps: register_int_counter_with_registry!(
                "portal_loop_swaps_total",
                "Completed blue-green swaps",
                registry,
            )
            .expect("this is a valid metrics registration"),
            gate_read_only: register_int_gauge_with_registry!(
                "portal_loop_gate_read_only",
                "1 while the traffic gate holds the proxy in read-only mode",
                registry,
            )
            .expect("this is a valid metrics registration"),
            instances: register_int_gauge_with_registry!(
                "portal_loop_instances",
                "Portal loop instances seen by the last enumeration",
                registry,
            )
            .expect("this is a valid metrics registration"),
        }
    }

    /// Metrics registered on a throwaway registry.
    pub fn unregistered() -> Self {
        Self::new(&Registry::new())
    }
}
