//! Prometheus gauges for driver timing plus exporter self-metrics

use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_gauge_with_registry, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder,
};
use std::fmt;
use std::sync::Arc;

/// Label every timing gauge is keyed by
pub const DRIVER_LABEL: &str = "driver";

/// Exposed timing gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Sector1Time,
    Sector2Time,
    Sector3Time,
    SpeedTrap,
    LapCount,
    LapTime,
    GapToLeader,
    Interval,
    Position,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Sector1Time,
        Metric::Sector2Time,
        Metric::Sector3Time,
        Metric::SpeedTrap,
        Metric::LapCount,
        Metric::LapTime,
        Metric::GapToLeader,
        Metric::Interval,
        Metric::Position,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Sector1Time => "sector1_time",
            Metric::Sector2Time => "sector2_time",
            Metric::Sector3Time => "sector3_time",
            Metric::SpeedTrap => "speed_trap",
            Metric::LapCount => "lap_count",
            Metric::LapTime => "lap_time",
            Metric::GapToLeader => "gap_to_leader",
            Metric::Interval => "interval",
            Metric::Position => "position",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            Metric::Sector1Time => "Sector 1 times",
            Metric::Sector2Time => "Sector 2 times",
            Metric::Sector3Time => "Sector 3 times",
            Metric::SpeedTrap => "Speed trap data",
            Metric::LapCount => "Number of laps",
            Metric::LapTime => "Lap times",
            Metric::GapToLeader => "Gap to leader",
            Metric::Interval => "Interval data",
            Metric::Position => "Driver positions",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destination for gauge writes
pub trait GaugeSink {
    fn set(&self, metric: Metric, driver: &str, value: f64);
}

/// Gauge registry shared between the poll loop and the HTTP endpoint
#[derive(Clone)]
pub struct MetricsRegistry {
    gauges: Arc<[GaugeVec; 9]>,

    pub poll_cycles_total: CounterVec,
    pub fetch_failures_total: CounterVec,
    pub cycle_errors_total: CounterVec,
    pub last_cycle_timestamp: Gauge,

    registry: Arc<Registry>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let mut gauges = Vec::with_capacity(Metric::ALL.len());
        for metric in Metric::ALL {
            gauges.push(register_gauge_vec_with_registry!(
                metric.name(),
                metric.help(),
                &[DRIVER_LABEL],
                registry
            )?);
        }
        let gauges: [GaugeVec; 9] = gauges
            .try_into()
            .map_err(|_| prometheus::Error::Msg("gauge table size mismatch".to_string()))?;

        let poll_cycles_total = register_counter_vec_with_registry!(
            "lapwatch_poll_cycles_total",
            "Completed poll cycles by session type",
            &["session"],
            registry
        )?;

        let fetch_failures_total = register_counter_vec_with_registry!(
            "lapwatch_fetch_failures_total",
            "Upstream fetches that returned no data, by resource",
            &["resource"],
            registry
        )?;

        let cycle_errors_total = register_counter_vec_with_registry!(
            "lapwatch_cycle_errors_total",
            "Poll cycles aborted before applying updates, by error kind",
            &["kind"],
            registry
        )?;

        let last_cycle_timestamp = register_gauge_with_registry!(
            "lapwatch_last_cycle_timestamp_seconds",
            "Unix time of the last cycle that applied gauge updates",
            registry
        )?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            gauges: Arc::new(gauges),
            poll_cycles_total,
            fetch_failures_total,
            cycle_errors_total,
            last_cycle_timestamp,
            registry: Arc::new(registry),
        })
    }

    fn gauge(&self, metric: Metric) -> &GaugeVec {
        // ALL and the gauge table share the enum's declaration order
        &self.gauges[metric as usize]
    }

    /// Current value of a timing gauge, if it has been written
    pub fn value(&self, metric: Metric, driver: &str) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == metric.name())
            .flat_map(|family| family.get_metric())
            .find(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == DRIVER_LABEL && l.get_value() == driver)
            })
            .map(|m| m.get_gauge().get_value())
    }

    pub fn record_cycle(&self, session: &str) {
        self.poll_cycles_total.with_label_values(&[session]).inc();
    }

    pub fn record_fetch_failure(&self, resource: &str) {
        self.fetch_failures_total.with_label_values(&[resource]).inc();
    }

    pub fn record_cycle_error(&self, kind: &str) {
        self.cycle_errors_total.with_label_values(&[kind]).inc();
    }

    pub fn mark_updated(&self, unix_secs: f64) {
        self.last_cycle_timestamp.set(unix_secs);
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl GaugeSink for MetricsRegistry {
    fn set(&self, metric: Metric, driver: &str, value: f64) {
        self.gauge(metric).with_label_values(&[driver]).set(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read_back() {
        let metrics = MetricsRegistry::new().unwrap();
        assert_eq!(metrics.value(Metric::LapCount, "VER"), None);

        metrics.set(Metric::LapCount, "VER", 5.0);
        metrics.set(Metric::LapCount, "VER", 6.0);
        assert_eq!(metrics.value(Metric::LapCount, "VER"), Some(6.0));
        assert_eq!(metrics.value(Metric::LapCount, "HAM"), None);
    }

    #[test]
    fn test_export_contains_driver_label() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.set(Metric::GapToLeader, "NOR", 1.25);
        metrics.record_fetch_failure("laps");

        let text = metrics.export().unwrap();
        assert!(text.contains("gap_to_leader{driver=\"NOR\"} 1.25"));
        assert!(text.contains("lapwatch_fetch_failures_total{resource=\"laps\"} 1"));
    }

    #[test]
    fn test_metric_names_match_gauge_order() {
        let metrics = MetricsRegistry::new().unwrap();
        for metric in Metric::ALL {
            metrics.set(metric, "TST", 1.0);
            let text = metrics.export().unwrap();
            assert!(text.contains(&format!("{}{{driver=\"TST\"}} 1", metric.name())));
        }
    }
}
