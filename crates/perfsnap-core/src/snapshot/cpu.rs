use tracing::debug;

use super::MetricsContext;
use super::model::CpuSnapshot;
use crate::arbitration::{self, Arbitration, CPU_TABLE, HWMON_TABLE};
use crate::collector::procfs::{self, parser};
use crate::collector::sysfs::{cpu, thermal};
use crate::collector::{Clock, FileSystem};
use crate::error::{SampleError, join_errors};
use crate::history::CounterSample;
use crate::rates::busy_percent;

const CPU_STREAM: &str = "cpu:global";

/// A chosen CPU temperature and the source it is attributed to.
struct CpuTemperature {
    arbitration: Arbitration,
    source: String,
}

impl<F: FileSystem, C: Clock> MetricsContext<F, C> {
    /// Full CPU record.
    pub fn cpu_snapshot(&self) -> CpuSnapshot {
        let sys = self.sys_root();
        let mut errors = Vec::new();

        let logical = cpu::logical_cores(&self.fs, sys);
        let physical = cpu::physical_cores(&self.fs, sys, logical);
        let clusters = cpu::clusters(&self.fs, sys);
        let (processes, threads) = procfs::count_tasks(&self.fs, &self.config.proc_root);

        let usage_percent = self.sample_cpu_usage().unwrap_or_else(|e| {
            errors.push(e);
            -1.0
        });

        let handles = self.read_proc("sys/fs/file-nr").and_then(|content| {
            content
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<i64>().ok())
                .ok_or_else(|| SampleError::Parse("file-nr: no allocated handle count".to_string()))
        });
        let handles = handles.unwrap_or_else(|e| {
            errors.push(e);
            -1
        });

        let uptime_seconds = self
            .read_proc("uptime")
            .and_then(|content| Ok(parser::parse_uptime_secs(&content)?))
            .unwrap_or_else(|e| {
                errors.push(e);
                -1
            });

        let mut snapshot = CpuSnapshot {
            cpu_name: cpu::cpu_name(&self.fs, &self.config.proc_root, sys),
            cores_physical: physical,
            cores_logical: logical,
            usage_percent,
            max_freq_khz: cpu::max_current_freq_khz(&self.fs, sys),
            processes,
            threads,
            handles,
            uptime_seconds,
            core_layout: cpu::core_layout(&clusters),
            core_layout_labeled: cpu::core_layout_labeled(&clusters),
            cpu_temp_c: -1.0,
            cpu_temp_raw: -1,
            timestamp_ms: self.now_ms(),
            ..CpuSnapshot::default()
        };

        match self.cpu_temperature() {
            Ok(temp) => {
                snapshot.cpu_temp_c = temp.arbitration.value_celsius;
                snapshot.cpu_temp_raw = temp.arbitration.raw_value;
                snapshot.cpu_temp_source = temp.source;
                snapshot.cpu_temp_candidates = temp.arbitration.sample_digest;
                snapshot.cpu_temp_unit_assumption = temp.arbitration.unit_assumption.to_string();
            }
            Err(e) => errors.push(e),
        }

        snapshot.error = join_errors(&errors);
        snapshot
    }

    /// CPU busy share since the previous call, from `/proc/stat`.
    pub(super) fn sample_cpu_usage(&self) -> Result<f64, SampleError> {
        let totals = parser::parse_cpu_totals(&self.read_proc("stat")?)?;
        let sample = CounterSample::new(CPU_STREAM, self.now_ms())
            .with("busy", totals.busy())
            .with("total", totals.total);

        let (prev, _dt) = self.exchange(sample)?;
        let (Some(prev_busy), Some(prev_total)) = (prev.counter("busy"), prev.counter("total")) else {
            return Err(SampleError::StaleSample);
        };
        Ok(busy_percent(prev_busy, totals.busy(), prev_total, totals.total))
    }

    /// Arbitrates thermal zones first, hwmon sensors second.
    ///
    /// Reports `OutOfRange` only when a CPU sensor was read but every value
    /// fell outside the sanity window.
    fn cpu_temperature(&self) -> Result<CpuTemperature, SampleError> {
        let window = self.config.sanity_window;

        let zone_readings = thermal::read_zones(&self.fs, &self.thermal_zones());
        if let Some(chosen) = arbitration::choose(&zone_readings, &CPU_TABLE, window) {
            let source = format!("thermal_zone:{}", chosen.provenance);
            return Ok(CpuTemperature {
                arbitration: chosen,
                source,
            });
        }

        let hwmon_readings = thermal::read_hwmon(&self.fs, self.sys_root());
        if let Some(chosen) = arbitration::choose(&hwmon_readings, &HWMON_TABLE, window) {
            let source = format!("hwmon:{}", chosen.source_label);
            return Ok(CpuTemperature {
                arbitration: chosen,
                source,
            });
        }

        // Only admitted sensors count; battery or skin zones are not CPU readings
        let rejected = zone_readings
            .iter()
            .filter(|r| (CPU_TABLE.admit)(&r.category.to_lowercase()))
            .chain(hwmon_readings.iter())
            .filter(|r| !window.contains(r.value_celsius))
            .count();
        debug!(
            zones = zone_readings.len(),
            hwmon = hwmon_readings.len(),
            rejected,
            "no usable cpu temperature"
        );
        if rejected == 0 {
            Err(SampleError::MissingResource("cpu temperature sensor".to_string()))
        } else {
            Err(SampleError::OutOfRange(format!(
                "cpu temperature: {} readings rejected",
                rejected
            )))
        }
    }
}
