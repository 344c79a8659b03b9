//! Sensor arbitration: picking one trustworthy temperature out of many.
//!
//! A device exposes dozens of thermal zones and hwmon inputs, several of
//! which measure the same physical quantity with different names, units and
//! quality. [`choose`] classifies readings into priority-ordered buckets
//! described by a [`CategoryTable`], takes the first non-empty bucket and
//! returns its median with enough provenance to trace the value back to one
//! physical sensor.

use std::cmp::Ordering;

/// Plausible temperature range, in °C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityWindow {
    pub min_celsius: f64,
    pub max_celsius: f64,
}

impl SanityWindow {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min_celsius && value <= self.max_celsius
    }
}

impl Default for SanityWindow {
    fn default() -> Self {
        Self {
            min_celsius: -50.0,
            max_celsius: 200.0,
        }
    }
}

/// Converts a raw sensor value into °C.
///
/// Values of 1000 and above are millidegrees. Zero and negative values are
/// reported by disabled or broken sensors and are unusable.
pub fn raw_to_celsius(raw: i64) -> Option<f64> {
    if raw <= 0 {
        None
    } else if raw >= 1000 {
        Some(raw as f64 / 1000.0)
    } else {
        Some(raw as f64)
    }
}

/// One raw temperature observation.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    /// Sensor type as reported by the kernel (`cpu-1-0`, `gpuss-0`, ...).
    pub category: String,
    /// Where the reading came from (`thermal_zone3`, `tsens/temp1_input`).
    pub source_label: String,
    pub raw_value: i64,
    pub value_celsius: f64,
}

impl SensorReading {
    /// Builds a reading, or `None` if `raw_value` cannot be a temperature.
    pub fn new(category: impl Into<String>, source_label: impl Into<String>, raw_value: i64) -> Option<Self> {
        Some(Self {
            category: category.into(),
            source_label: source_label.into(),
            raw_value,
            value_celsius: raw_to_celsius(raw_value)?,
        })
    }
}

/// A named priority bucket.
///
/// `matches` receives the lowercased sensor category.
#[derive(Debug, Clone, Copy)]
pub struct SensorCategory {
    pub label: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Ordered classification rules for one physical quantity.
#[derive(Debug, Clone, Copy)]
pub struct CategoryTable {
    /// Readings whose lowercased category fails this test are ignored.
    pub admit: fn(&str) -> bool,
    /// Buckets in priority order.
    pub categories: &'static [SensorCategory],
    /// Bucket for admitted readings that match no category, consulted last.
    pub residual: Option<&'static str>,
}

/// The selected reading and how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Arbitration {
    pub value_celsius: f64,
    pub raw_value: i64,
    /// Sensor type of the chosen reading.
    pub category: String,
    /// Where the chosen reading came from.
    pub source_label: String,
    /// Bucket label plus selection mode: `cpu(median)`, `soc(single)`.
    pub provenance: String,
    /// Up to three sorted contributing readings as `type=raw`, comma separated.
    pub sample_digest: String,
    /// `mC` when the raw value was interpreted as millidegrees, else `C`.
    pub unit_assumption: &'static str,
}

/// Arbitrates `readings` according to `table`.
///
/// Returns `None` when no reading survives the sanity window and admission
/// filter. The result depends only on the input order for readings with
/// equal values, so identical input always yields identical provenance.
pub fn choose(readings: &[SensorReading], table: &CategoryTable, window: SanityWindow) -> Option<Arbitration> {
    let bucket_count = table.categories.len() + usize::from(table.residual.is_some());
    let mut buckets: Vec<Vec<&SensorReading>> = vec![Vec::new(); bucket_count];

    for reading in readings {
        if !window.contains(reading.value_celsius) {
            continue;
        }
        let lower = reading.category.to_lowercase();
        if !(table.admit)(&lower) {
            continue;
        }
        match table.categories.iter().position(|c| (c.matches)(&lower)) {
            Some(idx) => buckets[idx].push(reading),
            None if table.residual.is_some() => buckets[table.categories.len()].push(reading),
            None => {}
        }
    }

    let (idx, bucket) = buckets.iter_mut().enumerate().find(|(_, b)| !b.is_empty())?;
    let label = table
        .categories
        .get(idx)
        .map(|c| c.label)
        .or(table.residual)
        .unwrap_or("other");

    // Stable: equal values keep input order
    bucket.sort_by(|a, b| {
        a.value_celsius
            .partial_cmp(&b.value_celsius)
            .unwrap_or(Ordering::Equal)
    });

    let (chosen, mode) = if bucket.len() == 1 {
        (bucket[0], "single")
    } else {
        (bucket[(bucket.len() - 1) / 2], "median")
    };

    let sample_digest = bucket
        .iter()
        .take(3)
        .map(|r| format!("{}={}", r.category, r.raw_value))
        .collect::<Vec<_>>()
        .join(",");

    Some(Arbitration {
        value_celsius: chosen.value_celsius,
        raw_value: chosen.raw_value,
        category: chosen.category.clone(),
        source_label: chosen.source_label.clone(),
        provenance: format!("{}({})", label, mode),
        sample_digest,
        unit_assumption: if chosen.raw_value >= 1000 { "mC" } else { "C" },
    })
}

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

const CPU_INCLUDE: &[&str] = &[
    "cpu", "cpullc", "qmx", "apss", "tsens", "soc", "cluster", "big", "little", "gold", "prime",
    "qcom", "msm", "sdm",
];
const EXCLUDE: &[&str] = &["battery", "skin", "usb", "charger", "pmic"];
const HWMON_PREFERRED: &[&str] = &["tsens", "cpu", "soc", "apss", "qcom", "msm", "sdm"];

fn contains_any(s: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| s.contains(n))
}

fn admit_all(_: &str) -> bool {
    true
}

fn cpu_admit(t: &str) -> bool {
    !contains_any(t, EXCLUDE) && !t.contains("hw-trip") && contains_any(t, CPU_INCLUDE)
}

fn is_cpu(t: &str) -> bool {
    contains_any(t, &["cpu", "cpullc", "qmx"])
}

fn is_apss(t: &str) -> bool {
    contains_any(t, &["apss", "tsens"])
}

fn is_soc(t: &str) -> bool {
    t.contains("soc")
}

fn is_gpuss(t: &str) -> bool {
    t.starts_with("gpuss")
}

fn is_qmx(t: &str) -> bool {
    t.starts_with("qmx")
}

fn is_hwmon_preferred(t: &str) -> bool {
    !contains_any(t, EXCLUDE) && contains_any(t, HWMON_PREFERRED)
}

/// CPU temperature from thermal zones: dedicated CPU sensors, then the
/// application processor subsystem, then SoC-wide sensors.
pub const CPU_TABLE: CategoryTable = CategoryTable {
    admit: cpu_admit,
    categories: &[
        SensorCategory {
            label: "cpu",
            matches: is_cpu,
        },
        SensorCategory {
            label: "apss",
            matches: is_apss,
        },
        SensorCategory {
            label: "soc",
            matches: is_soc,
        },
    ],
    residual: Some("other"),
};

/// GPU temperature from thermal zones. Unrelated zones are never used.
pub const GPU_TABLE: CategoryTable = CategoryTable {
    admit: admit_all,
    categories: &[
        SensorCategory {
            label: "gpuss",
            matches: is_gpuss,
        },
        SensorCategory {
            label: "qmx",
            matches: is_qmx,
        },
        SensorCategory {
            label: "socd",
            matches: is_soc,
        },
    ],
    residual: None,
};

/// CPU temperature fallback from hwmon chips, keyed by chip name.
pub const HWMON_TABLE: CategoryTable = CategoryTable {
    admit: admit_all,
    categories: &[SensorCategory {
        label: "preferred",
        matches: is_hwmon_preferred,
    }],
    residual: Some("other"),
};
