//! Thermal zone and hwmon sensor discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::arbitration::SensorReading;
use crate::collector::traits::FileSystem;

/// A thermal zone with a known type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThermalZone {
    /// Directory name, e.g. `thermal_zone3`.
    pub name: String,
    /// Sensor type from the zone's `type` file.
    pub kind: String,
    pub temp_path: PathBuf,
}

/// Lists `class/thermal/thermal_zone*` entries whose `type` is readable.
pub fn discover_zones<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Vec<ThermalZone> {
    let base = sys_root.join("class/thermal");
    let zones: Vec<ThermalZone> = fs
        .entry_names(&base)
        .into_iter()
        .filter(|name| name.starts_with("thermal_zone"))
        .filter_map(|name| {
            let dir = base.join(&name);
            let kind = fs.read_first_line(&dir.join("type"))?;
            Some(ThermalZone {
                name,
                kind,
                temp_path: dir.join("temp"),
            })
        })
        .collect();
    debug!(count = zones.len(), "discovered thermal zones");
    zones
}

/// Reads the current temperature of each zone.
///
/// Zones that are unreadable or report an unusable raw value are skipped.
pub fn read_zones<F: FileSystem + ?Sized>(fs: &F, zones: &[ThermalZone]) -> Vec<SensorReading> {
    zones
        .iter()
        .filter_map(|zone| {
            let raw = fs.read_int(&zone.temp_path)?;
            SensorReading::new(zone.kind.clone(), zone.name.clone(), raw)
        })
        .collect()
}

/// Reads every `temp*_input` of every `class/hwmon/hwmon*` chip.
///
/// The reading's category is the chip's `name` (directory name when
/// missing); the source label is `<chip>/<input>`.
pub fn read_hwmon<F: FileSystem + ?Sized>(fs: &F, sys_root: &Path) -> Vec<SensorReading> {
    let base = sys_root.join("class/hwmon");
    let mut readings = Vec::new();

    for chip in fs.entry_names(&base) {
        if !chip.starts_with("hwmon") {
            continue;
        }
        let dir = base.join(&chip);
        let name = fs.read_first_line(&dir.join("name")).unwrap_or_else(|| chip.clone());

        for input in fs.entry_names(&dir) {
            if !(input.starts_with("temp") && input.ends_with("_input")) {
                continue;
            }
            let Some(raw) = fs.read_int(&dir.join(&input)) else {
                continue;
            };
            if let Some(reading) = SensorReading::new(name.clone(), format!("{}/{}", name, input), raw) {
                readings.push(reading);
            }
        }
    }

    readings
}
