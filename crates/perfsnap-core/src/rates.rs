//! Delta-based rate computation over cumulative kernel counters.
//!
//! Counters only grow while the device they describe exists. A decrease
//! means the counter was reset (device re-attached, file re-created,
//! wraparound) and is treated as zero progress, never as a negative rate.

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Counter progress between two observations, clamped at zero.
pub fn clamped_delta(prev: i64, curr: i64) -> i64 {
    curr.saturating_sub(prev).max(0)
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Per-second rate of a counter.
///
/// Computes `max(0, curr - prev) * unit_scale * 1000 / dt_ms` in 128-bit
/// integer arithmetic. Returns `None` when there is no previous value or
/// the elapsed time is not positive.
///
/// # Arguments
/// * `prev` - previous counter value, `None` on the first sample
/// * `curr` - current counter value
/// * `dt_ms` - elapsed monotonic milliseconds between the two values
/// * `unit_scale` - multiplier from counter units to output units (e.g. sector size)
pub fn rate(prev: Option<i64>, curr: i64, dt_ms: i64, unit_scale: i64) -> Option<i64> {
    let prev = prev?;
    if dt_ms <= 0 {
        return None;
    }
    let delta = clamped_delta(prev, curr) as i128;
    let scaled = delta.saturating_mul(unit_scale as i128).saturating_mul(1000);
    Some(saturate(scaled / dt_ms as i128))
}

/// Busy share of an interval, in percent.
///
/// `ΔBusy / ΔTotal * 100` with both deltas clamped at zero. Returns 0 when
/// the total did not advance. The result is always within `[0, 100]`.
pub fn busy_percent(prev_busy: i64, curr_busy: i64, prev_total: i64, curr_total: i64) -> f64 {
    let d_busy = clamped_delta(prev_busy, curr_busy);
    let d_total = clamped_delta(prev_total, curr_total);
    if d_total == 0 {
        return 0.0;
    }
    (d_busy as f64 / d_total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Share of `dt_ms` covered by `delta_ms` of activity, in percent.
///
/// Used for device active time (`io_ticks`). Returns `None` for a
/// non-positive interval.
pub fn interval_percent(delta_ms: i64, dt_ms: i64) -> Option<f64> {
    if dt_ms <= 0 {
        return None;
    }
    Some((delta_ms.max(0) as f64 * 100.0 / dt_ms as f64).clamp(0.0, 100.0))
}

/// Mean time per completed operation, in milliseconds.
///
/// Returns 0 when no operation completed in the interval.
pub fn average_per_op(delta_time_ms: i64, delta_ops: i64) -> f64 {
    if delta_ops <= 0 {
        return 0.0;
    }
    delta_time_ms.max(0) as f64 / delta_ops as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_has_no_rate() {
        assert_eq!(rate(None, 3000, 1000, 512), None);
        assert_eq!(rate(None, 0, 1000, 1), None);
    }

    #[test]
    fn test_counter_reset_clamps_to_zero() {
        assert_eq!(rate(Some(100), 80, 1000, 1), Some(0));
        assert_eq!(rate(Some(i64::MAX), i64::MIN, 1000, 512), Some(0));
        assert_eq!(clamped_delta(100, 80), 0);
    }

    #[test]
    fn test_disk_read_rate() {
        assert_eq!(rate(Some(1000), 3000, 1000, 512), Some(1_024_000));
        assert_eq!(rate(Some(0), 1500, 500, 1), Some(3000));
    }

    #[test]
    fn test_zero_or_negative_interval_has_no_rate() {
        assert_eq!(rate(Some(1000), 3000, 0, 512), None);
        assert_eq!(rate(Some(1000), 3000, -5, 512), None);
        assert_eq!(interval_percent(10, 0), None);
    }

    #[test]
    fn test_rate_saturates() {
        assert_eq!(rate(Some(0), i64::MAX, 1, 4096), Some(i64::MAX));
    }

    #[test]
    fn test_busy_percent_bounds() {
        assert_eq!(busy_percent(0, 50, 0, 100), 50.0);
        assert_eq!(busy_percent(0, 0, 100, 100), 0.0);
        // busy grew faster than total
        assert_eq!(busy_percent(0, 500, 0, 100), 100.0);
        // regressions clamp
        assert_eq!(busy_percent(500, 0, 0, 100), 0.0);
        assert_eq!(busy_percent(0, 50, 100, 0), 0.0);

        for prev_busy in [0i64, 7, 1_000_000] {
            for busy_growth in [0i64, 1, 99, 100, 250, 10_000] {
                for total_growth in [0i64, 1, 100, 9_999] {
                    let pct = busy_percent(prev_busy, prev_busy + busy_growth, 42, 42 + total_growth);
                    assert!((0.0..=100.0).contains(&pct), "{} out of range", pct);
                }
            }
        }
    }

    #[test]
    fn test_interval_percent_and_average() {
        assert_eq!(interval_percent(250, 1000), Some(25.0));
        assert_eq!(interval_percent(1500, 1000), Some(100.0));
        assert_eq!(interval_percent(-3, 1000), Some(0.0));
        assert_eq!(average_per_op(1200, 400), 3.0);
        assert_eq!(average_per_op(1200, 0), 0.0);
    }
}
