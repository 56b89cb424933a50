//! Simulation clock in integer nanoseconds.

pub type SimTime = u64;

pub const NANOS_PER_SEC: f64 = 1e9;

pub fn from_secs(seconds: f64) -> SimTime {
    (seconds * NANOS_PER_SEC).round().max(0.0) as SimTime
}

pub fn to_secs(time: SimTime) -> f64 {
    time as f64 / NANOS_PER_SEC
}

/// Time to clock `bytes` onto a link of `rate_bps`.
pub fn transmission_time(bytes: u32, rate_bps: f64) -> SimTime {
    from_secs(bytes as f64 * 8.0 / rate_bps)
}
