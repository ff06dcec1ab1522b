use time::OffsetDateTime;

/// Half-hour interval length in hours.
pub const INTERVAL_HOURS: f64 = 0.5;

const DAYLIGHT_START_HOUR: f64 = 7.0;
const DAYLIGHT_END_HOUR: f64 = 19.0;
const PEAK_HOUR: f64 = 13.0;
const SPREAD_HOURS: f64 = 3.0;

/// Local hour of day as a real number, e.g. 13.5 for 13:30.
pub fn local_hour(ts: OffsetDateTime) -> f64 {
    ts.hour() as f64 + ts.minute() as f64 / 60.0
}

/// Energy (kWh) a `capacity_kw` array yields over one half-hour interval.
///
/// Bell-shaped daylight profile peaking at 13:00 local, zero outside
/// [07:00, 19:00). `ts` must already carry the site offset.
pub fn pv_yield_kwh(ts: OffsetDateTime, capacity_kw: f64) -> f64 {
    let hour = local_hour(ts);
    if capacity_kw <= 0.0 || !(DAYLIGHT_START_HOUR..DAYLIGHT_END_HOUR).contains(&hour) {
        return 0.0;
    }

    let z = (hour - PEAK_HOUR) / SPREAD_HOURS;
    let output_kw = capacity_kw * (-0.5 * z * z).exp();
    (output_kw * INTERVAL_HOURS).max(0.0)
}
