use time::OffsetDateTime;

/// One half-hour accounting interval as kept by the interval store.
///
/// `cost` is always derived from the other fields; build rows through
/// [`Interval::new`] so it never drifts from them.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, serde::Serialize, serde::Deserialize)]
pub struct Interval {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub import_price: f64,
    pub export_price: f64,
    pub cost: f64,
}

impl Interval {
    pub fn new(
        ts: OffsetDateTime,
        import_kwh: f64,
        export_kwh: f64,
        import_price: f64,
        export_price: f64,
    ) -> Self {
        Self {
            ts,
            import_kwh,
            export_kwh,
            import_price,
            export_price,
            cost: interval_cost(import_kwh, export_kwh, import_price, export_price),
        }
    }
}

/// Net cost of one interval in currency-major units. Negative means credit.
pub fn interval_cost(import_kwh: f64, export_kwh: f64, import_price: f64, export_price: f64) -> f64 {
    import_kwh * import_price - export_kwh * export_price
}
