use time::OffsetDateTime;

/// Import/export tariff for one interval, from the price feed.
/// Prices are per kWh in currency-major units; `None` means the feed did
/// not report that side for this interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub ts: OffsetDateTime,
    pub import_price: Option<f64>,
    pub export_price: Option<f64>,
}

/// Unit the upstream reports prices in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    #[default]
    Cents,
    Dollars,
}

impl PriceUnit {
    /// Converts an upstream price into dollars per kWh.
    pub fn to_major(self, value: f64) -> f64 {
        match self {
            PriceUnit::Cents => value / 100.0,
            PriceUnit::Dollars => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_are_scaled_once() {
        assert_eq!(PriceUnit::Cents.to_major(30.0), 0.30);
        assert_eq!(PriceUnit::Dollars.to_major(0.30), 0.30);
    }
}
