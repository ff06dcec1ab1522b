use serde_json::Value;
use usage_client::domain::{ChannelKind, ChannelReading, PriceUnit, SiteZone};

use super::{
    timestamp::{record_timestamp, TimestampError},
    RawRecord,
};

/// Candidate quantity keys, oldest upstream spelling first.
pub const QUANTITY_KEYS: [&str; 4] = ["kwh", "usageKwh", "quantity", "energy"];

/// Candidate per-kWh price keys.
pub const PRICE_KEYS: [&str; 4] = ["spotPerKwh", "perKwh", "per_kwh", "price"];

/// First candidate key holding a usable number. JSON numbers and numeric
/// strings both count; null and unparsable values are skipped.
pub fn first_number(record: &RawRecord, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(as_number)
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Turns upstream usage records into fixed-shape [`ChannelReading`]s.
#[derive(Debug, Clone, Copy)]
pub struct ChannelReader {
    zone: SiteZone,
    price_unit: PriceUnit,
}

impl ChannelReader {
    pub fn new(zone: SiteZone, price_unit: PriceUnit) -> Self {
        Self { zone, price_unit }
    }

    /// Reads one record. Missing quantity or price read as zero; only an
    /// unusable timestamp rejects the record.
    pub fn read(&self, record: &RawRecord) -> Result<ChannelReading, TimestampError> {
        let ts = record_timestamp(record, self.zone)?;
        let energy_kwh = first_number(record, &QUANTITY_KEYS).unwrap_or(0.0);
        let price_per_kwh = first_number(record, &PRICE_KEYS)
            .map(|p| self.price_unit.to_major(p))
            .unwrap_or(0.0);

        Ok(ChannelReading {
            ts,
            energy_kwh,
            price_per_kwh,
        })
    }

    /// Reads a batch, skipping (and counting) records without a usable
    /// timestamp.
    pub fn read_all<'a, I>(&self, records: I, kind: ChannelKind) -> Vec<ChannelReading>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        records
            .into_iter()
            .filter_map(|record| match self.read(record) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    tracing::warn!(channel = %kind, error = %e, "skipping usage record");
                    metrics::counter!("usage_records_skipped_total", "channel" => kind.as_str()).increment(1);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn reader() -> ChannelReader {
        ChannelReader::new(SiteZone::default(), PriceUnit::Cents)
    }

    #[test]
    fn reads_current_upstream_shape_and_converts_cents() {
        let r = record(json!({
            "type": "Usage",
            "channelType": "general",
            "startTime": "2025-10-17T02:00:01Z",
            "nemTime": "2025-10-17T13:30:00+11:00",
            "kwh": 0.42,
            "perKwh": 31.5,
            "spotPerKwh": 8.2,
        }));

        let reading = reader().read(&r).unwrap();
        assert_eq!(reading.ts, datetime!(2025-10-17 02:00:01 UTC));
        assert_eq!(reading.energy_kwh, 0.42);
        // spotPerKwh outranks perKwh.
        assert!((reading.price_per_kwh - 0.082).abs() < 1e-12);
    }

    #[test]
    fn falls_back_through_candidate_keys() {
        let r = record(json!({
            "date": "2025-10-17T10:00:00",
            "kwh": null,
            "usageKwh": null,
            "quantity": "1.25",
            "spotPerKwh": null,
            "per_kwh": 20,
        }));

        let reading = reader().read(&r).unwrap();
        assert_eq!(reading.energy_kwh, 1.25);
        assert!((reading.price_per_kwh - 0.20).abs() < 1e-12);
    }

    #[test]
    fn unparsable_candidate_is_treated_as_absent() {
        let r = record(json!({ "ts": "2025-10-17T10:00:00", "kwh": "n/a", "energy": 0.5 }));
        assert_eq!(reader().read(&r).unwrap().energy_kwh, 0.5);
    }

    #[test]
    fn missing_quantity_and_price_default_to_zero() {
        let r = record(json!({ "startTime": "2025-10-17T02:00:00Z" }));
        let reading = reader().read(&r).unwrap();
        assert_eq!(reading.energy_kwh, 0.0);
        assert_eq!(reading.price_per_kwh, 0.0);
    }

    #[test]
    fn dollar_prices_are_not_rescaled() {
        let dollars = ChannelReader::new(SiteZone::default(), PriceUnit::Dollars);
        let r = record(json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 1.0, "price": 0.27 }));
        assert_eq!(dollars.read(&r).unwrap().price_per_kwh, 0.27);
    }

    #[test]
    fn read_all_skips_bad_timestamps_without_failing_the_batch() {
        let records = vec![
            record(json!({ "startTime": "2025-10-17T02:00:00Z", "kwh": 1.0 })),
            record(json!({ "startTime": "not a time", "kwh": 9.0 })),
            record(json!({ "kwh": 9.0 })),
            record(json!({ "startTime": "2025-10-17T02:30:00Z", "kwh": 2.0 })),
        ];

        let readings = reader().read_all(&records, ChannelKind::General);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings.iter().map(|r| r.energy_kwh).sum::<f64>(), 3.0);
    }
}
