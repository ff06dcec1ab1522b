use std::collections::BTreeMap;

use serde_json::Value;
use time::OffsetDateTime;
use usage_client::domain::{ChannelKind, PricePoint, PriceUnit, SiteZone};

use super::{
    channel::{first_number, PRICE_KEYS},
    timestamp::record_timestamp,
    RawRecord,
};

const IMPORT_PRICE_KEYS: [&str; 2] = ["importPrice", "import_price"];
const EXPORT_PRICE_KEYS: [&str; 2] = ["exportPrice", "export_price"];
const CHANNEL_TYPE_KEYS: [&str; 2] = ["channelType", "channel"];

/// Import/export price pair for one interval, in currency-major units.
/// A side is `None` when no feed record reported it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tariff {
    pub import_price: Option<f64>,
    pub export_price: Option<f64>,
}

impl Tariff {
    /// Sides this tariff reports replace the matching sides of `self`.
    fn overlay(&mut self, other: Tariff) {
        if other.import_price.is_some() {
            self.import_price = other.import_price;
        }
        if other.export_price.is_some() {
            self.export_price = other.export_price;
        }
    }
}

/// Timestamp → tariff lookup. A later point for the same instant replaces
/// the sides it reports; the other side is kept.
pub fn index<I>(points: I) -> BTreeMap<OffsetDateTime, Tariff>
where
    I: IntoIterator<Item = PricePoint>,
{
    let mut tariffs: BTreeMap<OffsetDateTime, Tariff> = BTreeMap::new();
    for p in points {
        tariffs.entry(p.ts).or_default().overlay(Tariff {
            import_price: p.import_price,
            export_price: p.export_price,
        });
    }
    tariffs
}

/// Reads the price feed into [`PricePoint`]s.
///
/// Records either carry both sides (`importPrice`/`exportPrice`) or are
/// tagged with a `channelType` and carry one side under the usual price
/// keys. Tagged records are folded per timestamp; a side nobody reported
/// stays `None` so a usage record's own price can still fill it.
#[derive(Debug, Clone, Copy)]
pub struct PriceFeedReader {
    zone: SiteZone,
    price_unit: PriceUnit,
}

impl PriceFeedReader {
    pub fn new(zone: SiteZone, price_unit: PriceUnit) -> Self {
        Self { zone, price_unit }
    }

    pub fn read_all<'a, I>(&self, records: I) -> Vec<PricePoint>
    where
        I: IntoIterator<Item = &'a RawRecord>,
    {
        let mut folded: BTreeMap<OffsetDateTime, Tariff> = BTreeMap::new();

        for record in records {
            let ts = match record_timestamp(record, self.zone) {
                Ok(ts) => ts,
                Err(e) => {
                    discard("timestamp", &e.to_string());
                    continue;
                }
            };

            let Some(sides) = self.sides(record) else {
                discard("shape", "no recognizable price field");
                continue;
            };

            folded.entry(ts).or_default().overlay(sides);
        }

        folded
            .into_iter()
            .map(|(ts, t)| PricePoint {
                ts,
                import_price: t.import_price,
                export_price: t.export_price,
            })
            .collect()
    }

    fn sides(&self, record: &RawRecord) -> Option<Tariff> {
        let to_major = |p: f64| self.price_unit.to_major(p);

        let combined = Tariff {
            import_price: first_number(record, &IMPORT_PRICE_KEYS).map(to_major),
            export_price: first_number(record, &EXPORT_PRICE_KEYS).map(to_major),
        };
        if combined != Tariff::default() {
            return Some(combined);
        }

        let kind = CHANNEL_TYPE_KEYS
            .iter()
            .filter_map(|key| record.get(*key))
            .find_map(Value::as_str)?
            .parse::<ChannelKind>()
            .ok()?;
        let price = first_number(record, &PRICE_KEYS).map(to_major)?;

        match kind {
            ChannelKind::General => Some(Tariff {
                import_price: Some(price),
                export_price: None,
            }),
            ChannelKind::FeedIn => Some(Tariff {
                import_price: None,
                export_price: Some(price),
            }),
            ChannelKind::BatteryCharge | ChannelKind::BatteryDischarge => None,
        }
    }
}

fn discard(reason: &'static str, detail: &str) {
    tracing::warn!(reason, detail, "discarding price point");
    metrics::counter!("price_points_discarded_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn records(values: Vec<Value>) -> Vec<RawRecord> {
        values.into_iter().filter_map(|v| v.as_object().cloned()).collect()
    }

    fn reader() -> PriceFeedReader {
        PriceFeedReader::new(SiteZone::default(), PriceUnit::Cents)
    }

    #[test]
    fn folds_channel_tagged_records_per_interval() {
        let feed = records(vec![
            json!({ "channelType": "general", "startTime": "2025-10-17T02:00:01Z", "perKwh": 30.0 }),
            json!({ "channelType": "feedIn", "startTime": "2025-10-17T02:00:01Z", "perKwh": 10.0 }),
            json!({ "channelType": "general", "startTime": "2025-10-17T02:30:01Z", "perKwh": 28.0 }),
        ]);

        let points = reader().read_all(&feed);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].ts, datetime!(2025-10-17 13:00:01 +11));
        assert!((points[0].import_price.unwrap() - 0.30).abs() < 1e-12);
        assert!((points[0].export_price.unwrap() - 0.10).abs() < 1e-12);
        // Nobody reported a feed-in price for the second interval.
        assert_eq!(points[1].export_price, None);
    }

    #[test]
    fn reads_combined_records() {
        let feed = records(vec![json!({
            "timestamp": "2025-10-17T13:00:00+11:00",
            "importPrice": "25.5",
            "exportPrice": 6,
        })]);

        let points = reader().read_all(&feed);
        assert_eq!(points.len(), 1);
        assert!((points[0].import_price.unwrap() - 0.255).abs() < 1e-12);
        assert!((points[0].export_price.unwrap() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn discards_unusable_records() {
        let feed = records(vec![
            json!({ "channelType": "general", "startTime": "garbage", "perKwh": 30.0 }),
            json!({ "channelType": "controlledLoad", "startTime": "2025-10-17T02:00:00Z", "perKwh": 15.0 }),
            json!({ "startTime": "2025-10-17T02:00:00Z", "perKwh": 15.0 }),
            json!({ "channelType": "general", "startTime": "2025-10-17T02:00:00Z" }),
        ]);

        assert!(reader().read_all(&feed).is_empty());
    }

    #[test]
    fn index_keeps_the_last_point_per_instant() {
        let t = datetime!(2025-10-17 13:00 +11);
        let tariffs = index(vec![
            PricePoint { ts: t, import_price: Some(0.30), export_price: Some(0.10) },
            PricePoint { ts: t, import_price: Some(0.35), export_price: None },
        ]);

        assert_eq!(tariffs.len(), 1);
        assert_eq!(tariffs[&t], Tariff { import_price: Some(0.35), export_price: Some(0.10) });
    }
}
