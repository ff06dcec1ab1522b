use std::collections::BTreeMap;

use crate::domain::Interval;

/// Summed usage and cost over a calendar bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct UsageTotals {
    pub import_kwh: f64,
    pub export_kwh: f64,
    pub cost: f64,
}

impl UsageTotals {
    fn add(&mut self, it: &Interval) {
        self.import_kwh += it.import_kwh;
        self.export_kwh += it.export_kwh;
        self.cost += it.cost;
    }
}

/// Calendar roll-ups keyed `YYYY-MM-DD`, `YYYY-MM`, `YYYY-Qn` and `YYYY`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct UsageSummary {
    pub daily: BTreeMap<String, UsageTotals>,
    pub monthly: BTreeMap<String, UsageTotals>,
    pub quarterly: BTreeMap<String, UsageTotals>,
    pub yearly: BTreeMap<String, UsageTotals>,
}

/// Buckets intervals by the calendar date of their own (site-local) offset.
pub fn summarize<'a, I>(intervals: I) -> UsageSummary
where
    I: IntoIterator<Item = &'a Interval>,
{
    let mut summary = UsageSummary::default();

    for it in intervals {
        let year = it.ts.year();
        let month = u8::from(it.ts.month());
        let quarter = (month - 1) / 3 + 1;

        let keys = [
            (&mut summary.daily, format!("{year:04}-{month:02}-{:02}", it.ts.day())),
            (&mut summary.monthly, format!("{year:04}-{month:02}")),
            (&mut summary.quarterly, format!("{year:04}-Q{quarter}")),
            (&mut summary.yearly, format!("{year:04}")),
        ];
        for (bucket, key) in keys {
            bucket.entry(key).or_default().add(it);
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn buckets_by_local_calendar() {
        let intervals = vec![
            Interval::new(datetime!(2025-03-31 23:30 +11), 1.0, 0.0, 0.30, 0.10),
            Interval::new(datetime!(2025-04-01 00:00 +11), 0.5, 0.0, 0.30, 0.10),
            Interval::new(datetime!(2025-04-01 12:00 +11), 0.0, 2.0, 0.30, 0.10),
        ];

        let summary = summarize(&intervals);

        assert_eq!(summary.daily.len(), 2);
        assert!((summary.daily["2025-03-31"].cost - 0.30).abs() < 1e-12);

        let april = summary.monthly["2025-04"];
        assert!((april.import_kwh - 0.5).abs() < 1e-12);
        assert!((april.export_kwh - 2.0).abs() < 1e-12);
        assert!((april.cost - (0.15 - 0.20)).abs() < 1e-12);

        assert!(summary.quarterly.contains_key("2025-Q1"));
        assert!(summary.quarterly.contains_key("2025-Q2"));
        assert!((summary.yearly["2025"].import_kwh - 1.5).abs() < 1e-12);
    }

    #[test]
    fn utc_instants_in_site_offset_land_on_local_day() {
        // 2025-10-16 14:00 UTC is already the 17th in Sydney.
        let ts = datetime!(2025-10-16 14:00 UTC).to_offset(time::macros::offset!(+11));
        let summary = summarize(&[Interval::new(ts, 1.0, 0.0, 0.2, 0.0)]);
        assert!(summary.daily.contains_key("2025-10-17"));
    }
}
