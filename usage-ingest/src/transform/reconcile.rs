use std::collections::BTreeMap;

use time::OffsetDateTime;
use usage_client::domain::{ChannelKind, ChannelReading};

/// Readings grouped by the channel they were fetched from.
pub type ChannelReadings = BTreeMap<ChannelKind, Vec<ChannelReading>>;

/// Grid exchange for one interval. At most one side is non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GridExchange {
    pub import_kwh: f64,
    pub export_kwh: f64,
}

impl GridExchange {
    /// Splits signed net exchange (positive = drawn from the grid) into a
    /// single-sided import or export.
    pub fn from_net(net: f64) -> Self {
        if net > 0.0 {
            Self {
                import_kwh: net,
                export_kwh: 0.0,
            }
        } else if net < 0.0 {
            Self {
                import_kwh: 0.0,
                export_kwh: -net,
            }
        } else {
            Self::default()
        }
    }
}

/// Net grid exchange per timestamp:
/// `general + battery_charge - battery_discharge - feed_in`.
///
/// Every timestamp seen on any channel is present in the output; a channel
/// without a reading at that timestamp contributes zero. Repeated readings
/// of one channel at one timestamp are summed.
pub fn net_exchange(readings: &ChannelReadings) -> BTreeMap<OffsetDateTime, f64> {
    let mut net: BTreeMap<OffsetDateTime, f64> = BTreeMap::new();
    for (kind, channel) in readings {
        let sign = kind.grid_sign();
        for reading in channel {
            *net.entry(reading.ts).or_insert(0.0) += sign * reading.energy_kwh;
        }
    }
    net
}

pub fn reconcile(readings: &ChannelReadings) -> BTreeMap<OffsetDateTime, GridExchange> {
    net_exchange(readings)
        .into_iter()
        .map(|(ts, net)| (ts, GridExchange::from_net(net)))
        .collect()
}
