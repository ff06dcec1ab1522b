use std::{fmt, str::FromStr};

use time::OffsetDateTime;

/// Logical energy-flow category reported by the retailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Grid import.
    General,
    /// Grid export.
    #[serde(alias = "feedIn")]
    FeedIn,
    /// Energy drawn to charge storage.
    #[serde(alias = "batteryCharge")]
    BatteryCharge,
    /// Energy released from storage.
    #[serde(alias = "batteryDischarge")]
    BatteryDischarge,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::General,
        ChannelKind::FeedIn,
        ChannelKind::BatteryCharge,
        ChannelKind::BatteryDischarge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::General => "general",
            ChannelKind::FeedIn => "feed_in",
            ChannelKind::BatteryCharge => "battery_charge",
            ChannelKind::BatteryDischarge => "battery_discharge",
        }
    }

    /// Sign of this channel's contribution to net grid exchange.
    pub fn grid_sign(&self) -> f64 {
        match self {
            ChannelKind::General | ChannelKind::BatteryCharge => 1.0,
            ChannelKind::FeedIn | ChannelKind::BatteryDischarge => -1.0,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown channel kind '{0}'")]
pub struct UnknownChannel(pub String);

impl FromStr for ChannelKind {
    type Err = UnknownChannel;

    /// Accepts both the snake_case names and the upstream camelCase spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "general" => Ok(ChannelKind::General),
            "feed_in" | "feedIn" => Ok(ChannelKind::FeedIn),
            "battery_charge" | "batteryCharge" => Ok(ChannelKind::BatteryCharge),
            "battery_discharge" | "batteryDischarge" => Ok(ChannelKind::BatteryDischarge),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}

/// One normalized upstream record for one channel and interval.
///
/// `price_per_kwh` is already in currency-major units.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReading {
    pub ts: OffsetDateTime,
    pub energy_kwh: f64,
    pub price_per_kwh: f64,
}
