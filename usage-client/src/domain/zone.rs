use chrono::{NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// IANA timezone of the metered site. All date bucketing happens in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteZone(Tz);

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown timezone '{0}'")]
pub struct UnknownZone(pub String);

impl Default for SiteZone {
    fn default() -> Self {
        Self(chrono_tz::Australia::Sydney)
    }
}

impl SiteZone {
    pub fn from_name(name: &str) -> Result<Self, UnknownZone> {
        name.parse::<Tz>()
            .map(Self)
            .map_err(|_| UnknownZone(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Re-expresses `ts` with the site's UTC offset in effect at that instant.
    pub fn localize(&self, ts: OffsetDateTime) -> OffsetDateTime {
        ts.to_offset(self.offset_at(ts))
    }

    /// Interprets a wall-clock time at the site. Times that fall into a DST
    /// gap have no instant and yield `None`; ambiguous ones take the earlier.
    pub fn from_local(&self, local: PrimitiveDateTime) -> Option<OffsetDateTime> {
        let naive = NaiveDate::from_ymd_opt(
            local.year(),
            u8::from(local.month()) as u32,
            local.day() as u32,
        )?
        .and_hms_nano_opt(
            local.hour() as u32,
            local.minute() as u32,
            local.second() as u32,
            local.nanosecond(),
        )?;

        let offset_secs = self
            .0
            .from_local_datetime(&naive)
            .earliest()?
            .offset()
            .fix()
            .local_minus_utc();
        let offset = UtcOffset::from_whole_seconds(offset_secs).ok()?;
        Some(local.assume_offset(offset))
    }

    fn offset_at(&self, ts: OffsetDateTime) -> UtcOffset {
        let secs = chrono::DateTime::from_timestamp(ts.unix_timestamp(), 0)
            .map(|utc| {
                self.0
                    .offset_from_utc_datetime(&utc.naive_utc())
                    .fix()
                    .local_minus_utc()
            })
            .unwrap_or(0);
        UtcOffset::from_whole_seconds(secs).unwrap_or(UtcOffset::UTC)
    }
}
