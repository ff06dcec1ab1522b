pub mod channel;
pub mod interval;
pub mod price;
pub mod zone;

pub use channel::{ChannelKind, ChannelReading};
pub use interval::Interval;
pub use price::{PricePoint, PriceUnit};
pub use zone::{SiteZone, UnknownZone};
