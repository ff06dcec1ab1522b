pub mod interval_queries;

pub use interval_queries::{daily_usage, load_intervals, DailyUsage};
