pub mod memory;
pub mod postgres;

pub use memory::MemoryIntervalStore;
pub use postgres::{rebuild_daily_usage, PostgresIntervalStore};
