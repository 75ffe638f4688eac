pub mod connection;
pub mod coordination;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, DbPool};
pub use coordination::{SqlRateCounterStore, SqlSyncLockStore};
