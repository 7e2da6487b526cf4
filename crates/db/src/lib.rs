pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod sweeps;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, RequestSeedInfo};
pub use sweeps::{auto_close, auto_expire, SweepOutcome};
