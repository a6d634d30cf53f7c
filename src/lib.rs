pub mod availability;
pub mod compactor;
pub mod config;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod repository;
pub mod segment;
pub mod wal;
