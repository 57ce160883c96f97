pub mod clock;
pub mod compactor;
pub mod config;
pub mod console;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod registry;
pub mod store;
pub mod wal;
