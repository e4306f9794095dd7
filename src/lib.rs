pub mod compactor;
pub mod config;
pub mod directory;
pub mod engine;
pub mod limits;
pub mod locks;
pub mod model;
pub mod observability;
pub mod store;
pub mod wal;
