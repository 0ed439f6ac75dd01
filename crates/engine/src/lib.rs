//! `takrar-engine`: beneficiary dedup and clustering engine.
//!
//! Pure engine crate: receives pre-loaded records, returns clusters of at
//! most four records plus audit findings. No CLI or file-IO dependencies;
//! CSV decoding operates on in-memory strings only.

pub mod audit;
pub mod block;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod model;
pub mod normalize;
pub mod score;
pub mod similarity;
pub mod split;

pub use config::DedupeConfig;
pub use engine::{load_csv_records, run};
pub use error::EngineError;
pub use messages::{EngineInput, EngineMessage};
pub use model::{Cluster, DedupeResult, Finding, Record};
