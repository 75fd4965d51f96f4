pub mod api;
pub mod analysis;
pub mod config;
pub mod error;
pub mod graph;
pub mod graphql;
pub mod jobs;
pub mod risk;
pub mod storage;

pub use error::{EngineError, EngineResult};
