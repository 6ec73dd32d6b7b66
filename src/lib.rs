pub mod backtest;
pub mod baseline;
pub mod classifier;
pub mod config;
pub mod detection;
pub mod error;
pub mod generator;
pub mod normalizer;
pub mod source;
pub mod stats;
pub mod tui;
pub mod types;
pub mod views;
pub mod web;

pub use config::EngineConfig;
pub use error::EngineError;
pub use types::{Analysis, Observation, RawTable, SignalCategory};
pub use views::Outcome;
