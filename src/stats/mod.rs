//! Statistics for the fanout core and its connections

pub mod metrics;

pub use metrics::{QualityCounters, QualityStats, RegistryStats, SessionStats, StreamStats};
