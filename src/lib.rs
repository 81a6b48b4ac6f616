pub mod config;
pub mod error;
pub mod extract;
pub mod incremental;
pub mod metrics;
pub mod output;
pub mod partition;
pub mod pipeline;
pub mod record;
