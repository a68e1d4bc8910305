pub mod agents;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod ingest;
pub mod insight;
pub mod lifecycle;
pub mod pipeline;
pub mod remediation;
pub mod store;
pub mod terminal;
pub mod trend;
pub mod wire;
pub mod work;
