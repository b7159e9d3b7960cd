// API types - configuration shared by the loader, poller and network gate

pub mod config;

pub use config::{LoaderConfig, NetworkConfig, PollConfig, SuiteConfig};
