pub mod cli;
pub mod config;
pub mod harness;
pub mod metrics;
pub mod models;
pub mod report;
pub mod services;
pub mod state;
