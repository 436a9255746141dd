pub mod config;
pub mod dag;
pub mod errors;
pub mod metrics;
pub mod orchestrator;
pub mod planner;
pub mod repair;
pub mod telemetry;
pub mod tools;
pub mod ui;
pub mod verifier;
