//! REST API module for external integrations
//!
//! Provides an HTTP API for health probes, metrics scraping and querying
//! NodeObservabilityMachineConfigs.

mod dto;
mod handlers;
mod server;

pub use dto::{ErrorResponse, HealthResponse, MachineConfigListResponse, MachineConfigSummary};
pub use server::{router, run_server};
