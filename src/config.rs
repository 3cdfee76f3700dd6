//! Configuration constants for the loader
//!
//! This module centralizes the tunable parameters and fixed names used
//! throughout the application.

/// Default port for the warehouse endpoint.
///
/// Redshift clusters listen on 5439 unless reconfigured; the CLI exposes an
/// override for non-standard deployments.
pub const DEFAULT_WAREHOUSE_PORT: u16 = 5439;

/// Name prefix for transient staging tables created during dedup loads.
///
/// A fresh UUID suffix (lowercase hex) is appended per load call, so the
/// resulting identifier is machine-safe and needs no quoting.
pub const STAGING_TABLE_PREFIX: &str = "redshift_loader_staging_";

/// Default tracing filter directive for normal runs.
pub const LOG_DIRECTIVE: &str = "redshift_loader=info,sqlx=off";

/// Tracing filter directive for quiet runs (warnings only).
pub const QUIET_LOG_DIRECTIVE: &str = "redshift_loader=warn,sqlx=off";
