//! # Powerlimiter - Dynamic Power Limiter for battery-backed inverters
//!
//! Throttles the AC output of a microinverter fed from a battery (and
//! indirectly from a solar charge controller) so that the household draws
//! approximately a configured target power from the grid.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, defaults and validation
//! - `logging`: Structured logging and tracing
//! - `clock`: Monotonic milliseconds and timezone-aware local time
//! - `sources`: Collaborator traits (meter, battery, charger, inverters) and
//!   shared in-memory handles
//! - `limiter`: The control loop, its status machine and command surface
//! - `sim`: A simulated site driving the in-memory handles

pub mod clock;
pub mod config;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod sim;
pub mod sources;

// Re-export commonly used types
pub use config::Config;
pub use error::{LimiterError, Result};
pub use limiter::PowerLimiter;
