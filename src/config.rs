//! Configuration management for the power limiter
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The limiter reads the configuration as an
//! immutable snapshot (`Arc<Config>`) at the start of every tick; writers
//! replace the whole snapshot instead of mutating it in place.

use crate::error::{LimiterError, Result};
use crate::sources::InverterId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dynamic power limiter settings
    pub power_limiter: PowerLimiterConfig,

    /// Battery interface (BMS) settings
    pub battery: BatteryConfig,

    /// Solar charge controller (VE.Direct) settings
    pub solar_charger: SolarChargerConfig,

    /// Grid power meter settings
    pub power_meter: PowerMeterConfig,

    /// Inverters known to this gateway
    pub inverters: Vec<InverterConfig>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Scheduler tick interval in milliseconds
    pub poll_interval_ms: u64,

    /// Timezone used for the daily inverter restart
    pub timezone: String,

    /// Simulated site used when no hardware is attached
    pub simulation: SimulationConfig,
}

/// How the battery may be drained while solar passthrough is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryDrainStrategy {
    /// Discharge the battery when there is no usable solar power
    EmptyAtNight,
    /// Discharge the battery at any time once the start threshold was reached
    EmptyWhenFull,
}

/// Dynamic power limiter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerLimiterConfig {
    /// Master switch
    pub enabled: bool,

    /// Log calculation details on every cycle
    pub verbose_logging: bool,

    /// Pass solar charge controller power through to the inverter
    pub solar_passthrough_enabled: bool,

    /// Losses between charge controller and inverter, in percent
    pub solar_passthrough_losses: u8,

    pub battery_drain_strategy: BatteryDrainStrategy,

    /// The meter measures the inverter output too, so it must be added back
    pub is_inverter_behind_power_meter: bool,

    /// Serial of the governed inverter
    pub inverter_id: InverterId,

    /// DC channel whose voltage is used for battery thresholds
    pub inverter_channel_id: u8,

    /// Grid import (W) deliberately left uncompensated
    pub target_power_consumption: i32,

    /// Minimum limit change (W) before a new limit is sent
    pub target_power_consumption_hysteresis: i32,

    /// Limits below this value (W) shut the inverter down
    pub lower_power_limit: i32,

    /// Limits are capped at this value (W)
    pub upper_power_limit: i32,

    pub battery_soc_start_threshold: f32,
    pub battery_soc_stop_threshold: f32,

    pub voltage_start_threshold: f32,
    pub voltage_stop_threshold: f32,

    /// Volts added per watt of AC output to compensate battery voltage sag
    pub voltage_load_correction_factor: f32,

    /// Hour of the daily inverter restart, -1 disables it
    pub restart_hour: i8,

    pub full_solar_passthrough_soc: f32,
    pub full_solar_passthrough_start_voltage: f32,
    pub full_solar_passthrough_stop_voltage: f32,

    /// Efficiency assumed while the inverter reports none (fraction, 0..1]
    pub inverter_efficiency_fallback: f32,
}

/// Battery interface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub enabled: bool,
}

/// Solar charge controller settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarChargerConfig {
    pub enabled: bool,
}

/// Power meter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerMeterConfig {
    pub enabled: bool,
}

/// A known inverter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterConfig {
    /// Radio serial number
    pub serial: InverterId,

    /// Display name
    pub name: String,

    /// Nameplate AC power in watts
    pub max_power: u16,

    /// Number of DC inputs
    pub dc_channels: u8,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Console level override
    pub console_level: Option<String>,

    /// File level override
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Simulated site parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,

    /// Base household consumption in watts
    pub household_load_w: f32,

    /// Amplitude of the periodic load ripple in watts
    pub load_ripple_w: f32,

    /// Period of the load ripple in seconds
    pub load_ripple_period_s: f32,

    /// Peak solar charge power at noon in watts
    pub solar_peak_w: f32,

    pub battery_capacity_wh: f32,
    pub battery_initial_soc: f32,

    /// Battery voltage at 0 % and 100 % state of charge
    pub battery_empty_voltage: f32,
    pub battery_full_voltage: f32,

    /// Time the simulated inverter needs to acknowledge a command
    pub command_latency_ms: u64,

    /// Interval of inverter statistics refreshes
    pub stats_interval_ms: u64,

    /// Interval of power meter readings
    pub meter_interval_ms: u64,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "powerlimiter.yaml",
            "/data/powerlimiter.yaml",
            "/etc/powerlimiter/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Load from an explicit path if one was given, otherwise search defaults
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(LimiterError::config(format!(
                        "Configuration file not found: {}",
                        p.display()
                    )));
                }
                Self::from_file(p)
            }
            None => Self::load(),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone for local time calculations
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        Ok(self.timezone.parse::<chrono_tz::Tz>()?)
    }

    /// Look up a known inverter by serial
    pub fn inverter(&self, id: InverterId) -> Option<&InverterConfig> {
        self.inverters.iter().find(|inv| inv.serial == id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let pl = &self.power_limiter;

        if pl.lower_power_limit < 0 {
            return Err(LimiterError::validation(
                "power_limiter.lower_power_limit",
                "Must not be negative",
            ));
        }

        if pl.upper_power_limit < pl.lower_power_limit {
            return Err(LimiterError::validation(
                "power_limiter.upper_power_limit",
                "Must not be below the lower power limit",
            ));
        }

        if pl.target_power_consumption_hysteresis < 0 {
            return Err(LimiterError::validation(
                "power_limiter.target_power_consumption_hysteresis",
                "Must not be negative",
            ));
        }

        if !(-1..=23).contains(&pl.restart_hour) {
            return Err(LimiterError::validation(
                "power_limiter.restart_hour",
                "Must be -1 (disabled) or an hour between 0 and 23",
            ));
        }

        for (field, value) in [
            ("power_limiter.battery_soc_start_threshold", pl.battery_soc_start_threshold),
            ("power_limiter.battery_soc_stop_threshold", pl.battery_soc_stop_threshold),
            ("power_limiter.full_solar_passthrough_soc", pl.full_solar_passthrough_soc),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(LimiterError::validation(field, "Must be between 0 and 100"));
            }
        }

        if pl.solar_passthrough_losses > 100 {
            return Err(LimiterError::validation(
                "power_limiter.solar_passthrough_losses",
                "Must not exceed 100 percent",
            ));
        }

        if !(pl.inverter_efficiency_fallback > 0.0 && pl.inverter_efficiency_fallback <= 1.0) {
            return Err(LimiterError::validation(
                "power_limiter.inverter_efficiency_fallback",
                "Must be a fraction in (0, 1]",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(LimiterError::validation(
                "poll_interval_ms",
                "Must be greater than 0",
            ));
        }

        self.tz()?;

        Ok(())
    }
}
