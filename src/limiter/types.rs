use serde::{Deserialize, Serialize};

/// Operator override of the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Normal,
    Disabled,
    UnconditionalFullSolarPassthrough,
}

impl Mode {
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Disabled => 1,
            Self::UnconditionalFullSolarPassthrough => 2,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Disabled),
            2 => Some(Self::UnconditionalFullSolarPassthrough),
            _ => None,
        }
    }
}

/// Why the limiter is, or is not, adjusting the inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Initializing,
    DisabledByConfig,
    DisabledByMqtt,
    PowerMeterDisabled,
    PowerMeterTimeout,
    PowerMeterPending,
    InverterInvalid,
    InverterChanged,
    InverterOffline,
    InverterCommandsDisabled,
    InverterLimitPending,
    InverterPowerCmdPending,
    InverterStatsPending,
    UnconditionalSolarPassthrough,
    NoVeDirect,
    Settling,
    Stable,
    LowerLimitUndercut,
}

/// Coarse state shown in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowerLimiterState {
    Inactive = 0,
    Charging = 1,
    SolarOnly = 2,
    SolarAndBattery = 3,
}

/// Bookkeeping of the daily inverter restart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartSchedule {
    /// Waiting for local time to become available
    #[default]
    Uncalculated,
    Disabled,
    /// Deadline in clock milliseconds
    At(u64),
}

impl RestartSchedule {
    pub const fn deadline(self) -> Option<u64> {
        match self {
            Self::At(at) => Some(at),
            Self::Uncalculated | Self::Disabled => None,
        }
    }
}

/// Externally observable limiter state, published after every tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSnapshot {
    pub timestamp: String,
    pub mode: Mode,
    pub status: Status,
    pub status_text: String,
    pub last_requested_power_limit: i32,
    pub power_limiter_state: u8,
    pub battery_discharge_enabled: bool,
    pub full_solar_passthrough_active: bool,
    /// Discharge current allowed by the BMS (A), absent without a battery interface
    pub battery_discharge_current_limit: Option<f32>,
    pub shutdown_in_progress: bool,
    pub upper_power_limit: i32,
    pub target_power_consumption: i32,
    pub battery_soc_start_threshold: f32,
    pub battery_soc_stop_threshold: f32,
    pub full_solar_passthrough_soc: f32,
    pub voltage_start_threshold: f32,
    pub voltage_stop_threshold: f32,
    pub full_solar_passthrough_start_voltage: f32,
    pub full_solar_passthrough_stop_voltage: f32,
    /// Clock milliseconds of the next scheduled inverter restart
    pub next_inverter_restart_ms: Option<u64>,
    pub calculation_backoff_ms: u64,
}

impl LimiterSnapshot {
    /// Snapshot published before the first tick
    pub fn initial(config: &crate::config::Config) -> Self {
        let pl = &config.power_limiter;
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: Mode::Normal,
            status: Status::Initializing,
            status_text: Status::Initializing.text().to_string(),
            last_requested_power_limit: 0,
            power_limiter_state: PowerLimiterState::Inactive as u8,
            battery_discharge_enabled: false,
            full_solar_passthrough_active: false,
            battery_discharge_current_limit: None,
            shutdown_in_progress: false,
            upper_power_limit: pl.upper_power_limit,
            target_power_consumption: pl.target_power_consumption,
            battery_soc_start_threshold: pl.battery_soc_start_threshold,
            battery_soc_stop_threshold: pl.battery_soc_stop_threshold,
            full_solar_passthrough_soc: pl.full_solar_passthrough_soc,
            voltage_start_threshold: pl.voltage_start_threshold,
            voltage_stop_threshold: pl.voltage_stop_threshold,
            full_solar_passthrough_start_voltage: pl.full_solar_passthrough_start_voltage,
            full_solar_passthrough_stop_voltage: pl.full_solar_passthrough_stop_voltage,
            next_inverter_restart_ms: None,
            calculation_backoff_ms: super::CALCULATION_BACKOFF_DEFAULT_MS,
        }
    }
}
