//! Contracts of the collaborators the power limiter reads from and commands
//!
//! Every reading is a snapshot kept current by some other task (radio
//! poller, meter driver, BMS or VE.Direct reader). The limiter never waits on
//! them: it reads whatever is there on each tick and looks at the attached
//! timestamps to decide whether a value is fresh enough.
//!
//! Timestamps are milliseconds on the limiter's [`crate::clock::Clock`]; 0
//! means "never".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod memory;

/// Radio serial number of an inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InverterId(pub u64);

impl fmt::Display for InverterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

/// Channel groups reported by an inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Ac,
    Dc,
    Inv,
}

/// Statistic fields of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelField {
    /// DC voltage (V)
    Udc,
    /// DC current (A)
    Idc,
    /// DC power (W)
    Pdc,
    /// AC power (W)
    Pac,
    /// Conversion efficiency (percent)
    Eff,
}

/// Outcome of the most recent asynchronous inverter command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Success,
    Failure,
    Pending,
}

/// How an active power limit is to be interpreted by the inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerLimitControlType {
    AbsoluteNonPersistent,
    RelativeNonPersistent,
    AbsolutePersistent,
    RelativePersistent,
}

/// Grid power meter
pub trait PowerMeter: Send + Sync {
    /// Signed grid power in watts, positive while importing
    fn power_total(&self) -> f32;

    fn last_update(&self) -> u64;
}

/// Battery management system
pub trait Battery: Send + Sync {
    /// State of charge in percent
    fn state_of_charge(&self) -> f32;

    fn state_of_charge_last_update(&self) -> u64;

    /// Discharge current the BMS currently allows (A)
    fn discharge_current_limit(&self) -> f32;
}

/// MPPT solar charge controller (VE.Direct)
pub trait SolarCharger: Send + Sync {
    fn is_data_valid(&self) -> bool;

    /// Output voltage towards the battery (V)
    fn output_voltage(&self) -> f32;

    /// Output current towards the battery (A)
    fn output_current(&self) -> f32;

    /// Panel power (W)
    fn panel_power(&self) -> f32;
}

/// Handle of a single inverter
///
/// Command requests are fire-and-forget: they return whether the request was
/// queued and their outcome shows up later through the `last_*_command`
/// accessors.
pub trait Inverter: Send + Sync {
    fn id(&self) -> InverterId;

    fn is_reachable(&self) -> bool;

    fn is_producing(&self) -> bool;

    /// Whether the user allows sending commands to this inverter
    fn enable_commands(&self) -> bool;

    /// Nameplate AC power in watts, 0 while unknown
    fn max_power(&self) -> u16;

    fn channel_field_value(&self, channel_type: ChannelType, channel: u8, field: ChannelField)
    -> f32;

    fn channels(&self, channel_type: ChannelType) -> Vec<u8>;

    /// Time the last statistics frame was received
    fn statistics_last_update(&self) -> u64;

    fn last_limit_command(&self) -> CommandStatus;

    fn last_limit_command_update(&self) -> u64;

    fn last_power_command(&self) -> CommandStatus;

    fn last_power_command_update(&self) -> u64;

    fn send_active_power_control_request(&self, limit: f32, control: PowerLimitControlType)
    -> bool;

    fn send_power_control_request(&self, turn_on: bool) -> bool;

    fn send_restart_control_request(&self) -> bool;
}

/// Lookup of inverters by serial
pub trait InverterRegistry: Send + Sync {
    fn inverter_by_serial(&self, id: InverterId) -> Option<Arc<dyn Inverter>>;
}
