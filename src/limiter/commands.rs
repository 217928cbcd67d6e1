use super::PowerLimiter;
use super::types::Mode;
use crate::config::{Config, PowerLimiterConfig};
use crate::error::{LimiterError, Result};
use std::sync::Arc;

/// Commands accepted by the limiter from external components (MQTT, web, ...)
#[derive(Debug, Clone)]
pub enum LimiterCommand {
    SetMode(Mode),
    SetBatterySocStartThreshold(f32),
    SetBatterySocStopThreshold(f32),
    SetFullSolarPassthroughSoc(f32),
    SetVoltageStartThreshold(f32),
    SetVoltageStopThreshold(f32),
    SetFullSolarPassthroughStartVoltage(f32),
    SetFullSolarPassthroughStopVoltage(f32),
    SetUpperPowerLimit(i32),
    SetTargetPowerConsumption(i32),
    /// Swap in a complete new configuration
    ReloadConfig(Arc<Config>),
    RecalculateRestart,
}

impl LimiterCommand {
    /// Parse a textual command as received on `powerlimiter/cmd/<topic>`.
    ///
    /// Every payload is a number; percentages, watts and the mode are
    /// truncated to whole numbers.
    pub fn parse(topic: &str, payload: &str) -> Result<Self> {
        let value: f32 = payload.trim().parse().map_err(|_| {
            LimiterError::command(format!(
                "cannot parse payload of topic '{topic}' as float: {payload}"
            ))
        })?;
        if !value.is_finite() {
            return Err(LimiterError::command(format!(
                "payload of topic '{topic}' is not a finite number: {payload}"
            )));
        }
        let int_value = value as i32;

        let command = match topic {
            "mode" => {
                let mode = u8::try_from(int_value)
                    .ok()
                    .and_then(Mode::from_u8)
                    .ok_or_else(|| {
                        LimiterError::validation("mode", format!("unknown mode {int_value}"))
                    })?;
                Self::SetMode(mode)
            }
            "threshold/soc/start" => Self::SetBatterySocStartThreshold(int_value as f32),
            "threshold/soc/stop" => Self::SetBatterySocStopThreshold(int_value as f32),
            "threshold/soc/full_solar_passthrough" => {
                Self::SetFullSolarPassthroughSoc(int_value as f32)
            }
            "threshold/voltage/start" => Self::SetVoltageStartThreshold(value),
            "threshold/voltage/stop" => Self::SetVoltageStopThreshold(value),
            "threshold/voltage/full_solar_passthrough_start" => {
                Self::SetFullSolarPassthroughStartVoltage(value)
            }
            "threshold/voltage/full_solar_passthrough_stop" => {
                Self::SetFullSolarPassthroughStopVoltage(value)
            }
            "upper_power_limit" => Self::SetUpperPowerLimit(int_value),
            "target_power_consumption" => Self::SetTargetPowerConsumption(int_value),
            _ => {
                return Err(LimiterError::command(format!(
                    "unknown command topic '{topic}'"
                )));
            }
        };
        Ok(command)
    }
}

impl PowerLimiter {
    pub(crate) fn handle_command(&mut self, cmd: LimiterCommand) {
        match cmd {
            LimiterCommand::SetMode(mode) => self.set_mode(mode),
            LimiterCommand::SetBatterySocStartThreshold(v) => {
                self.modify_settings("battery SoC start threshold", |pl| {
                    replace(&mut pl.battery_soc_start_threshold, v)
                });
            }
            LimiterCommand::SetBatterySocStopThreshold(v) => {
                self.modify_settings("battery SoC stop threshold", |pl| {
                    replace(&mut pl.battery_soc_stop_threshold, v)
                });
            }
            LimiterCommand::SetFullSolarPassthroughSoc(v) => {
                self.modify_settings("full solar passthrough SoC", |pl| {
                    replace(&mut pl.full_solar_passthrough_soc, v)
                });
            }
            LimiterCommand::SetVoltageStartThreshold(v) => {
                self.modify_settings("voltage start threshold", |pl| {
                    replace(&mut pl.voltage_start_threshold, v)
                });
            }
            LimiterCommand::SetVoltageStopThreshold(v) => {
                self.modify_settings("voltage stop threshold", |pl| {
                    replace(&mut pl.voltage_stop_threshold, v)
                });
            }
            LimiterCommand::SetFullSolarPassthroughStartVoltage(v) => {
                self.modify_settings("full solar passthrough start voltage", |pl| {
                    replace(&mut pl.full_solar_passthrough_start_voltage, v)
                });
            }
            LimiterCommand::SetFullSolarPassthroughStopVoltage(v) => {
                self.modify_settings("full solar passthrough stop voltage", |pl| {
                    replace(&mut pl.full_solar_passthrough_stop_voltage, v)
                });
            }
            LimiterCommand::SetUpperPowerLimit(v) => {
                self.modify_settings("upper power limit", |pl| {
                    replace(&mut pl.upper_power_limit, v)
                });
            }
            LimiterCommand::SetTargetPowerConsumption(v) => {
                self.modify_settings("target power consumption", |pl| {
                    replace(&mut pl.target_power_consumption, v)
                });
            }
            LimiterCommand::ReloadConfig(config) => self.update_settings(config),
            LimiterCommand::RecalculateRestart => self.calc_next_inverter_restart(),
        }
    }

    /// Copy-on-write update of the limiter settings; unchanged values and
    /// values that would invalidate the configuration are dropped
    fn modify_settings<F>(&mut self, what: &str, apply: F)
    where
        F: FnOnce(&mut PowerLimiterConfig) -> Option<String>,
    {
        let mut config = Config::clone(&self.config);
        let Some(value) = apply(&mut config.power_limiter) else {
            return;
        };

        if let Err(e) = config.validate() {
            self.logger
                .warn(&format!("Ignoring new {what} ({value}): {e}"));
            return;
        }

        self.logger.info(&format!("Setting {what} to: {value}"));
        self.config = Arc::new(config);
    }
}

/// Store `value` in `slot`, returning its text if it differs
fn replace<T>(slot: &mut T, value: T) -> Option<String>
where
    T: PartialEq + std::fmt::Display,
{
    if *slot == value {
        return None;
    }
    *slot = value;
    Some(slot.to_string())
}
