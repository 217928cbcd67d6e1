use super::PowerLimiter;
use crate::config::BatteryDrainStrategy;
use crate::sources::{ChannelField, ChannelType, Inverter};

/// SoC readings older than this fall back to the voltage thresholds
const SOC_MAX_AGE_MS: u64 = 60_000;

/// Panel power below this is dawn/dusk noise
const MIN_DIRECT_SOLAR_POWER_W: f32 = 20.0;

impl PowerLimiter {
    /// SoC of an enabled battery interface if it was reported within the last minute
    fn fresh_state_of_charge(&self) -> Option<f32> {
        if !self.config.battery.enabled {
            return None;
        }
        let battery = &self.sources.battery;
        let last_update = battery.state_of_charge_last_update();
        if last_update == 0 {
            return None;
        }
        let age = self.sources.clock.millis().saturating_sub(last_update);
        (age < SOC_MAX_AGE_MS).then(|| battery.state_of_charge())
    }

    /// Battery voltage as seen on the configured DC input of the inverter
    pub(crate) fn dc_voltage(&self, inverter: &dyn Inverter) -> f32 {
        inverter.channel_field_value(
            ChannelType::Dc,
            self.config.power_limiter.inverter_channel_id,
            ChannelField::Udc,
        )
    }

    /// DC voltage compensated for the sag caused by the current AC output
    pub(crate) fn load_corrected_voltage(&self, inverter: &dyn Inverter) -> f32 {
        let dc_voltage = self.dc_voltage(inverter);
        if dc_voltage <= 0.0 {
            return 0.0;
        }
        let ac_power = inverter.channel_field_value(ChannelType::Ac, 0, ChannelField::Pac);
        dc_voltage + ac_power * self.config.power_limiter.voltage_load_correction_factor
    }

    /// SoC wins when configured and fresh; a voltage threshold <= 0 disables the check
    fn test_threshold(
        &self,
        inverter: &dyn Inverter,
        soc_threshold: f32,
        voltage_threshold: f32,
        compare: fn(f32, f32) -> bool,
    ) -> bool {
        if soc_threshold > 0.0
            && let Some(soc) = self.fresh_state_of_charge()
        {
            return compare(soc, soc_threshold);
        }

        if voltage_threshold <= 0.0 {
            return false;
        }

        compare(self.load_corrected_voltage(inverter), voltage_threshold)
    }

    pub(crate) fn is_start_threshold_reached(&self, inverter: &dyn Inverter) -> bool {
        let pl = &self.config.power_limiter;
        self.test_threshold(
            inverter,
            pl.battery_soc_start_threshold,
            pl.voltage_start_threshold,
            |value, threshold| value >= threshold,
        )
    }

    pub(crate) fn is_stop_threshold_reached(&self, inverter: &dyn Inverter) -> bool {
        let pl = &self.config.power_limiter;
        self.test_threshold(
            inverter,
            pl.battery_soc_stop_threshold,
            pl.voltage_stop_threshold,
            |value, threshold| value <= threshold,
        )
    }

    /// Whether the charge controller currently delivers usable solar power
    pub fn can_use_direct_solar_power(&self) -> bool {
        if !self.config.power_limiter.solar_passthrough_enabled || !self.config.solar_charger.enabled
        {
            return false;
        }
        let charger = &self.sources.solar_charger;
        charger.is_data_valid() && charger.panel_power() >= MIN_DIRECT_SOLAR_POWER_W
    }

    /// Full solar passthrough: a full battery by SoC, or the sticky voltage
    /// hysteresis between the start and stop voltages
    pub(crate) fn use_full_solar_passthrough(&mut self, inverter: &dyn Inverter) -> bool {
        let pl = &self.config.power_limiter;
        if !pl.solar_passthrough_enabled {
            return false;
        }

        if pl.full_solar_passthrough_soc > 0.0
            && let Some(soc) = self.fresh_state_of_charge()
            && soc >= pl.full_solar_passthrough_soc
        {
            return true;
        }

        let start = pl.full_solar_passthrough_start_voltage;
        let stop = pl.full_solar_passthrough_stop_voltage;
        if start <= 0.0 || stop <= 0.0 {
            return false;
        }

        let dc_voltage = self.dc_voltage(inverter);
        if dc_voltage >= start {
            self.full_solar_passthrough_enabled = true;
        } else if dc_voltage <= stop {
            self.full_solar_passthrough_enabled = false;
        }

        self.full_solar_passthrough_enabled
    }

    /// Re-evaluate whether the battery may be discharged; battery protection
    /// always wins and an undecided case keeps the previous decision
    pub(crate) fn update_battery_discharge(&mut self, inverter: &dyn Inverter) {
        let previous = self.battery_discharge_enabled;

        if self.is_stop_threshold_reached(inverter) {
            self.battery_discharge_enabled = false;
        } else {
            let start_reached = self.is_start_threshold_reached(inverter);
            let pl = &self.config.power_limiter;

            if !pl.solar_passthrough_enabled {
                if start_reached {
                    self.battery_discharge_enabled = true;
                }
            } else {
                match pl.battery_drain_strategy {
                    BatteryDrainStrategy::EmptyAtNight => {
                        // Without usable sun the battery carries the load
                        self.battery_discharge_enabled =
                            start_reached || !self.can_use_direct_solar_power();
                    }
                    BatteryDrainStrategy::EmptyWhenFull => {
                        if start_reached {
                            self.battery_discharge_enabled = true;
                        }
                    }
                }
            }
        }

        if previous != self.battery_discharge_enabled {
            self.verbose(&format!(
                "battery discharge {}",
                if self.battery_discharge_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            ));
        }
    }
}
