use super::PowerLimiter;
use crate::sources::{ChannelField, ChannelType, Inverter};

impl PowerLimiter {
    /// Convert DC power into the AC power the inverter would make of it,
    /// using the last reported efficiency or the configured fallback while
    /// the inverter reports none (it is not producing)
    pub(crate) fn inverter_power_dc_to_ac(&self, inverter: &dyn Inverter, dc_power: f32) -> f32 {
        let efficiency_percent = inverter.channel_field_value(ChannelType::Inv, 0, ChannelField::Eff);
        let efficiency = if efficiency_percent > 0.0 {
            efficiency_percent / 100.0
        } else {
            self.config.power_limiter.inverter_efficiency_fallback
        };
        dc_power * efficiency
    }

    /// DC power the charge controller pushes towards the battery (W)
    fn solar_charger_output_power(&self) -> f32 {
        let charger = &self.sources.solar_charger;
        charger.output_voltage() * charger.output_current()
    }

    /// AC-equivalent of the solar charge power after passthrough losses, 0
    /// while solar power is not directly usable
    pub(crate) fn solar_charge_power(&self, inverter: &dyn Inverter) -> i32 {
        if !self.can_use_direct_solar_power() {
            return 0;
        }
        let losses = f32::from(self.config.power_limiter.solar_passthrough_losses.min(100));
        let dc_power = self.solar_charger_output_power() * (100.0 - losses) / 100.0;
        self.inverter_power_dc_to_ac(inverter, dc_power) as i32
    }

    /// Power (W) the inverter should output to balance the household
    pub(crate) fn calc_power_limit(
        &mut self,
        inverter: &dyn Inverter,
        solar_power_enabled: bool,
        battery_discharge_enabled: bool,
    ) -> i32 {
        if !solar_power_enabled && !battery_discharge_enabled {
            self.verbose("no energy source available to power the inverter");
            return 0;
        }

        let pl = &self.config.power_limiter;
        let meter_power = self.sources.power_meter.power_total().round() as i32;
        let mut limit = meter_power;

        // The meter sees the net exchange, add our own output back in
        let mut ac_power = 0;
        if pl.is_inverter_behind_power_meter {
            ac_power = inverter.channel_field_value(ChannelType::Ac, 0, ChannelField::Pac) as i32;
            limit += ac_power;
        }

        limit -= pl.target_power_consumption;

        let solar_power = self.solar_charge_power(inverter);

        if battery_discharge_enabled {
            // The sticky voltage flag follows the battery even without sun
            let full_solar_passthrough = self.use_full_solar_passthrough(inverter);
            if solar_power_enabled && full_solar_passthrough {
                limit = limit.max(solar_power);
            }
        } else {
            limit = limit.min(solar_power);
        }

        self.verbose(&format!(
            "meter {meter_power} W, inverter {ac_power} W, solar {solar_power} W, \
             battery discharge {battery_discharge_enabled}, limit {limit} W"
        ));

        limit
    }
}
