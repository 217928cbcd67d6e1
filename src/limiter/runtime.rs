use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};

use super::types::{LimiterSnapshot, Mode, Status};
use super::{CALCULATION_BACKOFF_DEFAULT_MS, CALCULATION_BACKOFF_MAX_MS, PowerLimiter};
use crate::error::Result;
use crate::sources::{CommandStatus, Inverter};

/// Power meter readings older than this are unusable
const POWER_METER_TIMEOUT_MS: u64 = 30_000;

/// Time after an acknowledged inverter command during which readings are stale
const SETTLING_TIME_MS: u64 = 3_000;

impl PowerLimiter {
    /// Run the limiter until the shutdown sender fires
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Starting power limiter loop ({} ms tick)",
            self.config.poll_interval_ms
        ));

        self.calc_next_inverter_restart();

        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                    self.publish_snapshot();
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd);
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.publish_snapshot();
        self.logger.info("Power limiter stopped");
        Ok(())
    }

    /// Apply all commands queued so far
    pub fn process_pending_commands(&mut self) {
        while let Ok(cmd) = self.commands_rx.try_recv() {
            self.handle_command(cmd);
        }
    }

    /// One pass of the control loop
    pub fn tick(&mut self) {
        let config = Arc::clone(&self.config);
        let pl = &config.power_limiter;

        // Keep retrying with the status that caused the shutdown until the
        // inverter reports that it stopped producing
        if self.shutdown_in_progress {
            let status = self.announcer.last_status();
            self.shutdown(status);
            return;
        }

        if !pl.enabled {
            self.shutdown(Status::DisabledByConfig);
            return;
        }

        if self.mode == Mode::Disabled {
            self.shutdown(Status::DisabledByMqtt);
            return;
        }

        // A broken selection shuts down whatever inverter was managed before
        let Some(current) = self.sources.inverters.inverter_by_serial(pl.inverter_id) else {
            self.shutdown(Status::InverterInvalid);
            return;
        };

        // The previous inverter is shut down before the new one is adopted
        if let Some(previous) = self.inverter.as_ref()
            && previous.id() != current.id()
        {
            self.shutdown(Status::InverterChanged);
            return;
        }

        if self.inverter.is_none() {
            self.logger
                .for_inverter(current.id())
                .info("Taking control of inverter");
        }
        self.inverter = Some(Arc::clone(&current));
        let inverter = current.as_ref();

        if !inverter.is_reachable() {
            self.announce_status(Status::InverterOffline);
            return;
        }

        if !inverter.enable_commands() {
            self.announce_status(Status::InverterCommandsDisabled);
            return;
        }

        if inverter.last_limit_command() == CommandStatus::Pending {
            self.announce_status(Status::InverterLimitPending);
            return;
        }

        if inverter.last_power_command() == CommandStatus::Pending {
            self.announce_status(Status::InverterPowerCmdPending);
            return;
        }

        if self.mode == Mode::UnconditionalFullSolarPassthrough {
            self.unconditional_solar_passthrough(inverter);
            return;
        }

        if !config.power_meter.enabled {
            self.shutdown(Status::PowerMeterDisabled);
            return;
        }

        let now = self.sources.clock.millis();
        let meter_last_update = self.sources.power_meter.last_update();
        if now.saturating_sub(meter_last_update) > POWER_METER_TIMEOUT_MS {
            self.shutdown(Status::PowerMeterTimeout);
            return;
        }

        // Only updated when the inverter answered a limit or power command
        let last_command = inverter
            .last_limit_command_update()
            .max(inverter.last_power_command_update());
        let settling_end = last_command + SETTLING_TIME_MS;
        if now < settling_end {
            self.announce_status(Status::Settling);
            return;
        }

        if inverter.statistics_last_update() <= settling_end {
            self.announce_status(Status::InverterStatsPending);
            return;
        }

        if meter_last_update <= settling_end {
            self.announce_status(Status::PowerMeterPending);
            return;
        }

        if now < self.last_calculation + self.calculation_backoff_ms {
            self.announce_status(Status::Stable);
            return;
        }

        self.handle_inverter_restart(inverter, now);

        self.update_battery_discharge(inverter);

        let solar_power_enabled = self.can_use_direct_solar_power();
        let new_limit =
            self.calc_power_limit(inverter, solar_power_enabled, self.battery_discharge_enabled);
        let limit_updated = self.set_new_power_limit(inverter, new_limit);

        self.last_calculation = now;

        if limit_updated {
            self.calculation_backoff_ms = CALCULATION_BACKOFF_DEFAULT_MS;
        } else {
            // Stable system, poll less often
            self.calculation_backoff_ms =
                (self.calculation_backoff_ms * 2).min(CALCULATION_BACKOFF_MAX_MS);
            self.announce_status(Status::Stable);
        }
    }

    /// Follow the solar charge controller output regardless of the meter
    fn unconditional_solar_passthrough(&mut self, inverter: &dyn Inverter) {
        let charger = &self.sources.solar_charger;
        if !self.config.solar_charger.enabled || !charger.is_data_valid() {
            self.shutdown(Status::NoVeDirect);
            return;
        }

        // Whole watts of DC power, like the charge controller reports them
        let solar_power = (charger.output_voltage() * charger.output_current()) as i32;
        let ac_power = self.inverter_power_dc_to_ac(inverter, solar_power as f32);
        self.set_new_power_limit(inverter, ac_power as i32);
        self.announce_status(Status::UnconditionalSolarPassthrough);
    }

    pub(crate) fn build_snapshot(&self) -> LimiterSnapshot {
        let pl = &self.config.power_limiter;
        let status = self.status();
        LimiterSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode: self.mode,
            status,
            status_text: status.text().to_string(),
            last_requested_power_limit: self.last_requested_power_limit,
            power_limiter_state: self.power_limiter_state() as u8,
            battery_discharge_enabled: self.battery_discharge_enabled,
            full_solar_passthrough_active: self.full_solar_passthrough_enabled,
            battery_discharge_current_limit: self
                .config
                .battery
                .enabled
                .then(|| self.sources.battery.discharge_current_limit()),
            shutdown_in_progress: self.shutdown_in_progress,
            upper_power_limit: pl.upper_power_limit,
            target_power_consumption: pl.target_power_consumption,
            battery_soc_start_threshold: pl.battery_soc_start_threshold,
            battery_soc_stop_threshold: pl.battery_soc_stop_threshold,
            full_solar_passthrough_soc: pl.full_solar_passthrough_soc,
            voltage_start_threshold: pl.voltage_start_threshold,
            voltage_stop_threshold: pl.voltage_stop_threshold,
            full_solar_passthrough_start_voltage: pl.full_solar_passthrough_start_voltage,
            full_solar_passthrough_stop_voltage: pl.full_solar_passthrough_stop_voltage,
            next_inverter_restart_ms: self.next_inverter_restart.deadline(),
            calculation_backoff_ms: self.calculation_backoff_ms,
        }
    }

    pub(crate) fn publish_snapshot(&self) {
        let snapshot = Arc::new(self.build_snapshot());
        let _ = self.snapshot_tx.send(snapshot);
    }
}
