//! Simulated site
//!
//! Drives the in-memory collaborator handles so the limiter can run without
//! hardware: a household load with a periodic ripple, a solar charge
//! controller following a day curve, a battery integrating its net DC flow
//! and inverters that acknowledge commands after a configurable latency.

use crate::clock::Clock;
use crate::config::{Config, SimulationConfig};
use crate::limiter::Sources;
use crate::logging::{StructuredLogger, get_logger};
use crate::sources::memory::{
    DcChannel, MemoryBattery, MemoryInverter, MemoryPowerMeter, MemoryRegistry,
    MemorySolarCharger, SolarFrame,
};
use crate::sources::{CommandStatus, Inverter};
use chrono::Timelike;
use std::f32::consts::PI;
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// AC efficiency reported while producing (percent)
const INVERTER_EFFICIENCY_PERCENT: f32 = 95.0;

/// Share of panel power reaching the battery bus
const CHARGER_EFFICIENCY: f32 = 0.97;

/// Discharge current the simulated BMS allows above empty (A)
const BMS_DISCHARGE_CURRENT_LIMIT: f32 = 100.0;

/// Hours of daylight centered on noon
const SUNRISE_HOUR: f32 = 6.0;
const DAYLIGHT_HOURS: f32 = 12.0;

/// Household, sun, battery and inverters of one installation
pub struct SimulatedSite {
    config: SimulationConfig,
    clock: Arc<dyn Clock>,
    logger: StructuredLogger,

    meter: MemoryPowerMeter,
    battery: MemoryBattery,
    solar: MemorySolarCharger,
    inverters: Vec<MemoryInverter>,
    registry: MemoryRegistry,

    soc: f32,
    last_step: u64,
    last_stats: u64,
    last_meter: u64,
    /// Time the oldest unanswered command was first seen, per inverter
    pending_since: Vec<Option<u64>>,
}

impl SimulatedSite {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        let registry = MemoryRegistry::new();
        let inverters: Vec<MemoryInverter> = config
            .inverters
            .iter()
            .map(|inv| MemoryInverter::new(inv.serial, inv.max_power, inv.dc_channels))
            .collect();
        for inverter in &inverters {
            registry.insert(Arc::new(inverter.clone()));
        }

        let now = clock.millis();
        let sim = config.simulation.clone();
        let soc = sim.battery_initial_soc.clamp(0.0, 100.0);
        let pending_since = vec![None; inverters.len()];

        Self {
            config: sim,
            clock,
            logger: get_logger("sim"),
            meter: MemoryPowerMeter::new(),
            battery: MemoryBattery::new(),
            solar: MemorySolarCharger::new(),
            inverters,
            registry,
            soc,
            last_step: now,
            last_stats: 0,
            last_meter: 0,
            pending_since,
        }
    }

    /// Collaborator handles for the limiter, sharing state with the site
    pub fn sources(&self) -> Sources {
        Sources {
            clock: Arc::clone(&self.clock),
            power_meter: Arc::new(self.meter.clone()),
            battery: Arc::new(self.battery.clone()),
            solar_charger: Arc::new(self.solar.clone()),
            inverters: Arc::new(self.registry.clone()),
        }
    }

    pub fn inverters(&self) -> &[MemoryInverter] {
        &self.inverters
    }

    pub const fn state_of_charge(&self) -> f32 {
        self.soc
    }

    /// Household consumption at `now` (W)
    pub fn household_load(&self, now: u64) -> f32 {
        let period_ms = self.config.load_ripple_period_s * 1000.0;
        if period_ms <= 0.0 {
            return self.config.household_load_w;
        }
        let phase = (now as f32 % period_ms) / period_ms;
        self.config.household_load_w + self.config.load_ripple_w * (2.0 * PI * phase).sin()
    }

    /// Panel power for the current local time; midday while time is unknown
    pub fn panel_power(&self) -> f32 {
        let hour = self.clock.local_time().map_or(12.0, |t| {
            t.hour() as f32 + t.minute() as f32 / 60.0
        });
        let day_fraction = (hour - SUNRISE_HOUR) / DAYLIGHT_HOURS;
        if !(0.0..=1.0).contains(&day_fraction) {
            return 0.0;
        }
        self.config.solar_peak_w * (PI * day_fraction).sin()
    }

    fn battery_voltage(&self) -> f32 {
        let empty = self.config.battery_empty_voltage;
        let full = self.config.battery_full_voltage;
        empty + (full - empty) * self.soc / 100.0
    }

    /// Step the site every `period` until the task is dropped.
    ///
    /// Meant to share a current-thread runtime with the limiter, so a
    /// limiter tick never observes a half-applied step.
    pub async fn run(mut self, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.step();
        }
    }

    /// Advance the site to the current clock reading
    pub fn step(&mut self) {
        let now = self.clock.millis();
        let elapsed_ms = now.saturating_sub(self.last_step);
        self.last_step = now;

        self.resolve_commands(now);

        let voltage = self.battery_voltage();
        let panel_power = self.panel_power();
        let charge_power = panel_power * CHARGER_EFFICIENCY;

        let mut ac_total = 0.0;
        let mut dc_draw = 0.0;
        for inverter in &self.inverters {
            let (ac, dc) = Self::update_inverter(inverter, voltage, self.soc > 0.0);
            ac_total += ac;
            dc_draw += dc;
        }

        // Integrate the net DC flow into the battery
        let hours = elapsed_ms as f32 / 3_600_000.0;
        if self.config.battery_capacity_wh > 0.0 {
            let delta_wh = (charge_power - dc_draw) * hours;
            self.soc = (self.soc + delta_wh / self.config.battery_capacity_wh * 100.0)
                .clamp(0.0, 100.0);
        }

        self.solar.set_frame(SolarFrame {
            valid: true,
            output_voltage: voltage,
            output_current: if voltage > 0.0 { charge_power / voltage } else { 0.0 },
            panel_power,
        });

        if now.saturating_sub(self.last_stats) >= self.config.stats_interval_ms {
            self.last_stats = now;
            self.battery.set_state_of_charge(self.soc, now);
            self.battery.set_discharge_current_limit(if self.soc > 0.0 {
                BMS_DISCHARGE_CURRENT_LIMIT
            } else {
                0.0
            });
            for inverter in &self.inverters {
                inverter.set_statistics_last_update(now);
            }
        }

        if now.saturating_sub(self.last_meter) >= self.config.meter_interval_ms {
            self.last_meter = now;
            let grid = self.household_load(now) - ac_total;
            self.meter.update(grid, now);
            self.logger.trace(&format!(
                "grid {grid:.0} W, inverters {ac_total:.0} W, panels {panel_power:.0} W, SoC {:.1} %",
                self.soc
            ));
        }
    }

    /// Acknowledge commands that have been pending for the configured latency
    fn resolve_commands(&mut self, now: u64) {
        for (inverter, since) in self.inverters.iter().zip(self.pending_since.iter_mut()) {
            let pending = inverter.last_limit_command() == CommandStatus::Pending
                || inverter.last_power_command() == CommandStatus::Pending;
            if !pending {
                *since = None;
                continue;
            }
            let first_seen = *since.get_or_insert(now);
            if now.saturating_sub(first_seen) >= self.config.command_latency_ms {
                inverter.complete_pending(now);
                *since = None;
                self.logger.debug(&format!(
                    "inverter {} acknowledged, limit {:.0} W, producing {}",
                    inverter.id(),
                    inverter.active_limit(),
                    inverter.is_producing()
                ));
            }
        }
    }

    /// Publish AC and DC readings of one inverter; returns (AC W, DC W)
    fn update_inverter(inverter: &MemoryInverter, voltage: f32, has_energy: bool) -> (f32, f32) {
        let producing = inverter.is_producing() && has_energy;
        let ac = if producing {
            inverter.active_limit().min(f32::from(inverter.max_power())).max(0.0)
        } else {
            0.0
        };
        let efficiency = if producing { INVERTER_EFFICIENCY_PERCENT } else { 0.0 };
        let dc = if producing { ac * 100.0 / INVERTER_EFFICIENCY_PERCENT } else { 0.0 };
        inverter.set_ac(ac, efficiency);

        // All inputs hang off the same battery bus
        let channels = inverter.channels(crate::sources::ChannelType::Dc);
        let per_channel = if channels.is_empty() { 0.0 } else { dc / channels.len() as f32 };
        for channel in channels {
            inverter.set_dc_channel(
                channel,
                DcChannel {
                    voltage,
                    current: if voltage > 0.0 { per_channel / voltage } else { 0.0 },
                    power: per_channel,
                },
            );
        }

        (ac, dc)
    }
}
