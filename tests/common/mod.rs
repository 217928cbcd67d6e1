// Shared test site for the limiter integration tests
#![allow(dead_code)]

use powerlimiter::clock::{Clock, ManualClock};
use powerlimiter::config::Config;
use powerlimiter::limiter::{LimiterCommand, PowerLimiter, Sources};
use powerlimiter::sources::memory::{
    DcChannel, MemoryBattery, MemoryInverter, MemoryPowerMeter, MemoryRegistry,
    MemorySolarCharger, SentCommand,
};
use powerlimiter::sources::{InverterId, PowerLimitControlType};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const SERIAL: InverterId = InverterId(0x1161_0000_0042);
pub const START_MS: u64 = 100_000;

pub struct Site {
    pub clock: ManualClock,
    pub meter: MemoryPowerMeter,
    pub battery: MemoryBattery,
    pub solar: MemorySolarCharger,
    pub inverter: MemoryInverter,
    pub registry: MemoryRegistry,
    pub commands: mpsc::UnboundedSender<LimiterCommand>,
    pub limiter: PowerLimiter,
}

/// Limiter enabled for `SERIAL`, meter only, upper limit 1500 W, hysteresis 20 W
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.power_limiter.enabled = true;
    config.power_limiter.inverter_id = SERIAL;
    config.power_limiter.lower_power_limit = 10;
    config.power_limiter.upper_power_limit = 1500;
    config.power_limiter.target_power_consumption = 0;
    config.power_limiter.target_power_consumption_hysteresis = 20;
    config.power_meter.enabled = true;
    config.battery.enabled = false;
    config.solar_charger.enabled = false;
    config
}

pub fn site() -> Site {
    site_with(test_config(), 2)
}

pub fn site_with(config: Config, dc_channels: u8) -> Site {
    let clock = ManualClock::new(START_MS);
    let meter = MemoryPowerMeter::new();
    let battery = MemoryBattery::new();
    let solar = MemorySolarCharger::new();
    let inverter = MemoryInverter::new(SERIAL, 1600, dc_channels);
    let registry = MemoryRegistry::new();
    registry.insert(Arc::new(inverter.clone()));

    let sources = Sources {
        clock: Arc::new(clock.clone()),
        power_meter: Arc::new(meter.clone()),
        battery: Arc::new(battery.clone()),
        solar_charger: Arc::new(solar.clone()),
        inverters: Arc::new(registry.clone()),
    };
    let (commands, rx) = mpsc::unbounded_channel();
    let limiter = PowerLimiter::new(Arc::new(config), sources, rx);

    Site {
        clock,
        meter,
        battery,
        solar,
        inverter,
        registry,
        commands,
        limiter,
    }
}

impl Site {
    pub fn now(&self) -> u64 {
        self.clock.millis()
    }

    /// Battery voltage seen on DC input 0
    pub fn set_dc_voltage(&self, voltage: f32) {
        self.inverter.set_dc_channel(
            0,
            DcChannel {
                voltage,
                current: 0.0,
                power: 0.0,
            },
        );
    }

    /// New meter reading and inverter statistics, both stamped `now`
    pub fn fresh_readings(&self, meter_power: f32) {
        let now = self.now();
        self.meter.update(meter_power, now);
        self.inverter.set_statistics_last_update(now);
    }

    /// Let the inverter answer every pending command now
    pub fn acknowledge(&self) {
        self.inverter.complete_pending(self.now());
    }

    /// Move past the settling window of the last acknowledged command
    pub fn settle(&self) {
        self.clock.advance(3_100);
    }

    pub fn send(&self, cmd: LimiterCommand) {
        self.commands.send(cmd).unwrap();
    }

    /// Apply queued commands, then run one pass of the control loop
    pub fn tick(&mut self) {
        self.limiter.process_pending_commands();
        self.limiter.tick();
    }
}

pub fn limit(watts: f32) -> SentCommand {
    SentCommand::Limit {
        watts,
        control: PowerLimitControlType::AbsoluteNonPersistent,
    }
}
