use super::*;

impl Default for PowerLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verbose_logging: false,
            solar_passthrough_enabled: true,
            solar_passthrough_losses: 3,
            battery_drain_strategy: BatteryDrainStrategy::EmptyAtNight,
            is_inverter_behind_power_meter: true,
            inverter_id: InverterId(0x1161_2345_6789),
            inverter_channel_id: 0,
            target_power_consumption: 0,
            target_power_consumption_hysteresis: 0,
            lower_power_limit: 10,
            upper_power_limit: 800,
            battery_soc_start_threshold: 80.0,
            battery_soc_stop_threshold: 20.0,
            voltage_start_threshold: 50.0,
            voltage_stop_threshold: 49.0,
            voltage_load_correction_factor: 0.001,
            restart_hour: -1,
            full_solar_passthrough_soc: 100.0,
            full_solar_passthrough_start_voltage: 100.0,
            full_solar_passthrough_stop_voltage: 100.0,
            inverter_efficiency_fallback: 0.967,
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for SolarChargerConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

impl Default for PowerMeterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/powerlimiter.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            household_load_w: 350.0,
            load_ripple_w: 150.0,
            load_ripple_period_s: 90.0,
            solar_peak_w: 600.0,
            battery_capacity_wh: 2400.0,
            battery_initial_soc: 60.0,
            battery_empty_voltage: 46.0,
            battery_full_voltage: 54.0,
            command_latency_ms: 800,
            stats_interval_ms: 5000,
            meter_interval_ms: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            power_limiter: PowerLimiterConfig::default(),
            battery: BatteryConfig::default(),
            solar_charger: SolarChargerConfig::default(),
            power_meter: PowerMeterConfig::default(),
            inverters: vec![InverterConfig {
                serial: InverterId(0x1161_2345_6789),
                name: "HM-800".to_string(),
                max_power: 800,
                dc_channels: 2,
            }],
            logging: LoggingConfig::default(),
            poll_interval_ms: 100,
            timezone: "UTC".to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}
