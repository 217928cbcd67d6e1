mod common;

use common::{limit, site, site_with, test_config};
use powerlimiter::config::Config;
use powerlimiter::sources::memory::{SentCommand, SolarFrame};

fn solar_config() -> Config {
    let mut config = test_config();
    config.solar_charger.enabled = true;
    config
}

fn sunny(output_voltage: f32, output_current: f32) -> SolarFrame {
    SolarFrame {
        valid: true,
        output_voltage,
        output_current,
        panel_power: output_voltage * output_current + 20.0,
    }
}

#[test]
fn low_voltage_stops_discharge_of_running_inverter() {
    let mut site = site();
    site.set_dc_voltage(52.0);
    site.fresh_readings(300.0);
    site.tick();
    site.acknowledge();
    site.inverter.take_sent_commands();
    site.inverter.set_ac(300.0, 95.0);

    // 48.5 V plus 0.3 V load correction is below the 49 V stop threshold
    site.settle();
    site.set_dc_voltage(48.5);
    site.fresh_readings(0.0);
    site.tick();

    assert!(!site.limiter.battery_discharge_enabled());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![SentCommand::Power(false), limit(10.0)]
    );
}

#[test]
fn solar_only_limits_output_to_solar_power() {
    let mut site = site_with(solar_config(), 2);
    // Between the voltage thresholds with usable sun: keep charging
    site.set_dc_voltage(49.5);
    site.solar.set_frame(sunny(50.0, 6.0));
    site.fresh_readings(800.0);

    site.tick();

    assert!(!site.limiter.battery_discharge_enabled());
    // 300 W minus 3 % losses, at 96.7 % efficiency
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(281.0), SentCommand::Power(true)]
    );
}

#[test]
fn battery_carries_the_load_once_the_sun_is_gone() {
    let mut site = site_with(solar_config(), 2);
    site.set_dc_voltage(49.5);
    site.solar.set_frame(SolarFrame {
        valid: true,
        output_voltage: 49.5,
        output_current: 0.3,
        panel_power: 19.0,
    });
    site.fresh_readings(200.0);

    site.tick();

    assert!(site.limiter.battery_discharge_enabled());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(200.0), SentCommand::Power(true)]
    );
}

#[test]
fn full_solar_passthrough_feeds_in_all_solar_power() {
    let mut config = solar_config();
    config.power_limiter.solar_passthrough_losses = 0;
    config.power_limiter.full_solar_passthrough_start_voltage = 52.0;
    config.power_limiter.full_solar_passthrough_stop_voltage = 51.0;
    let mut site = site_with(config, 2);
    site.set_dc_voltage(53.0);
    site.solar.set_frame(sunny(53.0, 10.0));
    // Already exporting, the meter alone would stop the inverter
    site.fresh_readings(-200.0);

    site.tick();

    assert!(site.limiter.full_solar_passthrough_active());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(512.0), SentCommand::Power(true)]
    );
}

#[test]
fn below_full_solar_passthrough_meter_decides() {
    let mut config = solar_config();
    config.power_limiter.full_solar_passthrough_start_voltage = 52.0;
    config.power_limiter.full_solar_passthrough_stop_voltage = 51.0;
    let mut site = site_with(config, 2);
    site.set_dc_voltage(50.5);
    site.solar.set_frame(sunny(50.5, 10.0));
    site.fresh_readings(-200.0);

    site.tick();

    assert!(site.limiter.battery_discharge_enabled());
    assert!(!site.limiter.full_solar_passthrough_active());
    assert!(site.inverter.take_sent_commands().is_empty());
}

#[test]
fn fresh_soc_overrides_voltage_thresholds() {
    let mut config = test_config();
    config.battery.enabled = true;
    let mut site = site_with(config, 2);
    // Voltage is below the stop threshold, the BMS knows better
    site.set_dc_voltage(48.0);
    site.battery.set_state_of_charge(85.0, site.now());
    site.fresh_readings(250.0);

    site.tick();

    assert!(site.limiter.battery_discharge_enabled());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(250.0), SentCommand::Power(true)]
    );
}

#[test]
fn stale_soc_falls_back_to_voltage() {
    let mut config = test_config();
    config.battery.enabled = true;
    let mut site = site_with(config, 2);
    site.set_dc_voltage(48.0);
    site.battery.set_state_of_charge(85.0, site.now() - 61_000);
    site.fresh_readings(250.0);

    site.tick();

    assert!(!site.limiter.battery_discharge_enabled());
    assert!(site.inverter.take_sent_commands().is_empty());
}
