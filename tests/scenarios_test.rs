mod common;

use common::{limit, site, site_with, test_config};
use powerlimiter::limiter::{LimiterCommand, Mode, Status};
use powerlimiter::sources::memory::{SentCommand, SolarFrame};

#[test]
fn meter_demand_starts_stopped_inverter() {
    let mut site = site();
    site.set_dc_voltage(52.0);
    site.fresh_readings(500.0);

    site.tick();

    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(500.0), SentCommand::Power(true)]
    );
    assert_eq!(site.limiter.last_requested_power_limit(), 500);
    assert!(site.limiter.battery_discharge_enabled());
}

#[test]
fn demand_below_lower_limit_shuts_producing_inverter_down() {
    let mut site = site();
    site.set_dc_voltage(52.0);
    site.inverter.set_producing(true);
    site.fresh_readings(5.0);

    site.tick();

    // Production is stopped before the lower limit is sent
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![SentCommand::Power(false), limit(10.0)]
    );
    assert_eq!(site.limiter.status(), Status::LowerLimitUndercut);
    assert!(site.limiter.shutdown_in_progress());
    assert_eq!(site.limiter.last_requested_power_limit(), 10);

    // Nothing new while the inverter has not answered
    site.tick();
    assert!(site.inverter.take_sent_commands().is_empty());
    assert!(site.limiter.shutdown_in_progress());

    site.acknowledge();
    site.tick();
    assert!(!site.limiter.shutdown_in_progress());
    assert_eq!(site.limiter.status(), Status::LowerLimitUndercut);
}

#[test]
fn low_soc_blocks_battery_discharge() {
    let mut config = test_config();
    config.battery.enabled = true;
    let mut site = site_with(config, 2);
    site.set_dc_voltage(52.0);
    site.battery.set_state_of_charge(15.0, site.now());
    site.fresh_readings(800.0);

    site.tick();

    assert!(!site.limiter.battery_discharge_enabled());
    assert_eq!(site.limiter.status(), Status::LowerLimitUndercut);
    assert!(site.inverter.take_sent_commands().is_empty());
    assert_eq!(site.limiter.last_requested_power_limit(), 0);
}

#[test]
fn falling_soc_stops_discharging_inverter() {
    let mut config = test_config();
    config.battery.enabled = true;
    let mut site = site_with(config, 2);
    site.set_dc_voltage(52.0);
    site.battery.set_state_of_charge(90.0, site.now());
    site.fresh_readings(300.0);

    site.tick();
    assert!(site.limiter.battery_discharge_enabled());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(300.0), SentCommand::Power(true)]
    );

    site.acknowledge();
    site.settle();
    site.battery.set_state_of_charge(15.0, site.now());
    site.fresh_readings(300.0);
    site.tick();

    assert!(!site.limiter.battery_discharge_enabled());
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![SentCommand::Power(false), limit(10.0)]
    );
}

#[test]
fn unconditional_passthrough_follows_solar_output() {
    let mut config = test_config();
    config.solar_charger.enabled = true;
    let mut site = site_with(config, 2);
    site.solar.set_frame(SolarFrame {
        valid: true,
        output_voltage: 48.0,
        output_current: 10.0,
        panel_power: 500.0,
    });

    site.send(LimiterCommand::SetMode(Mode::UnconditionalFullSolarPassthrough));
    site.tick();

    // 480 W DC at the fallback efficiency of 96.7 %
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![limit(464.0), SentCommand::Power(true)]
    );
    assert_eq!(site.limiter.status(), Status::UnconditionalSolarPassthrough);
    assert_eq!(site.limiter.mode(), Mode::UnconditionalFullSolarPassthrough);
}

#[test]
fn unconditional_passthrough_without_charger_data_shuts_down() {
    let mut config = test_config();
    config.solar_charger.enabled = true;
    let mut site = site_with(config, 2);
    site.inverter.set_producing(true);

    site.send(LimiterCommand::SetMode(Mode::UnconditionalFullSolarPassthrough));
    site.tick();

    assert_eq!(site.limiter.status(), Status::NoVeDirect);
    assert_eq!(
        site.inverter.take_sent_commands(),
        vec![SentCommand::Power(false), limit(10.0)]
    );
}
