//! Shared in-memory collaborator handles
//!
//! Feeder tasks (or the simulator, or tests) write readings into these
//! handles; clones share state, so the limiter holds one clone and the
//! writer another. Inverter handles also record the most recent commands
//! they were asked to send.

use super::{
    Battery, ChannelField, ChannelType, CommandStatus, Inverter, InverterId, InverterRegistry,
    PowerLimitControlType, PowerMeter, SolarCharger,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, Default)]
struct MeterReading {
    power_total: f32,
    last_update: u64,
}

/// Power meter fed by a meter driver
#[derive(Debug, Clone, Default)]
pub struct MemoryPowerMeter {
    reading: Arc<RwLock<MeterReading>>,
}

impl MemoryPowerMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, power_total: f32, at: u64) {
        if let Ok(mut r) = self.reading.write() {
            *r = MeterReading {
                power_total,
                last_update: at,
            };
        }
    }
}

impl PowerMeter for MemoryPowerMeter {
    fn power_total(&self) -> f32 {
        self.reading.read().map(|r| r.power_total).unwrap_or_default()
    }

    fn last_update(&self) -> u64 {
        self.reading.read().map(|r| r.last_update).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BatteryReading {
    soc: f32,
    soc_last_update: u64,
    discharge_current_limit: f32,
}

/// Battery fed by a BMS interface
#[derive(Debug, Clone, Default)]
pub struct MemoryBattery {
    reading: Arc<RwLock<BatteryReading>>,
}

impl MemoryBattery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state_of_charge(&self, soc: f32, at: u64) {
        if let Ok(mut r) = self.reading.write() {
            r.soc = soc;
            r.soc_last_update = at;
        }
    }

    pub fn set_discharge_current_limit(&self, amps: f32) {
        if let Ok(mut r) = self.reading.write() {
            r.discharge_current_limit = amps;
        }
    }
}

impl Battery for MemoryBattery {
    fn state_of_charge(&self) -> f32 {
        self.reading.read().map(|r| r.soc).unwrap_or_default()
    }

    fn state_of_charge_last_update(&self) -> u64 {
        self.reading
            .read()
            .map(|r| r.soc_last_update)
            .unwrap_or_default()
    }

    fn discharge_current_limit(&self) -> f32 {
        self.reading
            .read()
            .map(|r| r.discharge_current_limit)
            .unwrap_or_default()
    }
}

/// Last received VE.Direct frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolarFrame {
    pub valid: bool,
    pub output_voltage: f32,
    pub output_current: f32,
    pub panel_power: f32,
}

/// Solar charge controller fed by a VE.Direct reader
#[derive(Debug, Clone, Default)]
pub struct MemorySolarCharger {
    frame: Arc<RwLock<SolarFrame>>,
}

impl MemorySolarCharger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frame(&self, frame: SolarFrame) {
        if let Ok(mut f) = self.frame.write() {
            *f = frame;
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut f) = self.frame.write() {
            f.valid = false;
        }
    }

    fn frame(&self) -> SolarFrame {
        self.frame.read().map(|f| *f).unwrap_or_default()
    }
}

impl SolarCharger for MemorySolarCharger {
    fn is_data_valid(&self) -> bool {
        self.frame().valid
    }

    fn output_voltage(&self) -> f32 {
        self.frame().output_voltage
    }

    fn output_current(&self) -> f32 {
        self.frame().output_current
    }

    fn panel_power(&self) -> f32 {
        self.frame().panel_power
    }
}

/// Commands kept by a [`MemoryInverter`]; older ones are dropped
pub const SENT_COMMAND_LOG_CAPACITY: usize = 64;

/// Command recorded by a [`MemoryInverter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SentCommand {
    Limit {
        watts: f32,
        control: PowerLimitControlType,
    },
    Power(bool),
    Restart,
}

/// Statistics of one DC input
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DcChannel {
    pub voltage: f32,
    pub current: f32,
    pub power: f32,
}

#[derive(Debug, Clone, Copy)]
struct CommandState {
    status: CommandStatus,
    last_update: u64,
}

impl Default for CommandState {
    fn default() -> Self {
        Self {
            status: CommandStatus::Success,
            last_update: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct InverterState {
    reachable: bool,
    producing: bool,
    enable_commands: bool,
    max_power: u16,
    dc: Vec<DcChannel>,
    ac_power: f32,
    efficiency: f32,
    statistics_last_update: u64,
    limit_command: CommandState,
    power_command: CommandState,
    requested_limit: Option<f32>,
    requested_power: Option<bool>,
    active_limit: f32,
    accept_commands: bool,
    sent: VecDeque<SentCommand>,
}

impl InverterState {
    fn record(&mut self, cmd: SentCommand) {
        if self.sent.len() == SENT_COMMAND_LOG_CAPACITY {
            self.sent.pop_front();
        }
        self.sent.push_back(cmd);
    }
}

/// Inverter handle kept current by the radio stack
#[derive(Debug, Clone)]
pub struct MemoryInverter {
    id: InverterId,
    state: Arc<RwLock<InverterState>>,
}

impl MemoryInverter {
    pub fn new(id: InverterId, max_power: u16, dc_channels: u8) -> Self {
        Self {
            id,
            state: Arc::new(RwLock::new(InverterState {
                reachable: true,
                producing: false,
                enable_commands: true,
                max_power,
                dc: vec![DcChannel::default(); usize::from(dc_channels)],
                ac_power: 0.0,
                efficiency: 0.0,
                statistics_last_update: 0,
                limit_command: CommandState::default(),
                power_command: CommandState::default(),
                requested_limit: None,
                requested_power: None,
                active_limit: f32::from(max_power),
                accept_commands: true,
                sent: VecDeque::with_capacity(SENT_COMMAND_LOG_CAPACITY),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut InverterState) -> R) -> Option<R> {
        self.state.write().ok().map(|mut s| f(&mut s))
    }

    fn read<R: Default>(&self, f: impl FnOnce(&InverterState) -> R) -> R {
        self.state.read().map(|s| f(&s)).unwrap_or_default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.with_state(|s| s.reachable = reachable);
    }

    pub fn set_producing(&self, producing: bool) {
        self.with_state(|s| s.producing = producing);
    }

    pub fn set_enable_commands(&self, enable: bool) {
        self.with_state(|s| s.enable_commands = enable);
    }

    /// Whether the radio queue accepts new requests
    pub fn set_accept_commands(&self, accept: bool) {
        self.with_state(|s| s.accept_commands = accept);
    }

    pub fn set_dc_channel(&self, channel: u8, stats: DcChannel) {
        self.with_state(|s| {
            if let Some(c) = s.dc.get_mut(usize::from(channel)) {
                *c = stats;
            }
        });
    }

    /// Store AC output power and inverter efficiency (percent)
    pub fn set_ac(&self, power: f32, efficiency_percent: f32) {
        self.with_state(|s| {
            s.ac_power = power;
            s.efficiency = efficiency_percent;
        });
    }

    pub fn set_statistics_last_update(&self, at: u64) {
        self.with_state(|s| s.statistics_last_update = at);
    }

    /// Acknowledge all pending commands at `at`, applying their effect
    pub fn complete_pending(&self, at: u64) {
        self.with_state(|s| {
            if s.limit_command.status == CommandStatus::Pending {
                if let Some(limit) = s.requested_limit.take() {
                    s.active_limit = limit;
                }
                s.limit_command = CommandState {
                    status: CommandStatus::Success,
                    last_update: at,
                };
            }
            if s.power_command.status == CommandStatus::Pending {
                if let Some(on) = s.requested_power.take() {
                    s.producing = on;
                }
                s.power_command = CommandState {
                    status: CommandStatus::Success,
                    last_update: at,
                };
            }
        });
    }

    /// Resolve all pending commands as failed at `at`
    pub fn fail_pending(&self, at: u64) {
        self.with_state(|s| {
            for cmd in [&mut s.limit_command, &mut s.power_command] {
                if cmd.status == CommandStatus::Pending {
                    *cmd = CommandState {
                        status: CommandStatus::Failure,
                        last_update: at,
                    };
                }
            }
            s.requested_limit = None;
            s.requested_power = None;
        });
    }

    /// Limit the inverter currently applies (W)
    pub fn active_limit(&self) -> f32 {
        self.read(|s| s.active_limit)
    }

    /// Recorded commands, oldest first
    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.read(|s| s.sent.iter().copied().collect())
    }

    pub fn take_sent_commands(&self) -> Vec<SentCommand> {
        self.with_state(|s| s.sent.drain(..).collect())
            .unwrap_or_default()
    }
}

impl Inverter for MemoryInverter {
    fn id(&self) -> InverterId {
        self.id
    }

    fn is_reachable(&self) -> bool {
        self.read(|s| s.reachable)
    }

    fn is_producing(&self) -> bool {
        self.read(|s| s.producing)
    }

    fn enable_commands(&self) -> bool {
        self.read(|s| s.enable_commands)
    }

    fn max_power(&self) -> u16 {
        self.read(|s| s.max_power)
    }

    fn channel_field_value(
        &self,
        channel_type: ChannelType,
        channel: u8,
        field: ChannelField,
    ) -> f32 {
        self.read(|s| match (channel_type, field) {
            (ChannelType::Ac, ChannelField::Pac) if channel == 0 => s.ac_power,
            (ChannelType::Inv, ChannelField::Eff) if channel == 0 => s.efficiency,
            (ChannelType::Dc, ChannelField::Udc) => {
                s.dc.get(usize::from(channel)).map_or(0.0, |c| c.voltage)
            }
            (ChannelType::Dc, ChannelField::Idc) => {
                s.dc.get(usize::from(channel)).map_or(0.0, |c| c.current)
            }
            (ChannelType::Dc, ChannelField::Pdc) => {
                s.dc.get(usize::from(channel)).map_or(0.0, |c| c.power)
            }
            _ => 0.0,
        })
    }

    fn channels(&self, channel_type: ChannelType) -> Vec<u8> {
        match channel_type {
            ChannelType::Dc => self.read(|s| {
                (0..s.dc.len())
                    .filter_map(|i| u8::try_from(i).ok())
                    .collect()
            }),
            ChannelType::Ac | ChannelType::Inv => vec![0],
        }
    }

    fn statistics_last_update(&self) -> u64 {
        self.read(|s| s.statistics_last_update)
    }

    fn last_limit_command(&self) -> CommandStatus {
        self.state
            .read()
            .map_or(CommandStatus::Failure, |s| s.limit_command.status)
    }

    fn last_limit_command_update(&self) -> u64 {
        self.read(|s| s.limit_command.last_update)
    }

    fn last_power_command(&self) -> CommandStatus {
        self.state
            .read()
            .map_or(CommandStatus::Failure, |s| s.power_command.status)
    }

    fn last_power_command_update(&self) -> u64 {
        self.read(|s| s.power_command.last_update)
    }

    fn send_active_power_control_request(
        &self,
        limit: f32,
        control: PowerLimitControlType,
    ) -> bool {
        self.with_state(|s| {
            if !s.accept_commands {
                return false;
            }
            s.record(SentCommand::Limit {
                watts: limit,
                control,
            });
            s.requested_limit = Some(limit);
            s.limit_command.status = CommandStatus::Pending;
            true
        })
        .unwrap_or(false)
    }

    fn send_power_control_request(&self, turn_on: bool) -> bool {
        self.with_state(|s| {
            if !s.accept_commands {
                return false;
            }
            s.record(SentCommand::Power(turn_on));
            s.requested_power = Some(turn_on);
            s.power_command.status = CommandStatus::Pending;
            true
        })
        .unwrap_or(false)
    }

    fn send_restart_control_request(&self) -> bool {
        self.with_state(|s| {
            if !s.accept_commands {
                return false;
            }
            s.record(SentCommand::Restart);
            // A restart comes back up producing, the radio stack reports it
            // through the power command state
            s.requested_power = Some(true);
            s.power_command.status = CommandStatus::Pending;
            true
        })
        .unwrap_or(false)
    }
}

/// Inverters known to the radio stack
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    inverters: Arc<RwLock<HashMap<InverterId, Arc<dyn Inverter>>>>,
}

impl std::fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<InverterId> = self
            .inverters
            .read()
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("MemoryRegistry").field("inverters", &ids).finish()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, inverter: Arc<dyn Inverter>) {
        if let Ok(mut m) = self.inverters.write() {
            m.insert(inverter.id(), inverter);
        }
    }

    pub fn remove(&self, id: InverterId) -> Option<Arc<dyn Inverter>> {
        self.inverters.write().ok().and_then(|mut m| m.remove(&id))
    }
}

impl InverterRegistry for MemoryRegistry {
    fn inverter_by_serial(&self, id: InverterId) -> Option<Arc<dyn Inverter>> {
        self.inverters.read().ok().and_then(|m| m.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_update_is_shared_between_clones() {
        let meter = MemoryPowerMeter::new();
        let reader = meter.clone();
        meter.update(-123.5, 4200);
        assert!((reader.power_total() + 123.5).abs() < f32::EPSILON);
        assert_eq!(reader.last_update(), 4200);
    }

    #[test]
    fn test_battery_readings() {
        let battery = MemoryBattery::new();
        battery.set_state_of_charge(64.5, 900);
        battery.set_discharge_current_limit(42.0);
        let reader = battery.clone();
        assert!((reader.state_of_charge() - 64.5).abs() < f32::EPSILON);
        assert_eq!(reader.state_of_charge_last_update(), 900);
        assert!((reader.discharge_current_limit() - 42.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_inverter_commands_go_pending_then_complete() {
        let inv = MemoryInverter::new(InverterId(7), 800, 2);
        assert_eq!(inv.last_limit_command(), CommandStatus::Success);

        assert!(inv.send_active_power_control_request(
            300.0,
            PowerLimitControlType::AbsoluteNonPersistent
        ));
        assert!(inv.send_power_control_request(true));
        assert_eq!(inv.last_limit_command(), CommandStatus::Pending);
        assert_eq!(inv.last_power_command(), CommandStatus::Pending);

        inv.complete_pending(9000);
        assert_eq!(inv.last_limit_command(), CommandStatus::Success);
        assert_eq!(inv.last_limit_command_update(), 9000);
        assert_eq!(inv.last_power_command_update(), 9000);
        assert!(inv.is_producing());
        assert!((inv.active_limit() - 300.0).abs() < f32::EPSILON);
        assert_eq!(
            inv.sent_commands(),
            vec![
                SentCommand::Limit {
                    watts: 300.0,
                    control: PowerLimitControlType::AbsoluteNonPersistent
                },
                SentCommand::Power(true)
            ]
        );
    }

    #[test]
    fn test_failed_commands_keep_state() {
        let inv = MemoryInverter::new(InverterId(7), 800, 2);
        inv.send_active_power_control_request(250.0, PowerLimitControlType::AbsoluteNonPersistent);
        inv.send_power_control_request(true);

        inv.fail_pending(5000);
        assert_eq!(inv.last_limit_command(), CommandStatus::Failure);
        assert_eq!(inv.last_power_command_update(), 5000);
        assert!(!inv.is_producing());
        assert!((inv.active_limit() - 800.0).abs() < f32::EPSILON);

        // Nothing left to resolve
        inv.complete_pending(6000);
        assert_eq!(inv.last_limit_command(), CommandStatus::Failure);
    }

    #[test]
    fn test_command_log_keeps_only_recent_commands() {
        let inv = MemoryInverter::new(InverterId(7), 800, 2);
        for i in 0..2000 {
            let watts = if i % 2 == 0 { 100.0 } else { 400.0 };
            inv.send_active_power_control_request(watts, PowerLimitControlType::AbsoluteNonPersistent);
            inv.complete_pending(i);
        }

        let log = inv.sent_commands();
        assert_eq!(log.len(), SENT_COMMAND_LOG_CAPACITY);
        assert_eq!(
            log.last(),
            Some(&SentCommand::Limit {
                watts: 400.0,
                control: PowerLimitControlType::AbsoluteNonPersistent,
            })
        );
        assert_eq!(inv.take_sent_commands().len(), SENT_COMMAND_LOG_CAPACITY);
        assert!(inv.sent_commands().is_empty());
    }

    #[test]
    fn test_inverter_rejects_when_queue_closed() {
        let inv = MemoryInverter::new(InverterId(7), 800, 2);
        inv.set_accept_commands(false);
        assert!(!inv.send_power_control_request(false));
        assert!(inv.sent_commands().is_empty());
        assert_eq!(inv.last_power_command(), CommandStatus::Success);
    }

    #[test]
    fn test_channel_values() {
        let inv = MemoryInverter::new(InverterId(7), 800, 4);
        inv.set_dc_channel(
            2,
            DcChannel {
                voltage: 31.0,
                current: 2.0,
                power: 62.0,
            },
        );
        inv.set_ac(150.0, 95.5);
        assert_eq!(inv.channels(ChannelType::Dc), vec![0, 1, 2, 3]);
        assert!((inv.channel_field_value(ChannelType::Dc, 2, ChannelField::Pdc) - 62.0).abs() < 1e-6);
        assert!((inv.channel_field_value(ChannelType::Dc, 9, ChannelField::Udc)).abs() < 1e-6);
        assert!((inv.channel_field_value(ChannelType::Inv, 0, ChannelField::Eff) - 95.5).abs() < 1e-6);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = MemoryRegistry::new();
        let inv = Arc::new(MemoryInverter::new(InverterId(42), 600, 2));
        registry.insert(inv);
        assert!(registry.inverter_by_serial(InverterId(42)).is_some());
        assert!(registry.inverter_by_serial(InverterId(43)).is_none());
        assert!(registry.remove(InverterId(42)).is_some());
        assert!(registry.inverter_by_serial(InverterId(42)).is_none());
    }
}
