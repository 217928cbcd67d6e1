//! Dynamic power limiter
//!
//! A closed loop that throttles the AC output of one battery-backed
//! inverter so that it matches household consumption as measured by a grid
//! power meter, while honouring battery protection thresholds and the
//! amount of solar power available from an MPPT charge controller.
//!
//! [`PowerLimiter::tick`] runs once per scheduler tick and never blocks. It
//! walks a priority list of conditions, announces the resulting [`Status`]
//! and takes at most one class of action: wait, shut the inverter down, or
//! compute and possibly commit a new power limit. Inverter commands are
//! fire-and-forget; their completion is observed on later ticks.

use crate::clock::Clock;
use crate::config::Config;
use crate::logging::{StructuredLogger, get_logger};
use crate::sources::{Battery, Inverter, InverterRegistry, PowerMeter, SolarCharger};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

mod calculation;
mod commands;
mod commit;
mod restart;
mod runtime;
mod status;
mod thresholds;
mod types;

pub use commands::LimiterCommand;
pub use types::{LimiterSnapshot, Mode, PowerLimiterState, RestartSchedule, Status};

use status::StatusAnnouncer;

/// Initial and reset value of the calculation backoff
const CALCULATION_BACKOFF_DEFAULT_MS: u64 = 128;
const CALCULATION_BACKOFF_MAX_MS: u64 = 1024;

/// Collaborators the limiter reads from and commands
#[derive(Clone)]
pub struct Sources {
    pub clock: Arc<dyn Clock>,
    pub power_meter: Arc<dyn PowerMeter>,
    pub battery: Arc<dyn Battery>,
    pub solar_charger: Arc<dyn SolarCharger>,
    pub inverters: Arc<dyn InverterRegistry>,
}

/// The dynamic power limiter
pub struct PowerLimiter {
    /// Configuration snapshot, replaced as a whole on updates
    config: Arc<Config>,

    sources: Sources,

    logger: StructuredLogger,

    mode: Mode,

    /// Last limit (W) committed to the inverter
    last_requested_power_limit: i32,
    battery_discharge_enabled: bool,
    shutdown_in_progress: bool,

    announcer: StatusAnnouncer,

    last_calculation: u64,
    calculation_backoff_ms: u64,

    /// Sticky flag driven by the full solar passthrough voltage thresholds
    full_solar_passthrough_enabled: bool,

    /// Inverter currently under management
    inverter: Option<Arc<dyn Inverter>>,

    next_inverter_restart: RestartSchedule,
    next_calculate_check: u64,

    /// Command receiver for external control
    commands_rx: mpsc::UnboundedReceiver<LimiterCommand>,

    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    snapshot_tx: watch::Sender<Arc<LimiterSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<LimiterSnapshot>>,
}

impl PowerLimiter {
    /// Create a limiter in `Initializing` state
    pub fn new(
        config: Arc<Config>,
        sources: Sources,
        commands_rx: mpsc::UnboundedReceiver<LimiterCommand>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let logger = get_logger("dpl");

        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(LimiterSnapshot::initial(&config)));

        Self {
            config,
            sources,
            logger,
            mode: Mode::Normal,
            last_requested_power_limit: 0,
            battery_discharge_enabled: false,
            shutdown_in_progress: false,
            announcer: StatusAnnouncer::default(),
            last_calculation: 0,
            calculation_backoff_ms: CALCULATION_BACKOFF_DEFAULT_MS,
            full_solar_passthrough_enabled: false,
            inverter: None,
            next_inverter_restart: RestartSchedule::Uncalculated,
            next_calculate_check: 0,
            commands_rx,
            shutdown_tx,
            shutdown_rx,
            snapshot_tx,
            snapshot_rx,
        }
    }

    /// Current configuration snapshot
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            self.logger.info(&format!("Mode changed: {:?} -> {:?}", self.mode, mode));
        }
        self.mode = mode;
    }

    pub const fn last_requested_power_limit(&self) -> i32 {
        self.last_requested_power_limit
    }

    pub const fn battery_discharge_enabled(&self) -> bool {
        self.battery_discharge_enabled
    }

    pub const fn shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress
    }

    pub const fn calculation_backoff_ms(&self) -> u64 {
        self.calculation_backoff_ms
    }

    pub const fn next_inverter_restart(&self) -> RestartSchedule {
        self.next_inverter_restart
    }

    /// Sticky full solar passthrough flag of the voltage hysteresis
    pub const fn full_solar_passthrough_active(&self) -> bool {
        self.full_solar_passthrough_enabled
    }

    /// Coarse UI state derived from the managed inverter
    pub fn power_limiter_state(&self) -> PowerLimiterState {
        let Some(inverter) = self.inverter.as_ref() else {
            return PowerLimiterState::Inactive;
        };
        if !inverter.is_reachable() {
            return PowerLimiterState::Inactive;
        }
        match (inverter.is_producing(), self.battery_discharge_enabled) {
            (true, true) => PowerLimiterState::SolarAndBattery,
            (true, false) => PowerLimiterState::SolarOnly,
            (false, _) => PowerLimiterState::Charging,
        }
    }

    /// Replace the configuration snapshot and reschedule the daily restart
    pub fn update_settings(&mut self, config: Arc<Config>) {
        self.config = config;
        self.logger.info("Configuration updated");
        self.calc_next_inverter_restart();
    }

    /// Handle used to stop [`PowerLimiter::run`]
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Receiver of the snapshots published after every tick
    pub fn subscribe(&self) -> watch::Receiver<Arc<LimiterSnapshot>> {
        self.snapshot_rx.clone()
    }

    fn verbose(&self, message: &str) {
        if self.config.power_limiter.verbose_logging {
            self.logger.debug(message);
        }
    }
}
