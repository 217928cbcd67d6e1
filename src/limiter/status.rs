use super::PowerLimiter;
use super::types::Status;

/// Repeated announcements of an unchanged status are held back this long
const STATUS_REPEAT_MS: u64 = 10_000;

impl Status {
    pub const fn text(self) -> &'static str {
        match self {
            Self::Initializing => "initializing (should not see me)",
            Self::DisabledByConfig => "disabled by configuration",
            Self::DisabledByMqtt => "disabled by MQTT",
            Self::PowerMeterDisabled => "no power meter is configured/enabled",
            Self::PowerMeterTimeout => "power meter readings are outdated",
            Self::PowerMeterPending => "waiting for sufficiently recent power meter reading",
            Self::InverterInvalid => "invalid inverter selection/configuration",
            Self::InverterChanged => "target inverter changed",
            Self::InverterOffline => "inverter is offline (polling enabled? radio okay?)",
            Self::InverterCommandsDisabled => "inverter configuration prohibits sending commands",
            Self::InverterLimitPending => "waiting for a power limit command to complete",
            Self::InverterPowerCmdPending => {
                "waiting for a start/stop/restart command to complete"
            }
            Self::InverterStatsPending => "waiting for sufficiently recent inverter data",
            Self::UnconditionalSolarPassthrough => {
                "unconditionally passing through all solar power (MQTT override)"
            }
            Self::NoVeDirect => "VE.Direct disabled, connection broken, or data outdated",
            Self::Settling => "waiting for the system to settle",
            Self::Stable => "the system is stable, the last power limit is still valid",
            Self::LowerLimitUndercut => "calculated power limit undercuts configured lower limit",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// Last announced status and when it was printed
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatusAnnouncer {
    last_status: Status,
    last_printed: u64,
}

impl Default for StatusAnnouncer {
    fn default() -> Self {
        Self {
            last_status: Status::Initializing,
            last_printed: 0,
        }
    }
}

impl StatusAnnouncer {
    pub(crate) const fn last_status(&self) -> Status {
        self.last_status
    }

    /// Record `status` at `now`; returns whether it should be printed
    pub(crate) fn announce(&mut self, status: Status, now: u64) -> bool {
        if self.last_status == status && now < self.last_printed + STATUS_REPEAT_MS {
            return false;
        }

        // Disabled by configuration is told once and then kept quiet
        if status == Status::DisabledByConfig && self.last_status == status {
            return false;
        }

        self.last_status = status;
        self.last_printed = now;
        true
    }
}

impl PowerLimiter {
    pub(crate) fn announce_status(&mut self, status: Status) {
        let now = self.sources.clock.millis();
        if self.announcer.announce(status, now) {
            self.logger.info(&format!("DPL: {status}"));
        }
    }

    /// Most recently announced status
    pub const fn status(&self) -> Status {
        self.announcer.last_status()
    }
}
