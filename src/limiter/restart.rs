use super::PowerLimiter;
use super::types::RestartSchedule;
use crate::sources::Inverter;
use chrono::Timelike;

/// Retry interval while local time is not available yet
const LOCAL_TIME_RETRY_MS: u64 = 5_000;

const MINUTES_PER_DAY: u64 = 24 * 60;

impl PowerLimiter {
    /// Compute the deadline of the next daily inverter restart
    pub fn calc_next_inverter_restart(&mut self) {
        let restart_hour = self.config.power_limiter.restart_hour;
        let Ok(target_hour) = u32::try_from(restart_hour) else {
            self.next_inverter_restart = RestartSchedule::Disabled;
            self.logger.info("Daily inverter restart disabled");
            return;
        };

        let Some(local) = self.sources.clock.local_time() else {
            self.logger
                .info("Local time not available, inverter restart not calculated");
            self.next_inverter_restart = RestartSchedule::Uncalculated;
            return;
        };

        let minutes = minutes_until_restart(local.hour(), local.minute(), target_hour);
        let deadline = self.sources.clock.millis() + minutes * 60_000;
        self.next_inverter_restart = RestartSchedule::At(deadline);
        self.logger.info(&format!(
            "Next inverter restart in {minutes} minutes (@ {deadline} ms)"
        ));
    }

    /// Send a due restart and keep the schedule calculated
    pub(crate) fn handle_inverter_restart(&mut self, inverter: &dyn Inverter, now: u64) {
        if let RestartSchedule::At(deadline) = self.next_inverter_restart
            && deadline <= now
        {
            self.logger.info("Sending inverter restart");
            if !inverter.send_restart_control_request() {
                self.logger.warn("Inverter rejected the restart request");
            }
            self.calc_next_inverter_restart();
        }

        if self.config.power_limiter.restart_hour >= 0
            && self.next_inverter_restart == RestartSchedule::Uncalculated
            && self.next_calculate_check < now
        {
            if self.sources.clock.local_time().is_some() {
                self.calc_next_inverter_restart();
            } else {
                self.verbose("inverter restart calculation: local time not ready");
                self.next_calculate_check = now + LOCAL_TIME_RETRY_MS;
            }
        }
    }
}

/// Minutes from `hour:minute` to the next `target_hour:00`; an hour that has
/// already begun today is scheduled for tomorrow
fn minutes_until_restart(hour: u32, minute: u32, target_hour: u32) -> u64 {
    let day_minutes = u64::from(hour * 60 + minute);
    let target_minutes = u64::from(target_hour * 60);
    if target_hour > hour {
        target_minutes - day_minutes
    } else {
        MINUTES_PER_DAY - day_minutes + target_minutes
    }
}
