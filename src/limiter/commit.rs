use super::PowerLimiter;
use super::types::Status;
use crate::sources::{ChannelField, ChannelType, CommandStatus, Inverter, PowerLimitControlType};
use std::sync::Arc;

/// A DC input delivering more than this counts as producing
const PRODUCING_CHANNEL_MIN_W: f32 = 1.0;

impl PowerLimiter {
    /// Drive the managed inverter to the lower limit and stop it.
    ///
    /// Returns `true` while a shutdown is still in progress.
    pub(crate) fn shutdown(&mut self, status: Status) -> bool {
        self.announce_status(status);

        let inverter = match self.inverter.as_ref() {
            Some(inv) if inv.is_producing() && inv.is_reachable() => Arc::clone(inv),
            _ => {
                // Nothing (left) to shut down
                self.inverter = None;
                self.shutdown_in_progress = false;
                return false;
            }
        };

        self.shutdown_in_progress = true;

        if inverter.last_limit_command() == CommandStatus::Pending
            || inverter.last_power_command() == CommandStatus::Pending
        {
            return true;
        }

        let lower_limit = self.config.power_limiter.lower_power_limit;
        self.commit_power_limit(inverter.as_ref(), lower_limit, false);
        true
    }

    /// Apply upper limit, channel scaling and hysteresis, then commit.
    ///
    /// Returns whether the limit was updated (a shutdown counts as update).
    pub(crate) fn set_new_power_limit(&mut self, inverter: &dyn Inverter, new_limit: i32) -> bool {
        let pl = &self.config.power_limiter;
        let lower_limit = pl.lower_power_limit;
        let upper_limit = pl.upper_power_limit;
        let hysteresis = pl.target_power_consumption_hysteresis;

        self.verbose(&format!(
            "requested limit {new_limit} W, lower {lower_limit} W, upper {upper_limit} W, \
             hysteresis {hysteresis} W, last {} W",
            self.last_requested_power_limit
        ));

        if new_limit < lower_limit {
            self.shutdown(Status::LowerLimitUndercut);
            return true;
        }

        let mut effective = new_limit.min(upper_limit);

        // The inverter splits its limit evenly over all DC inputs, so inputs
        // without a panel attached would waste their share
        let dc_channels = inverter.channels(ChannelType::Dc);
        let total = dc_channels.len();
        let producing = dc_channels
            .iter()
            .filter(|&&c| {
                inverter.channel_field_value(ChannelType::Dc, c, ChannelField::Pdc)
                    > PRODUCING_CHANNEL_MIN_W
            })
            .count();
        if producing > 0 && producing != total {
            self.verbose(&format!(
                "{total} channels total, {producing} producing channels, scaling power limit"
            ));
            effective = scale_by_channels(effective, total, producing);
        }

        let max_power = i32::from(inverter.max_power());
        if max_power > 0 {
            effective = effective.min(max_power);
        }

        let diff = (effective - self.last_requested_power_limit).abs();
        if diff < hysteresis {
            self.verbose(&format!(
                "new limit {effective} W within hysteresis of {} W, not committing",
                self.last_requested_power_limit
            ));
            return false;
        }

        self.commit_power_limit(inverter, effective, true);
        true
    }

    /// Send a non-persistent absolute limit and switch production on or off.
    ///
    /// Production is stopped before a new limit is sent and started only
    /// after it, so a stale higher limit never causes a spike.
    pub(crate) fn commit_power_limit(
        &mut self,
        inverter: &dyn Inverter,
        limit: i32,
        enable_power_production: bool,
    ) {
        if !enable_power_production && inverter.is_producing() {
            self.logger.info("Stopping inverter...");
            if !inverter.send_power_control_request(false) {
                self.logger.warn("Inverter rejected the stop request");
            }
        }

        if !inverter.send_active_power_control_request(
            limit as f32,
            PowerLimitControlType::AbsoluteNonPersistent,
        ) {
            self.logger
                .warn(&format!("Inverter rejected the power limit request ({limit} W)"));
        }

        self.last_requested_power_limit = limit;

        if enable_power_production && !inverter.is_producing() {
            self.logger.info("Starting up inverter...");
            if !inverter.send_power_control_request(true) {
                self.logger.warn("Inverter rejected the start request");
            }
        }
    }
}

/// Scale `limit` by `total / producing` channels, rounded to whole watts
fn scale_by_channels(limit: i32, total: usize, producing: usize) -> i32 {
    (f64::from(limit) * total as f64 / producing as f64).round() as i32
}
