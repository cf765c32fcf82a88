//! Runtime settings updates and the reactions they trigger

use super::DownloadEngine;
use crate::config::{Config, SettingsUpdate};
use crate::error::Result;
use crate::types::Event;

impl DownloadEngine {
    /// Snapshot of the current settings
    pub async fn settings(&self) -> Config {
        self.settings.read().await.clone()
    }

    /// Get the current global speed limit
    ///
    /// Returns the limit in bytes per second, or None if unlimited.
    pub fn get_speed_limit(&self) -> Option<u64> {
        self.speed_limiter.get_limit()
    }

    /// Set the global speed limit
    ///
    /// Takes effect immediately for every live worker.
    pub async fn set_speed_limit(&self, limit_bps: Option<u64>) {
        self.settings.write().await.limits.speed_limit_bps = limit_bps;
        self.speed_limiter.set_limit(limit_bps);
        self.emit_event(Event::SpeedLimitChanged { limit_bps });

        tracing::info!(limit_bps = ?limit_bps, "speed limit changed");
    }

    /// Apply runtime settings changes
    ///
    /// The merged settings are validated before anything is applied. Then:
    /// - a speed limit change reaches the limiter at once
    /// - network policy changes re-subscribe to connectivity and reschedule
    /// - charging and battery-control changes re-subscribe to power and reschedule
    /// - enabling the custom battery threshold re-evaluates the power policy right away
    /// - a raised concurrency cap starts waiting tasks
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the merged settings are
    /// invalid; nothing is changed in that case.
    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<()> {
        let (old, new) = {
            let mut settings = self.settings.write().await;
            let old = settings.clone();
            let mut new = old.clone();

            if let Some(max) = update.max_active_downloads {
                new.limits.max_active_downloads = max;
            }
            if let Some(retries) = update.max_download_retries {
                new.limits.max_download_retries = retries;
            }
            if let Some(limit) = update.speed_limit_bps {
                new.limits.speed_limit_bps = limit;
            }
            if let Some(value) = update.unmetered_connections_only {
                new.network.unmetered_connections_only = value;
            }
            if let Some(value) = update.enable_roaming {
                new.network.enable_roaming = value;
            }
            if let Some(value) = update.battery_control {
                new.power.battery_control = value;
            }
            if let Some(value) = update.custom_battery_control {
                new.power.custom_battery_control = value;
            }
            if let Some(value) = update.custom_battery_control_value {
                new.power.custom_battery_control_value = value;
            }
            if let Some(value) = update.only_when_charging {
                new.power.only_when_charging = value;
            }
            if let Some(value) = update.move_after_download {
                new.post_process.move_after_download = value;
            }
            if let Some(target) = update.move_after_download_in {
                new.post_process.move_after_download_in = target;
            }

            new.validate()?;
            *settings = new.clone();
            (old, new)
        };

        if old.limits.speed_limit_bps != new.limits.speed_limit_bps {
            self.speed_limiter.set_limit(new.limits.speed_limit_bps);
            self.emit_event(Event::SpeedLimitChanged {
                limit_bps: new.limits.speed_limit_bps,
            });
        }

        let network_changed = old.network != new.network;
        let power_changed = old.power.only_when_charging != new.power.only_when_charging
            || old.power.battery_control != new.power.battery_control;
        let custom_battery_changed = old.power.custom_battery_control
            != new.power.custom_battery_control
            || old.power.custom_battery_control_value != new.power.custom_battery_control_value;

        if network_changed {
            self.switch_connection_watcher(new.network.is_active());
        }
        if power_changed || custom_battery_changed {
            let reschedule_now = custom_battery_changed && new.power.custom_battery_control;
            self.switch_power_watcher(new.power.is_active(), reschedule_now);
        }
        if network_changed || power_changed {
            self.reschedule_downloads().await;
        }

        if new.limits.max_active_downloads > old.limits.max_active_downloads {
            self.schedule_waiting_downloads().await;
        }

        tracing::info!(
            network_changed,
            power_changed,
            custom_battery_changed,
            max_active = new.limits.max_active_downloads,
            "settings updated"
        );
        Ok(())
    }
}
