//! Network and power policy: stop checks, rescheduling and change subscriptions

use super::DownloadEngine;
use crate::config::{NetworkPolicy, PowerPolicy};
use crate::environment::{Environment, EnvironmentChange};
use crate::types::{Event, TaskRecord};
use std::sync::PoisonError;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Whether the network policy suspends every download right now
pub(crate) fn network_policy_forbids(env: &dyn Environment, policy: &NetworkPolicy) -> bool {
    let mut stop = false;
    if policy.enable_roaming {
        stop |= env.is_roaming();
    }
    if policy.unmetered_connections_only {
        stop |= env.is_metered();
    }
    stop
}

/// Whether the power policy suspends every download right now
pub(crate) fn power_policy_forbids(env: &dyn Environment, policy: &PowerPolicy) -> bool {
    let mut stop = false;
    if policy.only_when_charging {
        stop |= !env.is_charging();
    }
    if policy.custom_battery_control {
        stop |= env.is_battery_low(Some(policy.custom_battery_control_value));
    } else if policy.battery_control {
        stop |= env.is_battery_low(None);
    }
    stop
}

/// Whether `record` may not transfer on the current network
///
/// Stricter than [`network_policy_forbids`]: no connection at all, or a
/// metered connection for a task that only runs unmetered, also park it.
pub(crate) fn network_forbids_task(
    env: &dyn Environment,
    policy: &NetworkPolicy,
    record: &TaskRecord,
) -> bool {
    !env.is_connected()
        || (record.unmetered_only && env.is_metered())
        || network_policy_forbids(env, policy)
}

impl DownloadEngine {
    /// Whether the environment policy currently suspends all downloads
    pub async fn check_stop_downloads(&self) -> bool {
        let settings = self.settings.read().await;
        let env = self.services.environment.as_ref();
        network_policy_forbids(env, &settings.network) || power_policy_forbids(env, &settings.power)
    }

    /// Stop everything if the environment forbids transfers, resume otherwise
    ///
    /// Resuming skips tasks the user paused.
    pub async fn reschedule_downloads(&self) {
        if self.check_stop_downloads().await {
            tracing::info!("environment policy suspends downloads, stopping all");
            self.stop_all().await;
            self.emit_event(Event::QueueStopped);
        } else {
            tracing::debug!("environment allows downloads, resuming");
            if let Err(e) = self.resume_downloads(true).await {
                tracing::error!(error = %e, "failed to resume downloads");
            }
            self.emit_event(Event::QueueResumed);
        }
    }

    /// Turn the connectivity subscription on or off
    pub(crate) fn switch_connection_watcher(&self, enable: bool) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = watchers.connection.take() {
            handle.abort();
        }
        if enable {
            watchers.connection = Some(self.spawn_watcher(EnvironmentChange::Connectivity, false));
        }
    }

    /// Turn the power subscription on or off
    ///
    /// With `reschedule_now` the watcher evaluates the policy once right away
    /// instead of waiting for the first change.
    pub(crate) fn switch_power_watcher(&self, enable: bool, reschedule_now: bool) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = watchers.power.take() {
            handle.abort();
        }
        if enable {
            watchers.power = Some(self.spawn_watcher(EnvironmentChange::Power, reschedule_now));
        }
    }

    /// Abort every environment subscription
    pub(crate) fn stop_watchers(&self) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in [watchers.connection.take(), watchers.power.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }

    fn spawn_watcher(&self, kind: EnvironmentChange, reschedule_now: bool) -> JoinHandle<()> {
        let mut changes = self.services.environment.subscribe();
        let engine = self.clone();

        tokio::spawn(async move {
            if reschedule_now {
                engine.reschedule_downloads().await;
            }
            loop {
                match changes.recv().await {
                    Ok(change) if change == kind => engine.reschedule_downloads().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(?kind, skipped, "environment watcher lagged");
                        engine.reschedule_downloads().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!(?kind, "environment change channel closed");
                        break;
                    }
                }
            }
        })
    }
}
