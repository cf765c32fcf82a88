//! Device conditions the engine reacts to
//!
//! The engine never talks to the OS directly. It asks an [`Environment`] for
//! the current connectivity and power state and subscribes to change
//! notifications, which platform glue delivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use tokio::sync::broadcast;

/// Battery level treated as "low" when no custom threshold is configured
pub const DEFAULT_LOW_BATTERY_LEVEL: u8 = 15;

/// Which group of conditions changed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvironmentChange {
    /// Connected, metered or roaming state changed
    Connectivity,
    /// Charging state or battery level changed
    Power,
}

/// Source of connectivity and power conditions
pub trait Environment: Send + Sync {
    /// Whether any network is available
    fn is_connected(&self) -> bool;

    /// Whether the active network is roaming
    fn is_roaming(&self) -> bool;

    /// Whether the active network is metered
    fn is_metered(&self) -> bool;

    /// Whether the device is charging
    fn is_charging(&self) -> bool;

    /// Whether the battery is at or below `threshold` percent
    ///
    /// `None` uses the platform's notion of low battery.
    fn is_battery_low(&self, threshold: Option<u8>) -> bool;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<EnvironmentChange>;
}

/// [`Environment`] whose conditions are set programmatically
///
/// Useful for headless hosts that learn about the network from elsewhere, and
/// for tests. Every setter broadcasts the matching [`EnvironmentChange`].
#[derive(Clone, Debug)]
pub struct ManualEnvironment {
    connected: Arc<AtomicBool>,
    roaming: Arc<AtomicBool>,
    metered: Arc<AtomicBool>,
    charging: Arc<AtomicBool>,
    battery_level: Arc<AtomicU8>,
    changes: broadcast::Sender<EnvironmentChange>,
}

impl Default for ManualEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualEnvironment {
    /// Connected, unmetered, not roaming, charging, battery full
    pub fn new() -> Self {
        let (changes, _rx) = broadcast::channel(64);
        Self {
            connected: Arc::new(AtomicBool::new(true)),
            roaming: Arc::new(AtomicBool::new(false)),
            metered: Arc::new(AtomicBool::new(false)),
            charging: Arc::new(AtomicBool::new(true)),
            battery_level: Arc::new(AtomicU8::new(100)),
            changes,
        }
    }

    /// Set connectivity
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
        self.notify(EnvironmentChange::Connectivity);
    }

    /// Set roaming
    pub fn set_roaming(&self, roaming: bool) {
        self.roaming.store(roaming, Ordering::SeqCst);
        self.notify(EnvironmentChange::Connectivity);
    }

    /// Set metered
    pub fn set_metered(&self, metered: bool) {
        self.metered.store(metered, Ordering::SeqCst);
        self.notify(EnvironmentChange::Connectivity);
    }

    /// Set charging
    pub fn set_charging(&self, charging: bool) {
        self.charging.store(charging, Ordering::SeqCst);
        self.notify(EnvironmentChange::Power);
    }

    /// Set battery level in percent (clamped to 100)
    pub fn set_battery_level(&self, level: u8) {
        self.battery_level.store(level.min(100), Ordering::SeqCst);
        self.notify(EnvironmentChange::Power);
    }

    fn notify(&self, change: EnvironmentChange) {
        // No subscribers is fine
        self.changes.send(change).ok();
    }
}

impl Environment for ManualEnvironment {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_roaming(&self) -> bool {
        self.roaming.load(Ordering::SeqCst)
    }

    fn is_metered(&self) -> bool {
        self.metered.load(Ordering::SeqCst)
    }

    fn is_charging(&self) -> bool {
        self.charging.load(Ordering::SeqCst)
    }

    fn is_battery_low(&self, threshold: Option<u8>) -> bool {
        let threshold = threshold.unwrap_or(DEFAULT_LOW_BATTERY_LEVEL);
        self.battery_level.load(Ordering::SeqCst) <= threshold
    }

    fn subscribe(&self) -> broadcast::Receiver<EnvironmentChange> {
        self.changes.subscribe()
    }
}
