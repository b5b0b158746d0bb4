//! Disk space monitoring.
//!
//! Turns free-space observations into availability transitions. Listeners
//! only hear about edges, never about repeated observations of the same
//! state.

use serde::{Deserialize, Serialize};

/// Disk space thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskSpaceConfig {
    /// Free bytes below which the partition stops accepting commands
    pub min_free_bytes: u64,
}

impl DiskSpaceConfig {
    /// Create a config with the given threshold
    #[must_use]
    pub const fn new(min_free_bytes: u64) -> Self {
        Self { min_free_bytes }
    }
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            min_free_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Disk space transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSpaceEvent {
    /// Free space recovered above the threshold
    Available,
    /// Free space dropped below the threshold
    NotAvailable,
}

/// Receives disk space transitions
pub trait DiskSpaceUsageListener {
    /// Free space dropped below the threshold
    fn on_disk_space_not_available(&mut self);

    /// Free space recovered
    fn on_disk_space_available(&mut self);

    /// Dispatch `event` to the matching callback
    fn on_disk_space_event(&mut self, event: DiskSpaceEvent) {
        match event {
            DiskSpaceEvent::Available => self.on_disk_space_available(),
            DiskSpaceEvent::NotAvailable => self.on_disk_space_not_available(),
        }
    }
}

/// Edge-triggered disk space monitor
#[derive(Debug, Clone)]
pub struct DiskSpaceMonitor {
    config: DiskSpaceConfig,
    available: bool,
}

impl DiskSpaceMonitor {
    /// Create a monitor; disk space counts as available until observed
    #[must_use]
    pub const fn new(config: DiskSpaceConfig) -> Self {
        Self {
            config,
            available: true,
        }
    }

    /// Record an observation of `free_bytes`
    ///
    /// Returns the transition, if the observation changed availability.
    pub fn observe(&mut self, free_bytes: u64) -> Option<DiskSpaceEvent> {
        let available = free_bytes >= self.config.min_free_bytes;
        if available == self.available {
            return None;
        }
        self.available = available;
        if available {
            tracing::info!(free_bytes, "Disk space available again");
            Some(DiskSpaceEvent::Available)
        } else {
            tracing::warn!(
                free_bytes,
                min_free_bytes = self.config.min_free_bytes,
                "Disk space below threshold"
            );
            Some(DiskSpaceEvent::NotAvailable)
        }
    }

    /// Whether disk space is currently available
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.available
    }

    /// Monitor config
    #[must_use]
    pub const fn config(&self) -> &DiskSpaceConfig {
        &self.config
    }
}

impl Default for DiskSpaceMonitor {
    fn default() -> Self {
        Self::new(DiskSpaceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_starts_available() {
        let monitor = DiskSpaceMonitor::default();
        assert!(monitor.is_available());
        assert_eq!(monitor.config().min_free_bytes, 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_monitor_is_edge_triggered() {
        let mut monitor = DiskSpaceMonitor::new(DiskSpaceConfig::new(100));

        assert_eq!(monitor.observe(500), None);
        assert_eq!(monitor.observe(99), Some(DiskSpaceEvent::NotAvailable));
        assert_eq!(monitor.observe(10), None);
        assert!(!monitor.is_available());

        assert_eq!(monitor.observe(100), Some(DiskSpaceEvent::Available));
        assert_eq!(monitor.observe(1_000), None);
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<DiskSpaceEvent>,
    }

    impl DiskSpaceUsageListener for Recorder {
        fn on_disk_space_not_available(&mut self) {
            self.events.push(DiskSpaceEvent::NotAvailable);
        }

        fn on_disk_space_available(&mut self) {
            self.events.push(DiskSpaceEvent::Available);
        }
    }

    #[test]
    fn test_listener_dispatch() {
        let mut recorder = Recorder::default();
        recorder.on_disk_space_event(DiskSpaceEvent::NotAvailable);
        recorder.on_disk_space_event(DiskSpaceEvent::Available);
        assert_eq!(
            recorder.events,
            vec![DiskSpaceEvent::NotAvailable, DiskSpaceEvent::Available]
        );
    }
}
