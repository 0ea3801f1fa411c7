//! Worker version registration state machine.

use tracing::debug;

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Initial state, not yet installing.
    #[default]
    Parsed,
    /// Running the install event.
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Active and intercepting requests.
    Activated,
    /// Replaced or failed to install.
    Redundant,
}

/// A worker version, identified by the cache version it owns.
#[derive(Debug, Clone)]
pub struct WorkerVersion {
    /// The cache version this worker precaches and serves.
    pub cache_version: String,

    /// Current lifecycle state.
    pub state: WorkerState,
}

impl WorkerVersion {
    fn new(cache_version: &str) -> Self {
        Self {
            cache_version: cache_version.to_string(),
            state: WorkerState::Parsed,
        }
    }
}

/// Registration slots for the worker versions of one scope.
///
/// Install always precedes activate for a given version; activate always
/// precedes that version's fetch interception.
#[derive(Debug, Default)]
pub struct Registration {
    /// Version currently running its install event.
    pub installing: Option<WorkerVersion>,

    /// Version installed but not yet active.
    pub waiting: Option<WorkerVersion>,

    /// Version currently intercepting requests.
    pub active: Option<WorkerVersion>,
}

impl Registration {
    /// Create an empty registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin installing a new worker version.
    pub fn begin_install(&mut self, cache_version: &str) {
        let mut version = WorkerVersion::new(cache_version);
        version.state = WorkerState::Installing;
        debug!(version = %cache_version, "install started");
        self.installing = Some(version);
    }

    /// Transition the installing version to waiting.
    pub fn install_complete(&mut self) {
        if let Some(mut version) = self.installing.take() {
            version.state = WorkerState::Installed;
            self.waiting = Some(version);
        }
    }

    /// Discard the installing version after a failed install.
    pub fn install_failed(&mut self) {
        if let Some(mut version) = self.installing.take() {
            version.state = WorkerState::Redundant;
            debug!(version = %version.cache_version, "install failed, version redundant");
        }
    }

    /// Promote the waiting version to active, retiring the previous one.
    pub fn activate(&mut self) {
        if let Some(mut version) = self.waiting.take() {
            if let Some(mut old) = self.active.take() {
                old.state = WorkerState::Redundant;
                debug!(version = %old.cache_version, "previous version retired");
            }
            version.state = WorkerState::Activated;
            self.active = Some(version);
        }
    }

    /// Skip the waiting period and activate immediately.
    pub fn skip_waiting(&mut self) {
        self.activate();
    }

    /// Cache version of the active worker, if any.
    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|v| v.cache_version.as_str())
    }

    /// Cache version of the waiting worker, if any.
    pub fn waiting_version(&self) -> Option<&str> {
        self.waiting.as_ref().map(|v| v.cache_version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_then_activate() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        assert_eq!(
            registration.installing.as_ref().map(|v| v.state),
            Some(WorkerState::Installing)
        );

        registration.install_complete();
        assert!(registration.installing.is_none());
        assert_eq!(registration.waiting_version(), Some("v1"));

        registration.activate();
        assert_eq!(registration.active_version(), Some("v1"));
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_failed_install_discards_version() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        registration.install_failed();

        assert!(registration.installing.is_none());
        assert!(registration.waiting.is_none());
        assert!(registration.active.is_none());
    }

    #[test]
    fn test_activate_retires_previous_version() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        registration.install_complete();
        registration.activate();

        registration.begin_install("v2");
        registration.install_complete();
        registration.skip_waiting();

        assert_eq!(registration.active_version(), Some("v2"));
        assert!(registration.waiting.is_none());
    }

    #[test]
    fn test_activate_without_waiting_is_noop() {
        let mut registration = Registration::new();
        registration.begin_install("v1");
        registration.install_complete();
        registration.activate();

        registration.activate();
        assert_eq!(registration.active_version(), Some("v1"));
    }
}
