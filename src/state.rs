// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::sync::Arc;

use crate::{clock::Clock, registry::Registry};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    /// Clock used to check signed-call timestamps. Always the registry's
    /// own clock.
    pub clock: Arc<dyn Clock>,
    /// Data directory checked by the readiness probe, if persistence is on.
    pub data_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            clock: registry.clock(),
            registry,
            data_dir: None,
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(Registry::in_memory()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::AuditLog, clock::ManualClock, storage::MemoryRegistryStore};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn signature_clock_is_the_registry_clock() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let registry = Registry::new(
            Arc::new(MemoryRegistryStore::new()),
            Arc::new(AuditLog::in_memory()),
            clock.clone(),
        );
        let state = AppState::new(Arc::new(registry));

        clock.advance(Duration::minutes(5));
        assert_eq!(state.clock.now(), start + Duration::minutes(5));
        assert_eq!(state.registry.clock().now(), state.clock.now());
    }
}
