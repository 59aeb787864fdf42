//! Process-wide context
//!
//! Bundles the read-only singletons (settings, bridge registry, store
//! handle) so service code receives one explicit context instead of
//! reaching into globals. Built once in `main`, cloned cheaply.

use crate::bridge::BridgeRegistry;
use crate::config::Settings;
use crate::store::SwapStore;

use std::sync::Arc;

#[derive(Clone)]
pub struct Core {
    pub settings: Arc<Settings>,
    pub bridges: Arc<BridgeRegistry>,
    pub store: Arc<dyn SwapStore>,
}

impl Core {
    pub fn new(
        settings: Arc<Settings>,
        bridges: Arc<BridgeRegistry>,
        store: Arc<dyn SwapStore>,
    ) -> Self {
        Self {
            settings,
            bridges,
            store,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.settings.bridge.identifier
    }
}
