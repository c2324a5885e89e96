use crate::error::{PublishError, Result};
use crate::platform::adapter::SiteAdapter;
use crate::platform::automation::SiteAutomation;
use crate::task::TaskManager;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every configured site, built once at start-up
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    automations: Arc<BTreeMap<String, Arc<SiteAutomation>>>,
}

impl PlatformRegistry {
    /// Later automations with the same platform id replace earlier ones
    pub fn new(automations: impl IntoIterator<Item = SiteAutomation>) -> Self {
        let automations = automations
            .into_iter()
            .map(|automation| (automation.platform().to_string(), Arc::new(automation)))
            .collect();
        Self {
            automations: Arc::new(automations),
        }
    }

    pub fn automation(&self, platform: &str) -> Result<Arc<SiteAutomation>> {
        self.automations
            .get(platform)
            .cloned()
            .ok_or_else(|| PublishError::PlatformUnsupported(platform.to_string()))
    }

    /// Adapter for `platform` backed by the shared task manager
    pub fn adapter(&self, platform: &str, tasks: &TaskManager) -> Result<SiteAdapter> {
        Ok(SiteAdapter::new(self.automation(platform)?, tasks.clone()))
    }

    /// Supported platform ids, sorted
    pub fn supported_platforms(&self) -> Vec<String> {
        self.automations.keys().cloned().collect()
    }

    pub fn is_supported(&self, platform: &str) -> bool {
        self.automations.contains_key(platform)
    }
}

impl std::fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformRegistry")
            .field("platforms", &self.supported_platforms())
            .finish()
    }
}
