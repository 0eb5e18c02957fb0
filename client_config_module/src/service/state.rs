use std::sync::Arc;

use crate::config_store::ConfigStore;
use crate::mapping_store::MappingStore;
use mailbox_module::LabelProviderFactory;
use workflow_module::TemplateRegistry;

use super::config::ServiceConfig;

/// Shared handler state. Stores and the label provider factory are trait
/// objects so tests can swap in scripted implementations.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub config_store: Arc<dyn ConfigStore>,
    pub mapping_store: Arc<dyn MappingStore>,
    pub label_providers: Arc<dyn LabelProviderFactory>,
    pub templates: Arc<TemplateRegistry>,
}
