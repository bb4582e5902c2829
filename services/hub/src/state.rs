use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::registry::RegistryHandle;
use crate::store::{Bus, StateStore};

/// Shared handles wired into every request/connection handler. Cloning is
/// cheap -- everything behind an `Arc` or the registry's own mpsc sender.
#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<dyn Bus>,
    pub verifier: Arc<dyn TokenVerifier>,
}
