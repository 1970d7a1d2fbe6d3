use std::sync::Arc;

use crate::auth::Authorizer;
use crate::engine::Coordinator;
use crate::store::DocumentStore;

pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub coordinator: Arc<Coordinator>,
    pub authorizer: Arc<dyn Authorizer>,
}
