use std::sync::Arc;

use crate::bus::CommandBus;
use crate::orchestration::Workflow;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub bus: CommandBus,
    pub workflow: Arc<Workflow>,
}

impl AppState {
    pub fn new(bus: CommandBus, workflow: Workflow) -> Self {
        Self {
            bus,
            workflow: Arc::new(workflow),
        }
    }
}
