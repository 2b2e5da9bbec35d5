use std::sync::Arc;

use crate::agent::CommandPipeline;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: CommandPipeline,
}

impl AppState {
    pub fn new(config: Config, pipeline: CommandPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
        }
    }
}
