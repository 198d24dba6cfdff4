pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod logs;
pub mod runner;

use std::sync::Arc;
use config::Config;
use runner::ProcessRunner;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub runner: ProcessRunner,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let runner = ProcessRunner::new(config.runner.clone());
        Self {
            config: Arc::new(config),
            runner,
        }
    }
}
