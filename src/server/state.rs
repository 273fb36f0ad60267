use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::pool::PoolLanes;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub lanes: Arc<PoolLanes>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, lanes: Arc<PoolLanes>) -> Self {
        Self {
            settings: Arc::new(settings),
            lanes,
            start_time: Instant::now(),
        }
    }
}
