//! Lifecycle notifications forwarded to the enclosing view's controller

use tracing::{debug, info};

use crate::types::Rect;

pub trait ViewController: Send + Sync {
    fn on_sensor_rect_updated(&self, rect: Rect);
    fn on_display_configuring(&self);
    fn on_display_unconfigured(&self);
    fn doze_time_tick(&self);
}

/// View controller that only logs, for running without a UI
#[derive(Debug, Default)]
pub struct LoggingViewController;

impl ViewController for LoggingViewController {
    fn on_sensor_rect_updated(&self, rect: Rect) {
        debug!(rect = ?rect, "Sensor rect updated");
    }

    fn on_display_configuring(&self) {
        info!("Display configuring");
    }

    fn on_display_unconfigured(&self) {
        info!("Display unconfigured");
    }

    fn doze_time_tick(&self) {
        debug!("Doze time tick");
    }
}
