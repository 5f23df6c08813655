//! Overlay display configuration state machine
//!
//! `configure` turns the illumination on: overlay shown, touch-mode schedule
//! started, vendor told illumination is starting, display-mode boost
//! requested, and once the boost is in effect and the surface exists the dot
//! is drawn and the caller's completion callback runs. `unconfigure` undoes
//! all of it and can be called from any state.
//!
//! `configure` and `unconfigure` make blocking vendor calls on the calling
//! thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::constants::ext_cmd;
use crate::display_mode::DisplayModeProvider;
use crate::hal::HardwareServiceProxy;
use crate::surface::SurfaceLifecycleManager;
use crate::touch_mode::{ActivationToken, TouchModeSequencer};
use crate::types::{OverlayGeometry, Rect, SharedGeometry};
use crate::view::ViewController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationState {
    Unconfigured,
    Configuring,
    Configured,
}

/// Optional and required collaborators of the controller
pub struct Collaborators {
    pub view: Arc<dyn ViewController>,
    /// Absent: no boost, illumination proceeds immediately
    pub display_mode: Option<Arc<dyn DisplayModeProvider>>,
    /// Absent: no GHBM surface, nothing is drawn
    pub surface: Option<Arc<SurfaceLifecycleManager>>,
}

pub struct DisplayConfigurationController {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<ControllerState>,
    next_token: AtomicU64,
    geometry: SharedGeometry,
    hal: HardwareServiceProxy,
    touch: TouchModeSequencer,
    view: Arc<dyn ViewController>,
    display_mode: Option<Arc<dyn DisplayModeProvider>>,
    surface: Option<Arc<SurfaceLifecycleManager>>,
}

struct ControllerState {
    config: ConfigurationState,
    activation: Option<ActivationToken>,
    overlay_visible: bool,
}

impl DisplayConfigurationController {
    pub fn new(
        hal: HardwareServiceProxy,
        touch: TouchModeSequencer,
        geometry: SharedGeometry,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState {
                    config: ConfigurationState::Unconfigured,
                    activation: None,
                    overlay_visible: false,
                }),
                next_token: AtomicU64::new(0),
                geometry,
                hal,
                touch,
                view: collaborators.view,
                display_mode: collaborators.display_mode,
                surface: collaborators.surface,
            }),
        }
    }

    /// Start illumination; `on_configured` runs once it is fully in effect
    ///
    /// Calling again before `unconfigure` supersedes the earlier activation:
    /// its completion callback is dropped without running.
    pub fn configure(&self, on_configured: impl FnOnce() + Send + 'static) {
        let shared = &self.shared;
        let token = ActivationToken(shared.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        {
            let mut state = shared.lock();
            if state.config != ConfigurationState::Unconfigured {
                warn!(state = ?state.config, activation = token.0, "configure() called while already active, superseding");
            }
            state.config = ConfigurationState::Configuring;
            state.activation = Some(token);
            state.overlay_visible = true;
        }
        info!(activation = token.0, "Configuring display for illumination");

        shared.view.on_display_configuring();
        if let Some(surface) = &shared.surface {
            surface.set_visible(true);
        }

        shared.touch.start_activation(token);

        if let Err(e) = shared.hal.set_extended_fingerprint_command(ext_cmd::ENABLE) {
            error!(activation = token.0, error = %e, "Failed to send extended fingerprint enable");
        }

        let on_configured: Box<dyn FnOnce() + Send> = Box::new(on_configured);
        let ready = shared.clone();
        let on_boost_ready = move || ready.on_boost_ready(token, on_configured);
        match &shared.display_mode {
            Some(provider) => provider.enable(Box::new(on_boost_ready)),
            None => on_boost_ready(),
        }
    }

    /// Tear illumination down; safe from any state and safe to repeat
    pub fn unconfigure(&self) {
        let shared = &self.shared;
        let previous = {
            let mut state = shared.lock();
            let previous = state.config;
            state.config = ConfigurationState::Unconfigured;
            state.overlay_visible = false;
            previous
        };
        info!(previous = ?previous, "Unconfiguring display");

        shared.view.on_display_unconfigured();
        if let Some(provider) = &shared.display_mode {
            provider.disable(None);
        }
        if let Some(surface) = &shared.surface {
            surface.cancel();
            surface.set_visible(false);
        }

        if let Err(e) = shared.hal.set_extended_fingerprint_command(ext_cmd::DISABLE) {
            error!(error = %e, "Failed to send extended fingerprint disable");
        }
        shared.touch.disable_now();
    }

    /// Layout pass: record new geometry and tell the view controller
    pub fn on_layout(&self, sensor_rect: Rect, display_rect: Rect) {
        self.shared.geometry.set(OverlayGeometry { sensor_rect, display_rect });
        self.shared.view.on_sensor_rect_updated(sensor_rect);
    }

    pub fn doze_time_tick(&self) {
        self.shared.view.doze_time_tick();
    }

    pub fn state(&self) -> ConfigurationState {
        self.shared.lock().config
    }

    pub fn is_configured(&self) -> bool {
        self.state() != ConfigurationState::Unconfigured
    }

    /// Debug overlays must stay off while illumination is active
    pub fn should_draw_debug_overlay(&self) -> bool {
        !self.is_configured()
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.shared.lock().overlay_visible
    }

    /// Most recent activation, if `configure` was ever called
    pub fn activation(&self) -> Option<ActivationToken> {
        self.shared.lock().activation
    }

    pub fn geometry(&self) -> OverlayGeometry {
        self.shared.geometry.get()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_configuring(&self, token: ActivationToken) -> bool {
        let state = self.lock();
        state.activation == Some(token) && state.config == ConfigurationState::Configuring
    }

    fn on_boost_ready(
        self: Arc<Self>,
        token: ActivationToken,
        on_configured: Box<dyn FnOnce() + Send>,
    ) {
        if !self.is_configuring(token) {
            debug!(activation = token.0, "Display mode ready for an activation that is no longer live, dropping");
            return;
        }
        match self.surface.clone() {
            Some(surface) => {
                debug!(activation = token.0, "Display mode ready, waiting for illumination surface");
                surface.arm(Box::new(move || self.finish(token, on_configured)));
            }
            None => self.finish(token, on_configured),
        }
    }

    fn finish(&self, token: ActivationToken, on_configured: Box<dyn FnOnce() + Send>) {
        {
            let mut state = self.lock();
            if state.activation != Some(token) || state.config != ConfigurationState::Configuring {
                debug!(activation = token.0, state = ?state.config, "Illumination finished after teardown, not reporting");
                return;
            }
            state.config = ConfigurationState::Configured;
        }
        info!(activation = token.0, "Display configured");
        on_configured();
    }
}
