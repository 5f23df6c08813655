//! Fakes shared by the unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::color::IlluminationColor;
use crate::display_mode::{DisplayModeProvider, ModeCallback};
use crate::hal::{HalError, HalStatus, VendorHal};
use crate::scheduler::VirtualScheduler;
use crate::surface::{DrawError, RenderSurface};
use crate::types::Rect;
use crate::view::ViewController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalCall {
    ExtCmd { enrollment_id: i32, enable: i32 },
    SetTouchMode { group: i32, feature: i32, value: i32 },
}

/// Records every vendor call, optionally stamped with virtual time
#[derive(Default)]
pub struct RecordingHal {
    calls: Mutex<Vec<(Duration, HalCall)>>,
    status: HalStatus,
    unavailable: bool,
    clock: Option<Arc<VirtualScheduler>>,
}

impl RecordingHal {
    pub fn with_status(status: HalStatus) -> Self {
        Self { status, ..Self::default() }
    }

    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    pub fn with_clock(clock: Arc<VirtualScheduler>) -> Self {
        Self { clock: Some(clock), ..Self::default() }
    }

    pub fn calls(&self) -> Vec<HalCall> {
        self.calls.lock().unwrap().iter().map(|(_, call)| *call).collect()
    }

    pub fn touch_values(&self) -> Vec<i32> {
        self.touch_timeline().into_iter().map(|(_, value)| value).collect()
    }

    /// (virtual time, value) of every touch-mode call
    pub fn touch_timeline(&self) -> Vec<(Duration, i32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, call)| match call {
                HalCall::SetTouchMode { value, .. } => Some((*at, *value)),
                HalCall::ExtCmd { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: HalCall) -> Result<(), HalError> {
        let at = self.clock.as_ref().map(|c| c.now()).unwrap_or_default();
        self.calls.lock().unwrap().push((at, call));
        if self.unavailable {
            return Err(HalError::Unavailable("fake service not registered".to_string()));
        }
        Ok(())
    }
}

impl VendorHal for RecordingHal {
    fn ext_cmd(&self, enrollment_id: i32, enable: i32) -> Result<(), HalError> {
        self.record(HalCall::ExtCmd { enrollment_id, enable })
    }

    fn set_touch_mode(&self, group: i32, feature: i32, value: i32) -> Result<HalStatus, HalError> {
        self.record(HalCall::SetTouchMode { group, feature, value })?;
        Ok(self.status)
    }
}

/// Counts invocations of the callbacks it hands out
#[derive(Clone, Default)]
pub struct CallbackCounter(Arc<AtomicUsize>);

impl CallbackCounter {
    pub fn callback(&self) -> Box<dyn FnOnce() + Send + 'static> {
        let count = self.0.clone();
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailMode {
    #[default]
    None,
    NoFrame,
    DrawError,
    Panic,
}

/// Surface that records draws and frame lock/unlock counts
#[derive(Default)]
pub struct CountingSurface {
    fail: FailMode,
    draws: Mutex<Vec<(Rect, IlluminationColor)>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CountingSurface {
    pub fn failing(fail: FailMode) -> Self {
        Self { fail, ..Self::default() }
    }

    pub fn draws(&self) -> Vec<(Rect, IlluminationColor)> {
        self.draws.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl RenderSurface for CountingSurface {
    fn lock_frame(&self) -> Result<(), DrawError> {
        if self.fail == FailMode::NoFrame {
            return Err(DrawError::NoFrame);
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fill_oval(&self, bounds: Rect, color: IlluminationColor) -> Result<(), DrawError> {
        match self.fail {
            FailMode::DrawError => Err(DrawError::Failed("canvas rejected oval".to_string())),
            FailMode::Panic => panic!("canvas blew up"),
            FailMode::None | FailMode::NoFrame => {
                self.draws.lock().unwrap().push((bounds, color));
                Ok(())
            }
        }
    }

    fn unlock_and_post(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Display-mode provider completing immediately or on demand
#[derive(Default)]
pub struct FakeDisplayMode {
    deferred: bool,
    waiting: Mutex<VecDeque<ModeCallback>>,
    enables: AtomicUsize,
    disables: AtomicUsize,
}

impl FakeDisplayMode {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn deferred() -> Self {
        Self { deferred: true, ..Self::default() }
    }

    /// Complete the oldest outstanding enable; false if none is waiting
    pub fn complete_enable(&self) -> bool {
        let next = self.waiting.lock().unwrap().pop_front();
        match next {
            Some(on_ready) => {
                on_ready();
                true
            }
            None => false,
        }
    }

    pub fn enables(&self) -> usize {
        self.enables.load(Ordering::SeqCst)
    }

    pub fn disables(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }
}

impl DisplayModeProvider for FakeDisplayMode {
    fn enable(&self, on_ready: ModeCallback) {
        self.enables.fetch_add(1, Ordering::SeqCst);
        if self.deferred {
            self.waiting.lock().unwrap().push_back(on_ready);
        } else {
            on_ready();
        }
    }

    fn disable(&self, on_done: Option<ModeCallback>) {
        self.disables.fetch_add(1, Ordering::SeqCst);
        if let Some(on_done) = on_done {
            on_done();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    SensorRect(Rect),
    Configuring,
    Unconfigured,
    DozeTick,
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ViewController for RecordingView {
    fn on_sensor_rect_updated(&self, rect: Rect) {
        self.push(ViewEvent::SensorRect(rect));
    }

    fn on_display_configuring(&self) {
        self.push(ViewEvent::Configuring);
    }

    fn on_display_unconfigured(&self) {
        self.push(ViewEvent::Unconfigured);
    }

    fn doze_time_tick(&self) {
        self.push(ViewEvent::DozeTick);
    }
}
