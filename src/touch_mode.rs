//! Timed touch-mode command schedule
//!
//! The touch controller needs fingerprint touch mode switched on around
//! illumination: once at activation start, once more 200ms later because the
//! controller sometimes misses the first command, then back off 600ms after
//! the retry. Nothing in the schedule can be cancelled once posted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::constants::{schedule, status, touch};
use crate::hal::HardwareServiceProxy;
use crate::scheduler::SerialScheduler;

/// What happens to delayed tasks whose activation has been superseded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleTaskPolicy {
    /// Every posted task fires. A previous activation's disable can land in
    /// the middle of the next activation and switch touch mode off early.
    Faithful,
    /// Tasks only fire while their activation is still the latest one
    #[default]
    TokenGuarded,
}

/// Identifies one `configure()` call; strictly increasing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActivationToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchModeIntent {
    EnablePass1,
    EnableRetry,
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchModePhase {
    Idle,
    /// First enable sent, retry pending
    EnablingPass1,
    /// Retry sent, revert pending
    EnablingRetry,
    Disabling,
}

/// One vendor touch-mode command and where it sits in the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchModeCommand {
    pub group: i32,
    pub feature: i32,
    pub value: i32,
    /// Delay relative to the previous step
    pub offset: Duration,
    pub intent: TouchModeIntent,
}

impl TouchModeCommand {
    pub const fn enable_pass1() -> Self {
        Self::fod(touch::VALUE_ENABLE, Duration::ZERO, TouchModeIntent::EnablePass1)
    }

    pub const fn enable_retry() -> Self {
        Self::fod(touch::VALUE_ENABLE, schedule::RETRY_DELAY, TouchModeIntent::EnableRetry)
    }

    pub const fn scheduled_disable() -> Self {
        Self::fod(touch::VALUE_DISABLE, schedule::DISABLE_DELAY, TouchModeIntent::Disable)
    }

    /// Disable sent directly on teardown, outside the schedule
    pub const fn immediate_disable() -> Self {
        Self::fod(touch::VALUE_DISABLE, Duration::ZERO, TouchModeIntent::Disable)
    }

    const fn fod(value: i32, offset: Duration, intent: TouchModeIntent) -> Self {
        Self {
            group: touch::GROUP,
            feature: touch::FEATURE_FOD,
            value,
            offset,
            intent,
        }
    }
}

/// The three commands of one activation, in order
pub fn activation_schedule() -> [TouchModeCommand; 3] {
    [
        TouchModeCommand::enable_pass1(),
        TouchModeCommand::enable_retry(),
        TouchModeCommand::scheduled_disable(),
    ]
}

/// Issues the touch-mode schedule on a dedicated serial queue
pub struct TouchModeSequencer {
    inner: Arc<Inner>,
}

struct Inner {
    hal: HardwareServiceProxy,
    scheduler: Arc<dyn SerialScheduler>,
    policy: StaleTaskPolicy,
    current: AtomicU64,
    phase: Mutex<TouchModePhase>,
}

impl TouchModeSequencer {
    pub fn new(
        hal: HardwareServiceProxy,
        scheduler: Arc<dyn SerialScheduler>,
        policy: StaleTaskPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                hal,
                scheduler,
                policy,
                current: AtomicU64::new(0),
                phase: Mutex::new(TouchModePhase::Idle),
            }),
        }
    }

    pub fn phase(&self) -> TouchModePhase {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send the first enable now and post the retry and revert
    ///
    /// Blocks the caller for one vendor round-trip.
    pub fn start_activation(&self, token: ActivationToken) {
        self.inner.current.store(token.0, Ordering::SeqCst);
        info!(activation = token.0, "Starting touch mode schedule");

        let [pass1, retry, disable] = activation_schedule();
        self.inner.set_phase(TouchModePhase::EnablingPass1);
        self.inner.issue(pass1);

        let inner = self.inner.clone();
        self.inner.scheduler.post_delayed(
            retry.offset,
            Box::new(move || {
                if !inner.is_live(token, retry.intent) {
                    return;
                }
                inner.set_phase(TouchModePhase::EnablingRetry);
                inner.issue(retry);

                let after_retry = inner.clone();
                inner.scheduler.post_delayed(
                    disable.offset,
                    Box::new(move || {
                        if !after_retry.is_live(token, disable.intent) {
                            return;
                        }
                        after_retry.set_phase(TouchModePhase::Disabling);
                        after_retry.issue(disable);
                        after_retry.set_phase(TouchModePhase::Idle);
                    }),
                );
            }),
        );
    }

    /// Switch touch mode off right now on the calling thread
    ///
    /// Does not touch the posted schedule.
    pub fn disable_now(&self) {
        self.inner.issue(TouchModeCommand::immediate_disable());
    }
}

impl Inner {
    fn is_live(&self, token: ActivationToken, intent: TouchModeIntent) -> bool {
        match self.policy {
            StaleTaskPolicy::Faithful => true,
            StaleTaskPolicy::TokenGuarded => {
                let current = self.current.load(Ordering::SeqCst);
                if current != token.0 {
                    debug!(activation = token.0, current = current, intent = ?intent, "Skipping touch mode task from superseded activation");
                    return false;
                }
                true
            }
        }
    }

    fn set_phase(&self, phase: TouchModePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn issue(&self, command: TouchModeCommand) {
        match self.hal.set_touch_mode(command.group, command.feature, command.value) {
            Ok(code) if code == status::OK => {
                debug!(intent = ?command.intent, value = command.value, "Touch mode applied");
            }
            Ok(code) => {
                warn!(intent = ?command.intent, value = command.value, status = code, "Touch mode command returned non-zero status");
            }
            Err(e) => {
                error!(intent = ?command.intent, value = command.value, error = %e, "Touch mode command failed");
            }
        }
    }
}
