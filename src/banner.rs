//! In-app notification banner state.
//!
//! At most one banner is on screen. Its lifecycle:
//!
//! ```text
//! Hidden ──show──▶ Showing ──deadline / close / press──▶ Dismissing ──exit done──▶ Hidden
//!                    ▲  │
//!                    └──┘ show (replace event, re-arm)
//! ```
//!
//! [`Banner`] is a plain state machine driven by explicit `now` instants:
//! callers poll [`Banner::tick`] at [`Banner::next_deadline`]. The
//! [`SharedBanner`] wrapper adds locking and a tokio driver task that does
//! the polling.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::constants::{BANNER_DISPLAY_DURATION, BANNER_EXIT_DURATION};
use crate::notifications::{NotificationData, NotificationEvent};

/// Callback invoked with the `data` payload when the banner is pressed.
pub type PressCallback = Arc<dyn Fn(&NotificationData) + Send + Sync>;

/// Lifecycle phase of the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerPhase {
    /// Nothing on screen.
    Hidden,
    /// Displayed, waiting for the auto-dismiss deadline.
    Showing,
    /// Exit animation running.
    Dismissing,
}

/// Display timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BannerTiming {
    /// How long a banner stays up before auto-dismissing.
    pub display: Duration,
    /// Length of the exit animation.
    pub exit: Duration,
}

impl Default for BannerTiming {
    fn default() -> Self {
        Self {
            display: BANNER_DISPLAY_DURATION,
            exit: BANNER_EXIT_DURATION,
        }
    }
}

/// Snapshot of what the UI should render.
#[derive(Debug, Clone, PartialEq)]
pub struct BannerState {
    /// The event being shown or animating out.
    pub current: Option<NotificationEvent>,
    /// Whether the banner is visible (not dismissing).
    pub visible: bool,
}

/// A press that still has to be delivered to the press callback.
///
/// Returned by [`Banner::press`] so the callback runs after the caller
/// releases whatever lock guards the banner.
#[must_use = "the press callback only runs when the pending press is dispatched"]
pub struct PendingPress {
    data: NotificationData,
    callback: Option<PressCallback>,
}

impl PendingPress {
    /// The pressed event's data payload.
    pub fn data(&self) -> &NotificationData {
        &self.data
    }

    /// Invoke the press callback, if one is registered.
    ///
    /// Returns `true` if a callback ran.
    pub fn dispatch(self) -> bool {
        match self.callback {
            Some(callback) => {
                callback(&self.data);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PendingPress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPress")
            .field("data", &self.data)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Single-banner state machine.
pub struct Banner {
    phase: BannerPhase,
    current: Option<NotificationEvent>,
    deadline: Option<Instant>,
    timing: BannerTiming,
    on_press: Option<PressCallback>,
}

impl std::fmt::Debug for Banner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Banner")
            .field("phase", &self.phase)
            .field("current", &self.current)
            .field("deadline", &self.deadline)
            .field("timing", &self.timing)
            .field("has_press_handler", &self.on_press.is_some())
            .finish()
    }
}

impl Default for Banner {
    fn default() -> Self {
        Self::new()
    }
}

impl Banner {
    /// Hidden banner with default timings.
    pub fn new() -> Self {
        Self::with_timing(BannerTiming::default())
    }

    /// Hidden banner with custom timings.
    pub fn with_timing(timing: BannerTiming) -> Self {
        Self {
            phase: BannerPhase::Hidden,
            current: None,
            deadline: None,
            timing,
            on_press: None,
        }
    }

    /// Register the press callback, replacing any previous one.
    pub fn set_press_handler(&mut self, callback: PressCallback) {
        self.on_press = Some(callback);
    }

    /// Current phase.
    pub fn phase(&self) -> BannerPhase {
        self.phase
    }

    /// The event on screen, if any.
    pub fn current(&self) -> Option<&NotificationEvent> {
        self.current.as_ref()
    }

    /// Whether the banner is visible.
    pub fn is_visible(&self) -> bool {
        self.phase == BannerPhase::Showing
    }

    /// Render snapshot.
    pub fn state(&self) -> BannerState {
        BannerState {
            current: self.current.clone(),
            visible: self.is_visible(),
        }
    }

    /// When the next transition is due, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Show `event`, replacing whatever is on screen and re-arming the
    /// auto-dismiss deadline.
    pub fn show(&mut self, event: NotificationEvent, now: Instant) {
        if let Some(previous) = &self.current {
            log::debug!("Banner replaced: {} -> {}", previous, event);
        } else {
            log::debug!("Banner shown: {}", event);
        }
        self.current = Some(event);
        self.phase = BannerPhase::Showing;
        self.deadline = Some(now + self.timing.display);
    }

    /// Start dismissing. Returns `false` if the banner was not showing.
    pub fn close(&mut self, now: Instant) -> bool {
        if self.phase != BannerPhase::Showing {
            return false;
        }
        self.begin_dismiss(now);
        true
    }

    /// Press the banner: dismiss it and hand back the press to deliver.
    ///
    /// Dismisses whether or not a callback is registered. `None` if the
    /// banner was not showing.
    pub fn press(&mut self, now: Instant) -> Option<PendingPress> {
        if self.phase != BannerPhase::Showing {
            return None;
        }
        let data = self
            .current
            .as_ref()
            .map(|event| event.data.clone())
            .unwrap_or_default();
        self.begin_dismiss(now);
        Some(PendingPress {
            data,
            callback: self.on_press.clone(),
        })
    }

    fn begin_dismiss(&mut self, at: Instant) {
        self.phase = BannerPhase::Dismissing;
        self.deadline = Some(at + self.timing.exit);
    }

    /// Apply every transition due at `now`.
    ///
    /// A late tick catches up: an expired display deadline followed by an
    /// expired exit animation ends in `Hidden`. Returns `true` if the phase
    /// changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let before = self.phase;
        while let Some(deadline) = self.deadline {
            if now < deadline {
                break;
            }
            match self.phase {
                BannerPhase::Showing => self.begin_dismiss(deadline),
                BannerPhase::Dismissing => {
                    self.phase = BannerPhase::Hidden;
                    self.current = None;
                    self.deadline = None;
                    log::debug!("Banner hidden");
                }
                BannerPhase::Hidden => self.deadline = None,
            }
        }
        self.phase != before
    }
}

/// Thread-safe banner with an optional driver task.
#[derive(Debug, Clone)]
pub struct SharedBanner {
    inner: Arc<Mutex<Banner>>,
    wake: Arc<Notify>,
}

impl Default for SharedBanner {
    fn default() -> Self {
        Self::new(Banner::new())
    }
}

impl SharedBanner {
    /// Wrap `banner`.
    pub fn new(banner: Banner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(banner)),
            wake: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Banner> {
        self.inner.lock().expect("banner mutex poisoned")
    }

    /// Register the press callback.
    pub fn set_press_handler<F>(&self, callback: F)
    where
        F: Fn(&NotificationData) + Send + Sync + 'static,
    {
        self.lock().set_press_handler(Arc::new(callback));
    }

    /// Show `event` now.
    pub fn show(&self, event: NotificationEvent) {
        self.lock().show(event, Instant::now());
        self.wake.notify_one();
    }

    /// Close the banner now.
    pub fn close(&self) -> bool {
        let closed = self.lock().close(Instant::now());
        self.wake.notify_one();
        closed
    }

    /// Press the banner now, invoking the press callback outside the lock.
    ///
    /// Returns `true` if the banner was showing.
    pub fn press(&self) -> bool {
        let pending = self.lock().press(Instant::now());
        self.wake.notify_one();
        match pending {
            Some(pending) => {
                pending.dispatch();
                true
            }
            None => false,
        }
    }

    /// Apply transitions due now.
    pub fn tick(&self) -> bool {
        self.lock().tick(Instant::now())
    }

    /// Current phase.
    pub fn phase(&self) -> BannerPhase {
        self.lock().phase()
    }

    /// Render snapshot.
    pub fn state(&self) -> BannerState {
        self.lock().state()
    }

    /// Spawn a task that ticks the banner at each deadline until `cancel`
    /// fires. Must be called from within a tokio runtime.
    pub fn spawn_driver(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let banner = self.clone();
        tokio::spawn(async move {
            loop {
                let deadline = banner.lock().next_deadline();
                let sleep = async {
                    match deadline {
                        Some(at) => {
                            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = banner.wake.notified() => {}
                    () = sleep => {
                        banner.tick();
                    }
                }
            }
            log::debug!("Banner driver stopped");
        })
    }
}
