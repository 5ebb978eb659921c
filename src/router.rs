//! Notification routing from platform event streams to application handlers.
//!
//! The router owns two single-slot subscriptions:
//!
//! - **foreground** - invoked when a push arrives while the app is active;
//!   the application renders it itself (the banner), the native UI is not
//!   re-emitted
//! - **tap** - invoked when the user taps a delivered notification; the
//!   navigation collaborator decides where to go based on `data`
//!
//! Each slot holds at most one handler. Setting a handler returns a typed
//! [`HandlerSubscription`]; unsubscribing with a stale subscription (one
//! whose handler was since replaced) leaves the newer handler in place.
//!
//! Platform listeners are registered separately through
//! [`NotificationRouter::register_listeners`], which returns a
//! [`ListenerHandle`] bundling both platform subscriptions.

use std::sync::{Arc, Mutex};

use crate::error::PushError;
use crate::notifications::{NotificationEvent, PlatformNotification};
use crate::platform::{EventStream, SharedPlatform, SubscriptionId};

/// Callback receiving a routed notification.
pub type NotificationHandler = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// The two handler slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerSlot {
    /// Notification received while in the foreground.
    Foreground,
    /// Delivered notification tapped by the user.
    Tap,
}

impl HandlerSlot {
    fn stream(self) -> EventStream {
        match self {
            Self::Foreground => EventStream::Received,
            Self::Tap => EventStream::Tapped,
        }
    }
}

/// Proof of a handler registration, used to unsubscribe it.
#[must_use = "dropping the subscription leaves the handler registered with no way to remove it"]
#[derive(Debug, PartialEq, Eq)]
pub struct HandlerSubscription {
    slot: HandlerSlot,
    id: u64,
}

impl HandlerSubscription {
    /// Slot this subscription belongs to.
    pub fn slot(&self) -> HandlerSlot {
        self.slot
    }
}

#[derive(Default)]
struct Slots {
    foreground: Option<(u64, NotificationHandler)>,
    tap: Option<(u64, NotificationHandler)>,
    next_id: u64,
}

impl Slots {
    fn get_mut(&mut self, slot: HandlerSlot) -> &mut Option<(u64, NotificationHandler)> {
        match slot {
            HandlerSlot::Foreground => &mut self.foreground,
            HandlerSlot::Tap => &mut self.tap,
        }
    }

    fn handler(&self, slot: HandlerSlot) -> Option<NotificationHandler> {
        let entry = match slot {
            HandlerSlot::Foreground => &self.foreground,
            HandlerSlot::Tap => &self.tap,
        };
        entry.as_ref().map(|(_, h)| Arc::clone(h))
    }

    fn install(&mut self, slot: HandlerSlot, handler: NotificationHandler) -> HandlerSubscription {
        let id = self.next_id;
        self.next_id += 1;
        if self.get_mut(slot).replace((id, handler)).is_some() {
            log::warn!("Replacing existing {:?} notification handler", slot);
        }
        HandlerSubscription { slot, id }
    }
}

impl std::fmt::Debug for Slots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slots")
            .field("foreground", &self.foreground.as_ref().map(|(id, _)| id))
            .field("tap", &self.tap.as_ref().map(|(id, _)| id))
            .finish()
    }
}

/// Platform subscriptions held by a router registration.
///
/// Not `Clone`: teardown consumes the subscriptions it holds, so a second
/// [`NotificationRouter::unregister_listeners`] call is a no-op.
#[derive(Debug)]
pub struct ListenerHandle {
    received: Option<SubscriptionId>,
    tapped: Option<SubscriptionId>,
}

impl ListenerHandle {
    /// Whether any platform subscription is still held.
    pub fn is_active(&self) -> bool {
        self.received.is_some() || self.tapped.is_some()
    }
}

/// Routes platform notification events to the foreground and tap handlers.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    platform: SharedPlatform,
    slots: Arc<Mutex<Slots>>,
}

impl NotificationRouter {
    /// Create a router over `platform`. No listeners are registered yet.
    pub fn new(platform: SharedPlatform) -> Self {
        Self {
            platform,
            slots: Arc::new(Mutex::new(Slots::default())),
        }
    }

    /// Register the foreground handler, replacing any previous one.
    pub fn set_foreground_handler<F>(&self, handler: F) -> HandlerSubscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.lock().install(HandlerSlot::Foreground, Arc::new(handler))
    }

    /// Register the foreground handler only if the slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::SlotOccupied`] if another handler holds the slot.
    pub fn try_set_foreground_handler<F>(&self, handler: F) -> Result<HandlerSubscription, PushError>
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let mut slots = self.lock();
        if slots.foreground.is_some() {
            return Err(PushError::SlotOccupied);
        }
        Ok(slots.install(HandlerSlot::Foreground, Arc::new(handler)))
    }

    /// Register the tap handler, replacing any previous one.
    pub fn set_tap_handler<F>(&self, handler: F) -> HandlerSubscription
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.lock().install(HandlerSlot::Tap, Arc::new(handler))
    }

    /// Remove the handler registered by `subscription`.
    ///
    /// Returns `false` if that handler was already replaced or removed; a
    /// newer handler in the same slot is left untouched.
    pub fn unsubscribe(&self, subscription: HandlerSubscription) -> bool {
        let mut slots = self.lock();
        let entry = slots.get_mut(subscription.slot);
        if entry.as_ref().is_some_and(|(id, _)| *id == subscription.id) {
            *entry = None;
            log::debug!("Removed {:?} notification handler", subscription.slot);
            true
        } else {
            false
        }
    }

    /// Whether a handler currently occupies `slot`.
    pub fn has_handler(&self, slot: HandlerSlot) -> bool {
        self.lock().handler(slot).is_some()
    }

    /// Subscribe to the platform's received and tapped streams.
    pub fn register_listeners(&self) -> ListenerHandle {
        let received = self.listen(HandlerSlot::Foreground);
        let tapped = self.listen(HandlerSlot::Tap);
        log::info!("Notification listeners registered");
        ListenerHandle {
            received: Some(received),
            tapped: Some(tapped),
        }
    }

    fn listen(&self, slot: HandlerSlot) -> SubscriptionId {
        let slots = Arc::clone(&self.slots);
        self.platform.subscribe(
            slot.stream(),
            Arc::new(move |content| {
                dispatch(&slots, slot, content);
            }),
        )
    }

    /// Tear down the platform subscriptions held by `handle`.
    ///
    /// Idempotent: subscriptions are taken out of the handle, so calling this
    /// again (or with subscriptions the platform already dropped) does nothing.
    pub fn unregister_listeners(&self, handle: &mut ListenerHandle) {
        let mut removed = 0;
        for id in [handle.received.take(), handle.tapped.take()].into_iter().flatten() {
            if self.platform.remove_subscription(id) {
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Notification listeners removed ({removed})");
        }
    }

    /// Route a notification received while in the foreground.
    ///
    /// Returns `true` if a handler was invoked.
    pub fn handle_received(&self, content: PlatformNotification) -> bool {
        dispatch(&self.slots, HandlerSlot::Foreground, content)
    }

    /// Route a tapped notification.
    ///
    /// Returns `true` if a handler was invoked.
    pub fn handle_tapped(&self, content: PlatformNotification) -> bool {
        dispatch(&self.slots, HandlerSlot::Tap, content)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().expect("router slots mutex poisoned")
    }
}

/// Invoke the handler in `slot`, outside the lock.
fn dispatch(slots: &Mutex<Slots>, slot: HandlerSlot, content: PlatformNotification) -> bool {
    let event = NotificationEvent::from(content);
    let handler = slots
        .lock()
        .expect("router slots mutex poisoned")
        .handler(slot);

    match slot {
        HandlerSlot::Foreground => log::info!("Foreground notification: {}", event),
        HandlerSlot::Tap => log::info!(
            "Notification tapped: {} (newsId: {:?})",
            event,
            event.news_id()
        ),
    }
    log::debug!("Notification data: {:?}", event.data);

    match handler {
        Some(handler) => {
            handler(&event);
            true
        }
        None => {
            log::debug!("No {:?} handler registered, dropping notification", slot);
            false
        }
    }
}
