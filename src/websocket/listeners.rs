use crate::types::{ClientEvent, EventKind};
use log::error;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked for client events. Identity is the `Arc` allocation, so keep a
/// clone around if you want to `off` it later.
pub type Listener = Arc<dyn Fn(&ClientEvent) + Send + Sync + 'static>;

/// Event kind -> listeners, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<EventKind, Vec<Listener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kind`. Returns `false` if it was already registered.
    pub fn add(&self, kind: EventKind, listener: Listener) -> bool {
        let mut guard = self.lock();
        let entries = guard.entry(kind).or_default();
        if entries.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        entries.push(listener);
        true
    }

    /// Removes `listener` from `kind`. Returns `false` if it was not registered.
    pub fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut guard = self.lock();
        match guard.get_mut(&kind) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|l| !same_listener(l, listener));
                entries.len() != before
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Delivers `event` to every listener of its kind and returns how many ran
    /// without panicking.
    ///
    /// Listeners are invoked outside the registry lock, so a listener may register or
    /// remove listeners; such changes apply from the next event on.
    pub fn emit(&self, event: &ClientEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.lock().get(&kind) {
            Some(entries) => entries.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        "Listener for '{:?}' event panicked: {}",
                        kind,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<Listener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    // Compare data pointers only; vtable pointers are not guaranteed unique.
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
