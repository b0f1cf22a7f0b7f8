//! Subscription handles.
//!
//! Every effect and every plain `subscribe` callback hands back an
//! [`Unsubscribe`]. Calling it detaches the subscriber for good.

use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

use super::runtime::RuntimeInner;
use crate::graph::NodeId;

/// Handle that stops an effect or a `subscribe` callback.
///
/// Dropping the handle does *not* unsubscribe: an effect keeps running until
/// [`unsubscribe`](Self::unsubscribe) is called.
pub struct Unsubscribe {
    action: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Unsubscribe {
    pub(crate) fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: RefCell::new(Some(Box::new(action))),
        }
    }

    pub(crate) fn effect(rt: Weak<RuntimeInner>, id: NodeId) -> Self {
        Self::new(move || {
            if let Some(rt) = rt.upgrade() {
                rt.dispose_effect(id);
            }
        })
    }

    /// Detach the subscriber. An effect runs its last cleanup first.
    ///
    /// Calling this more than once has no further effect.
    pub fn unsubscribe(&self) {
        let action = self.action.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether [`unsubscribe`](Self::unsubscribe) has not been called yet.
    pub fn is_active(&self) -> bool {
        self.action.borrow().is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
