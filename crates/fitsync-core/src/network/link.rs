//! Local link signals
//!
//! The interface flag says whether a network interface is up; it says
//! nothing about whether the server can be reached. Link metadata is
//! optional and many platforms never provide it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::status::LinkInfo;

/// Platform-provided connectivity signals
pub trait LinkSignal: Send + Sync {
    /// Synchronous "interface is up" flag
    fn interface_online(&self) -> bool;

    /// Link-quality metadata, `None` when the platform has no such API
    fn link_info(&self) -> Option<LinkInfo> {
        None
    }
}

/// Link signal fed by the host through setters
///
/// On targets without interface events the flag simply stays up and the
/// probe alone decides reachability.
#[derive(Debug)]
pub struct SharedLink {
    online: AtomicBool,
    info: Mutex<Option<LinkInfo>>,
}

impl Default for SharedLink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SharedLink {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            info: Mutex::new(None),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn set_link_info(&self, info: Option<LinkInfo>) {
        *self.info.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }
}

impl LinkSignal for SharedLink {
    fn interface_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn link_info(&self) -> Option<LinkInfo> {
        *self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
