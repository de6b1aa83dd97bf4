use std::fmt;
use std::sync::Arc;

use mpo3d_camera::StereoCamera;
use mpo3d_image::ImageBuffer;
use mpo3d_surface::Mesh;

/// Borrowed view of the orchestrator state, valid for one notification.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    pub(crate) image: Option<&'a ImageBuffer>,
    pub(crate) mesh: Option<&'a Mesh>,
    pub(crate) camera: &'a StereoCamera,
}

impl<'a> StateView<'a> {
    pub fn image(&self) -> Option<&'a ImageBuffer> {
        self.image
    }

    pub fn mesh(&self) -> Option<&'a Mesh> {
        self.mesh
    }

    pub fn camera(&self) -> &'a StereoCamera {
        self.camera
    }
}

/// Receiver of state-change notifications.
pub trait Observer {
    fn update(&self, state: &StateView<'_>);
}

/// Ordered set of observers, compared by identity.
#[derive(Default, Clone)]
pub struct NotificationBus {
    observers: Vec<Arc<dyn Observer>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` at the end of the list. Returns false if it was
    /// already registered.
    pub fn attach(&mut self, observer: Arc<dyn Observer>) -> bool {
        if self.contains(&observer) {
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Remove `observer`. Returns false if it was not registered.
    pub fn detach(&mut self, observer: &Arc<dyn Observer>) -> bool {
        match self.observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
            Some(idx) => {
                self.observers.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, observer: &Arc<dyn Observer>) -> bool {
        self.observers.iter().any(|o| Arc::ptr_eq(o, observer))
    }

    /// Call every observer in registration order.
    pub fn notify(&self, state: &StateView<'_>) {
        for observer in &self.observers {
            observer.update(state);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}
