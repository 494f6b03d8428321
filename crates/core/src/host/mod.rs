//! Host facilities a sequence consumes: frame scheduling and viewport
//! notifications.
//!
//! Both are single-threaded and reference counted; a registration or
//! subscription handle releases itself on drop, and releasing twice is a
//! no-op.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};

use crate::{Result, SequenceError};

#[derive(Debug, Default)]
struct RegistryState {
    surface_available: bool,
    next_id: u64,
    live: usize,
    issued: u64,
}

/// Host-side frame scheduling facility.
///
/// Hands out at most one [`FrameRegistration`] per request and tracks how
/// many are live so leaks across mount/unmount cycles are observable.
#[derive(Debug, Clone)]
pub struct FrameRegistry {
    state: Rc<RefCell<RegistryState>>,
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                surface_available: true,
                ..Default::default()
            })),
        }
    }

    /// A registry whose host has no rendering surface; every request fails.
    pub fn without_surface() -> Self {
        let registry = Self::new();
        registry.state.borrow_mut().surface_available = false;
        registry
    }

    pub fn request(&self) -> Result<FrameRegistration> {
        let mut state = self.state.borrow_mut();
        if !state.surface_available {
            return Err(SequenceError::SurfaceUnavailable(
                "host has no rendering surface".into(),
            ));
        }
        state.next_id += 1;
        state.live += 1;
        state.issued += 1;
        Ok(FrameRegistration {
            id: state.next_id,
            active: Rc::new(Cell::new(true)),
            registry: Rc::downgrade(&self.state),
        })
    }

    /// Registrations currently active.
    pub fn live(&self) -> usize {
        self.state.borrow().live
    }

    /// Registrations handed out over the registry's lifetime.
    pub fn issued(&self) -> u64 {
        self.state.borrow().issued
    }
}

/// One recurring frame callback slot. Cancelling is synchronous and
/// idempotent; dropping cancels.
#[derive(Debug)]
pub struct FrameRegistration {
    id: u64,
    active: Rc<Cell<bool>>,
    registry: Weak<RefCell<RegistryState>>,
}

impl FrameRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Shared flag a frame loop polls before every iteration.
    pub fn active_flag(&self) -> ActiveFlag {
        ActiveFlag(self.active.clone())
    }

    pub fn cancel(&mut self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut state = registry.borrow_mut();
            state.live = state.live.saturating_sub(1);
        }
        tracing::trace!(registration = self.id, "frame registration cancelled");
    }
}

impl Drop for FrameRegistration {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Read-only view of a registration's active state.
#[derive(Debug, Clone)]
pub struct ActiveFlag(Rc<Cell<bool>>);

impl ActiveFlag {
    pub fn is_active(&self) -> bool {
        self.0.get()
    }
}

/// Size of the host viewport in CSS pixels plus its device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.device_pixel_ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            1.0
        };
        self
    }

    /// Backing-store size in device pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32) * self.device_pixel_ratio).round().max(1.0) as u32;
        (scale(self.width), scale(self.height))
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

type ListenerSlot = Rc<Cell<Option<Viewport>>>;

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    listeners: Vec<(u64, ListenerSlot)>,
}

/// Ambient resize notifications. Each subscriber keeps the latest viewport
/// it has not consumed yet.
#[derive(Debug, Clone, Default)]
pub struct ViewportBus {
    state: Rc<RefCell<BusState>>,
}

impl ViewportBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> ResizeSubscription {
        let slot: ListenerSlot = Rc::new(Cell::new(None));
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.listeners.push((id, slot.clone()));
        ResizeSubscription {
            id,
            slot,
            bus: Rc::downgrade(&self.state),
            removed: false,
        }
    }

    pub fn broadcast(&self, viewport: Viewport) {
        for (_, slot) in &self.state.borrow().listeners {
            slot.set(Some(viewport));
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.borrow().listeners.len()
    }
}

/// Handle to a resize listener. Removing is idempotent; dropping removes.
#[derive(Debug)]
pub struct ResizeSubscription {
    id: u64,
    slot: ListenerSlot,
    bus: Weak<RefCell<BusState>>,
    removed: bool,
}

impl ResizeSubscription {
    /// Latest viewport broadcast since the previous call, if any.
    pub fn take_pending(&self) -> Option<Viewport> {
        self.slot.take()
    }

    pub fn remove(&mut self) {
        if std::mem::replace(&mut self.removed, true) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.borrow_mut().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for ResizeSubscription {
    fn drop(&mut self) {
        self.remove();
    }
}
