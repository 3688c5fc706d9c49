//! Admission control for concurrent proxy sessions.
//!
//! The accept loop takes a slot before calling accept, so under load new
//! connections wait in the kernel listen backlog instead of inside the proxy.
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Shared state of a bounded limiter.
#[derive(Debug)]
pub struct Gate {
    in_use: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
}

/// Unbounded, or a counting gate with a fixed capacity.
#[derive(Debug, Clone)]
pub enum Limiter {
    Unbounded,
    Bounded(Arc<Gate>),
}

/// One occupied unit of capacity; returned to the limiter on drop.
#[derive(Debug)]
#[must_use = "dropping a slot releases it immediately"]
pub struct Slot {
    gate: Option<Arc<Gate>>,
}

impl Limiter {
    /// `None` or `Some(0)` means unbounded.
    pub fn new(max: Option<u32>) -> Self {
        match max {
            None | Some(0) => Limiter::Unbounded,
            Some(n) => Limiter::Bounded(Arc::new(Gate {
                in_use: Mutex::new(0),
                freed: Condvar::new(),
                capacity: n as usize,
            })),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        match self {
            Limiter::Unbounded => None,
            Limiter::Bounded(g) => Some(g.capacity),
        }
    }

    /// Block until a slot is free.
    pub fn acquire(&self) -> Slot {
        match self {
            Limiter::Unbounded => Slot { gate: None },
            Limiter::Bounded(g) => {
                let mut in_use = g.in_use.lock().unwrap_or_else(|p| p.into_inner());
                while *in_use >= g.capacity {
                    in_use = g.freed.wait(in_use).unwrap_or_else(|p| p.into_inner());
                }
                *in_use += 1;
                Slot {
                    gate: Some(g.clone()),
                }
            }
        }
    }

    /// Like `acquire`, but give up after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Slot> {
        match self {
            Limiter::Unbounded => Some(Slot { gate: None }),
            Limiter::Bounded(g) => {
                let in_use = g.in_use.lock().unwrap_or_else(|p| p.into_inner());
                let (mut in_use, _) = g
                    .freed
                    .wait_timeout_while(in_use, timeout, |n| *n >= g.capacity)
                    .unwrap_or_else(|p| p.into_inner());
                if *in_use >= g.capacity {
                    return None;
                }
                *in_use += 1;
                Some(Slot {
                    gate: Some(g.clone()),
                })
            }
        }
    }

    /// Slots currently held; always 0 when unbounded.
    pub fn in_use(&self) -> usize {
        match self {
            Limiter::Unbounded => 0,
            Limiter::Bounded(g) => *g.in_use.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(g) = self.gate.take() {
            let mut in_use = g.in_use.lock().unwrap_or_else(|p| p.into_inner());
            *in_use = in_use.saturating_sub(1);
            g.freed.notify_one();
        }
    }
}
