//! Fixed-size pool of processors
//!
//! Checkout blocks while every processor is in use, which is what throttles
//! the scheduler. The returned guard puts the processor back on drop, so a
//! failed or panicking job can not leak it.

use crate::processor::Processor;
use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
struct PoolState {
    idle: Vec<Processor>,
    in_use: usize,
    peak: usize,
}

/// Processors cloned from one prototype and recycled for a whole scan
#[derive(Debug)]
pub struct ProcessorPool {
    size: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ProcessorPool {
    /// Fill a pool of `size` processors (at least one) from `prototype`
    pub fn new(prototype: &Processor, size: usize) -> Arc<Self> {
        let size = size.max(1);
        let idle = (0..size).map(|_| prototype.clone()).collect();
        Arc::new(Self {
            size,
            state: Mutex::new(PoolState {
                idle,
                in_use: 0,
                peak: 0,
            }),
            available: Condvar::new(),
        })
    }

    /// Take a processor, waiting until one is returned if necessary
    pub fn checkout(self: &Arc<Self>) -> PooledProcessor {
        let mut state = self.state.lock();
        loop {
            if let Some(processor) = state.idle.pop() {
                state.in_use += 1;
                state.peak = state.peak.max(state.in_use);
                trace!(in_use = state.in_use, "Processor checked out");
                return PooledProcessor {
                    pool: Arc::clone(self),
                    processor: Some(processor),
                };
            }
            self.available.wait(&mut state);
        }
    }

    /// Take a processor if one is idle
    pub fn try_checkout(self: &Arc<Self>) -> Option<PooledProcessor> {
        let mut state = self.state.lock();
        let processor = state.idle.pop()?;
        state.in_use += 1;
        state.peak = state.peak.max(state.in_use);
        Some(PooledProcessor {
            pool: Arc::clone(self),
            processor: Some(processor),
        })
    }

    fn checkin(&self, processor: Processor) {
        let mut state = self.state.lock();
        state.idle.push(processor);
        state.in_use -= 1;
        drop(state);
        self.available.notify_one();
    }

    /// Number of processors owned by the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Processors currently checked out
    pub fn in_use(&self) -> usize {
        self.state.lock().in_use
    }

    /// Highest number of simultaneous checkouts seen
    pub fn peak(&self) -> usize {
        self.state.lock().peak
    }

    /// Run `f` on every idle processor
    pub fn for_each_idle<F>(&self, mut f: F)
    where
        F: FnMut(&mut Processor),
    {
        let mut state = self.state.lock();
        for processor in state.idle.iter_mut() {
            f(processor);
        }
    }
}

/// A checked-out processor; returns to its pool when dropped
#[derive(Debug)]
pub struct PooledProcessor {
    pool: Arc<ProcessorPool>,
    processor: Option<Processor>,
}

impl Deref for PooledProcessor {
    type Target = Processor;

    fn deref(&self) -> &Processor {
        // Only `drop` takes the processor out
        self.processor.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledProcessor {
    fn deref_mut(&mut self) -> &mut Processor {
        self.processor.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledProcessor {
    fn drop(&mut self) {
        if let Some(processor) = self.processor.take() {
            self.pool.checkin(processor);
        }
    }
}
