//! SceneContext: shared state every component is constructed with.
//!
//! Holds the frozen configuration, the frame counter and the identity of
//! the owner thread. The owner thread is the thread that built the context;
//! record release, garbage collection, registration and queue draining are
//! only legal there.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};
use crate::config::SceneConfig;
use crate::error::Result;

/// Explicit replacement for engine-wide globals (cvars, frame id, main thread)
#[derive(Debug)]
pub struct SceneContext {
    config: SceneConfig,
    owner_thread: ThreadId,
    frame_id: AtomicU32,
}

impl SceneContext {
    /// Validate `config` and bind the context to the calling thread
    pub fn new(config: SceneConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            owner_thread: thread::current().id(),
            frame_id: AtomicU32::new(0),
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Current frame id (starts at 0, bumped by `advance_frame`)
    pub fn frame_id(&self) -> u32 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// Start a new frame. Owner thread only.
    pub fn advance_frame(&self) -> u32 {
        self.ensure_owner_thread("SceneContext::advance_frame");
        self.frame_id.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn owner_thread(&self) -> ThreadId {
        self.owner_thread
    }

    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner_thread
    }

    /// Terminate if called off the owner thread
    ///
    /// The violation is logged at ERROR, then the process aborts. Unit tests
    /// of this crate observe a panic instead.
    pub fn ensure_owner_thread(&self, operation: &str) {
        if !self.is_owner_thread() {
            crate::engine_error!(
                "galaxy3d::SceneContext",
                "{} called from {:?}, owner is {:?}",
                operation,
                thread::current().id(),
                self.owner_thread
            );
            contract_violation(operation);
        }
    }
}

#[cfg(not(test))]
fn contract_violation(_operation: &str) -> ! {
    std::process::abort()
}

#[cfg(test)]
fn contract_violation(operation: &str) -> ! {
    panic!("{} must run on the scene owner thread", operation);
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
