//! Snapshot publication shared between the orchestrator and the serving tasks.
//!
//! The orchestrator builds each cycle in its own working [`ClassificationState`]
//! and only hands over a finished copy. The lock is held for the copy in or
//! out and nothing else, so readers never block a measurement and never see a
//! half-written cycle.
//!
//! [`ClassificationState`]: crate::classification::ClassificationState

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use crate::classification::{ClassificationSnapshot, NodeId};
use crate::config::MAX_TEST_POINTS;
use crate::test_point::{PATH_COUNT, PathState};

/// Last known state of one test point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStatus {
    pub id: NodeId,
    pub name: &'static str,
    pub volts: f32,
    pub paths: [PathState; PATH_COUNT],
}

pub type NodeStatuses = Vec<NodeStatus, MAX_TEST_POINTS>;

struct Published {
    snapshot: ClassificationSnapshot,
    nodes: NodeStatuses,
}

/// Most recently published cycle plus the cooperative cancel flag.
pub struct SharedReadings {
    published: Mutex<CriticalSectionRawMutex, RefCell<Published>>,
    cancel: AtomicBool,
}

impl SharedReadings {
    pub const fn new() -> Self {
        Self {
            published: Mutex::new(RefCell::new(Published {
                snapshot: ClassificationSnapshot::EMPTY,
                nodes: Vec::new(),
            })),
            cancel: AtomicBool::new(false),
        }
    }

    /// Swap in a completed cycle and the node states observed after it.
    pub fn publish(&self, snapshot: ClassificationSnapshot, nodes: NodeStatuses) {
        self.published.lock(|cell| {
            *cell.borrow_mut() = Published { snapshot, nodes };
        });
    }

    pub fn current_snapshot(&self) -> ClassificationSnapshot {
        self.published.lock(|cell| cell.borrow().snapshot)
    }

    pub fn last_voltages(&self) -> NodeStatuses {
        self.published.lock(|cell| cell.borrow().nodes.clone())
    }

    /// Ask the running cycle to stop at its next phase boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Consume a pending cancel request.
    pub(crate) fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::AcqRel)
    }
}

impl Default for SharedReadings {
    fn default() -> Self {
        Self::new()
    }
}
