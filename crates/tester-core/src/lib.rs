//! Hardware-independent core library for the component tester
//!
//! This crate contains all platform-agnostic logic for identifying an unknown
//! two-terminal component (resistor, capacitor, inductor or diode) wired
//! between a pair of test points: the test point abstraction, averaged
//! sampling, the four estimators, the classification aggregator, the
//! snapshot publication shared with the serving tasks and the stored Wi-Fi
//! credentials record.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both the
//! ESP32-S3 target and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod classification;
pub mod config;
pub mod credentials;
pub mod error;
pub mod estimators;
pub mod orchestrator;
pub mod publish;
pub mod report;
pub mod sampler;
pub mod test_point;
pub mod timing;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use classification::{
    ClassificationSnapshot, ClassificationState, ComponentKind, ComponentReading, NodeId, Slot,
};
pub use config::{BoardConfig, ConfigError, MeasurementConfig, TestPointConfig};
pub use credentials::{CredentialsError, StoredCredentials};
pub use error::MeasureError;
pub use orchestrator::Orchestrator;
pub use publish::{NodeStatus, NodeStatuses, SharedReadings};
pub use test_point::{PathId, PathPin, PathState, TestPoint, VoltageReader};
pub use timing::{Clock, Monotonic};
