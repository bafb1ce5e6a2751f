//! ESP32-S3 firmware-specific modules for the component tester
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: GPIO register manipulation for the reference paths, the ADC and
//! clock bindings of the tester-core seams, Wi-Fi station management and the
//! HTTP and UART serving tasks.

#![no_std]

extern crate alloc;

pub mod app_error;
pub mod board;
pub mod dual_mode_pin;
pub mod serial_link;
pub mod web;
pub mod wifi;
pub mod wifi_secrets;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use tester_core::SharedReadings;

/// Published results, written by the measurement task and read by the servers.
pub static READINGS: SharedReadings = SharedReadings::new();

/// Raised with the cycle number after every published cycle.
pub static CYCLE_DONE: Signal<CriticalSectionRawMutex, u32> = Signal::new();
