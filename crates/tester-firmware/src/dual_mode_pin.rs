//! Tri-state reference path pins for ESP32-S3
//!
//! Each reference path is a GPIO behind a resistor that must be able to drive
//! high, drive low, or release the node entirely. esp-hal configures the pin as
//! a GPIO output once; from then on the output enable and level are switched
//! with raw register writes so a path can float without giving up the pin.

use core::ptr::write_volatile;

use esp_hal::gpio::{Level, Output, OutputConfig, OutputPin};
use tester_core::PathPin;

// ESP32-S3 GPIO register addresses for GPIO 0-31 (low bank)
const GPIO_OUT_W1TS_REG: u32 = 0x6000_4008; // Set output bits
const GPIO_OUT_W1TC_REG: u32 = 0x6000_400C; // Clear output bits
const GPIO_ENABLE_W1TS_REG: u32 = 0x6000_4020; // Enable output mode
const GPIO_ENABLE_W1TC_REG: u32 = 0x6000_4024; // Disable output mode (enable input)

// ESP32-S3 GPIO register addresses for GPIO 32-48 (high bank)
const GPIO_OUT1_W1TS_REG: u32 = 0x6000_4014; // Set output bits
const GPIO_OUT1_W1TC_REG: u32 = 0x6000_4018; // Clear output bits
const GPIO_ENABLE1_W1TS_REG: u32 = 0x6000_4030; // Enable output mode
const GPIO_ENABLE1_W1TC_REG: u32 = 0x6000_4034; // Disable output mode (enable input)

struct Registers {
    out_set: u32,
    out_clear: u32,
    enable_set: u32,
    enable_clear: u32,
    bit: u32,
}

/// A reference path GPIO that can be switched between push-pull output and
/// high impedance at run time.
pub struct DualModePin<'d> {
    registers: Registers,
    // Keeps esp-hal's ownership of the pin and its IO MUX configuration.
    _output: Output<'d>,
}

impl<'d> DualModePin<'d> {
    /// Take ownership of `pin`, whose GPIO number is `gpio`, and release it.
    ///
    /// `gpio` must be the number of `pin`; the board table supplies both.
    pub fn new(pin: impl OutputPin + 'd, gpio: u8) -> Self {
        let output = Output::new(pin, Level::Low, OutputConfig::default());
        let registers = if gpio < 32 {
            Registers {
                out_set: GPIO_OUT_W1TS_REG,
                out_clear: GPIO_OUT_W1TC_REG,
                enable_set: GPIO_ENABLE_W1TS_REG,
                enable_clear: GPIO_ENABLE_W1TC_REG,
                bit: 1u32 << gpio,
            }
        } else {
            Registers {
                out_set: GPIO_OUT1_W1TS_REG,
                out_clear: GPIO_OUT1_W1TC_REG,
                enable_set: GPIO_ENABLE1_W1TS_REG,
                enable_clear: GPIO_ENABLE1_W1TC_REG,
                bit: 1u32 << (gpio - 32),
            }
        };

        let pin = Self {
            registers,
            _output: output,
        };
        pin.set_as_input();
        pin
    }

    fn write(&self, reg: u32) {
        let bit = self.registers.bit;
        critical_section::with(|_| unsafe {
            write_volatile(reg as *mut u32, bit);
        });
    }

    /// Switches the pin to input mode
    pub fn set_as_input(&self) {
        self.write(self.registers.enable_clear);
    }

    /// Switches the pin to output mode
    pub fn set_as_output(&self) {
        self.write(self.registers.enable_set);
    }

    /// Sets the output latch high (only visible in output mode)
    pub fn set_high(&self) {
        self.write(self.registers.out_set);
    }

    /// Sets the output latch low (only visible in output mode)
    pub fn set_low(&self) {
        self.write(self.registers.out_clear);
    }
}

impl PathPin for DualModePin<'_> {
    // The level is latched before the driver is enabled so the node never
    // sees the previous level.
    fn drive_high(&mut self) {
        self.set_high();
        self.set_as_output();
    }

    fn drive_low(&mut self) {
        self.set_low();
        self.set_as_output();
    }

    fn float(&mut self) {
        self.set_as_input();
    }
}
