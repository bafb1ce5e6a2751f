//! Tunable measurement constants and the board wiring table.
//!
//! Nothing the estimators depend on is hard-coded: reference resistances,
//! supply voltage, thresholds and every timeout live in [`MeasurementConfig`]
//! so a board can be recalibrated without touching the algorithms.

use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::test_point::{PATH_COUNT, PathId};

/// Maximum number of test points on a board.
pub const MAX_TEST_POINTS: usize = 3;

/// Maximum number of node pairs measured per cycle.
pub const MAX_PAIRS: usize = MAX_TEST_POINTS * (MAX_TEST_POINTS - 1) / 2;

/// `1 - 1/e`: the fraction of supply reached after one RC time constant.
pub const ONE_TIME_CONSTANT: f32 = 0.632_120_56;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },
    #[error("{field} must lie strictly between 0 V and the supply voltage")]
    OutsideSupply { field: &'static str },
    #[error("charge threshold fraction must lie strictly between 0 and 1")]
    ChargeFraction,
    #[error("discharged_volts must be below large_charge_volts")]
    DischargeAboveGuard,
    #[error("diode plateau band is empty")]
    EmptyDiodeBand,
    #[error("node pair ({0}, {1}) is not two distinct test points")]
    BadPair(usize, usize),
}

/// Calibration constants and timing bounds for the four estimators.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeasurementConfig {
    /// Supply rail seen by a pin driven high
    pub supply_volts: f32,
    /// Output resistance of a driving GPIO
    pub pin_resistance_ohms: f32,
    /// Resistor in series with each reference path (R0, R1, R2)
    pub path_ohms: [f32; PATH_COUNT],
    /// Reads averaged per voltage sample
    pub sample_count: usize,
    /// Settle time after reconfiguring the resistance divider
    pub resistance_settle_us: u32,
    /// Low-range results below this are reported, otherwise the high range
    pub range_split_ohms: f32,
    /// Readings at or above this are treated as an open circuit
    pub open_circuit_ohms: f32,

    /// A node above this before discharge means the part must be discharged by hand
    pub large_charge_volts: f32,
    /// Both nodes below this means discharge is complete
    pub discharged_volts: f32,
    pub discharge_poll_ms: u32,
    pub capacitor_discharge_polls: u32,
    pub inductor_discharge_polls: u32,

    /// Fraction of supply the charge phase waits for
    pub charge_threshold_fraction: f32,
    /// Plateau where an LED-like junction clamps the charging node
    pub diode_band_volts: (f32, f32),
    /// Largest change between consecutive in-band samples that counts as a clamp
    pub plateau_stall_volts: f32,
    pub charge_poll_us: u32,
    pub charge_max_polls: u32,

    pub inductor_settle_us: u32,
    pub inductor_pulse_us: u32,
    /// Minimum further rise over a second pulse interval for an inductive response
    pub inductive_rise_volts: f32,

    /// Companion node above this means the junction conducts
    pub diode_conduction_volts: f32,
    pub diode_settle_us: u32,

    /// Time every node is pulled low through R1 after a cycle
    pub park_ms: u32,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            supply_volts: 3.3,
            pin_resistance_ohms: 40.0,
            path_ohms: [0.0, 680.0, 470_000.0],
            sample_count: 10,
            resistance_settle_us: 1_000,
            range_split_ohms: 10_000.0,
            open_circuit_ohms: 10_000_000.0,

            large_charge_volts: 3.2,
            discharged_volts: 0.16,
            discharge_poll_ms: 200,
            capacitor_discharge_polls: 25,
            inductor_discharge_polls: 3,

            charge_threshold_fraction: ONE_TIME_CONSTANT,
            diode_band_volts: (1.90, 1.92),
            // 3300 µF, the largest the poll bound can time, climbs ~60 µV per poll here
            plateau_stall_volts: 0.000_02,
            charge_poll_us: 100,
            charge_max_polls: 30_000,

            inductor_settle_us: 1_000,
            inductor_pulse_us: 5,
            inductive_rise_volts: 0.05,

            diode_conduction_volts: 0.15,
            diode_settle_us: 5_000,

            park_ms: 20,
        }
    }
}

impl MeasurementConfig {
    pub fn path(&self, path: PathId) -> f32 {
        self.path_ohms[path.index()]
    }

    /// Low side current shunt: R0 plus the pin that sinks through it.
    pub fn shunt_ohms(&self) -> f32 {
        self.path(PathId::R0) + self.pin_resistance_ohms
    }

    /// Series resistance of the R1 charge loop (R1 high side, R0 low side).
    pub fn charge_loop_ohms(&self) -> f32 {
        self.path(PathId::R1) + self.pin_resistance_ohms + self.shunt_ohms()
    }

    /// Node voltage that ends the charge phase.
    pub fn charge_threshold_volts(&self) -> f32 {
        self.charge_threshold_fraction * self.supply_volts
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            (self.supply_volts, "supply_volts"),
            (self.path(PathId::R1), "path_ohms[R1]"),
            (self.path(PathId::R2), "path_ohms[R2]"),
            (self.range_split_ohms, "range_split_ohms"),
            (self.open_circuit_ohms, "open_circuit_ohms"),
            (self.inductive_rise_volts, "inductive_rise_volts"),
            (self.plateau_stall_volts, "plateau_stall_volts"),
        ];
        for (value, field) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field });
            }
        }
        if self.pin_resistance_ohms < 0.0 || self.path(PathId::R0) < 0.0 {
            return Err(ConfigError::NotPositive {
                field: "pin_resistance_ohms",
            });
        }
        if self.shunt_ohms() <= 0.0 {
            return Err(ConfigError::NotPositive {
                field: "shunt_ohms",
            });
        }
        if self.sample_count == 0 {
            return Err(ConfigError::NotPositive {
                field: "sample_count",
            });
        }
        if self.charge_max_polls == 0 {
            return Err(ConfigError::NotPositive {
                field: "charge_max_polls",
            });
        }

        let within_supply = [
            (self.large_charge_volts, "large_charge_volts"),
            (self.discharged_volts, "discharged_volts"),
            (self.diode_conduction_volts, "diode_conduction_volts"),
        ];
        for (value, field) in within_supply {
            if !(value > 0.0 && value < self.supply_volts) {
                return Err(ConfigError::OutsideSupply { field });
            }
        }

        if !(self.discharged_volts < self.large_charge_volts) {
            return Err(ConfigError::DischargeAboveGuard);
        }

        if !(self.charge_threshold_fraction > 0.0 && self.charge_threshold_fraction < 1.0) {
            return Err(ConfigError::ChargeFraction);
        }
        let (low, high) = self.diode_band_volts;
        if !(low < high) {
            return Err(ConfigError::EmptyDiodeBand);
        }
        if !(low > 0.0 && high < self.supply_volts) {
            return Err(ConfigError::OutsideSupply {
                field: "diode_band_volts",
            });
        }
        Ok(())
    }
}

/// Wiring of one test point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPointConfig {
    pub name: &'static str,
    /// GPIO number of the ADC input
    pub adc_gpio: u8,
    /// GPIO numbers of the R0, R1 and R2 paths
    pub path_gpios: [u8; PATH_COUNT],
}

/// Fixed board wiring plus the node pairs to measure.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub test_points: Vec<TestPointConfig, MAX_TEST_POINTS>,
    pub pairs: Vec<(usize, usize), MAX_PAIRS>,
}

impl BoardConfig {
    /// Board with every unordered pair of its test points selected.
    pub fn with_all_pairs(points: &[TestPointConfig]) -> Self {
        let mut test_points = Vec::new();
        for point in points.iter().take(MAX_TEST_POINTS) {
            // Capacity is MAX_TEST_POINTS and the iterator is capped to it.
            let _ = test_points.push(*point);
        }

        let pairs = all_pairs(test_points.len());
        Self { test_points, pairs }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for &(x, y) in &self.pairs {
            if x == y || x >= self.test_points.len() || y >= self.test_points.len() {
                return Err(ConfigError::BadPair(x, y));
            }
        }
        Ok(())
    }

    pub fn name(&self, index: usize) -> &'static str {
        self.test_points.get(index).map_or("?", |tp| tp.name)
    }
}

/// Every unordered pair `(i, j)` with `i < j < count`.
pub fn all_pairs(count: usize) -> Vec<(usize, usize), MAX_PAIRS> {
    let mut pairs = Vec::new();
    let count = count.min(MAX_TEST_POINTS);
    for i in 0..count {
        for j in (i + 1)..count {
            let _ = pairs.push((i, j));
        }
    }
    pairs
}

/// Station credentials for the status page.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}
