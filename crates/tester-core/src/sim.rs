//! Circuit simulator for the hardware seams.
//!
//! A [`Bench`] models N test points, the reference paths on each, and a
//! single two-terminal part wired between two of them. [`SimPin`], [`SimAdc`]
//! and [`SimClock`] implement [`PathPin`], [`VoltageReader`] and [`Clock`]
//! against it, so the estimators run unchanged in virtual time.
//!
//! Every driven node is an ideal source (0 V or supply) behind its path
//! resistor plus the pin resistance. Reactive state is advanced with the exact
//! exponential solution over each delay, during which the drive configuration
//! is constant.
//!
//! [`Clock`]: crate::timing::Clock

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embedded_hal_async::delay::DelayNs;

use crate::classification::NodeId;
use crate::config::MeasurementConfig;
use crate::test_point::{PATH_COUNT, PathId, PathPin, PathState, TestPoint, VoltageReader};
use crate::timing::Monotonic;

const NODE_NAMES: [&str; 3] = ["TP1", "TP2", "TP3"];

/// A part placed on the bench. For diodes the anode is the first node of the
/// placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Part {
    Open,
    Resistor { ohms: f64 },
    Capacitor { farads: f64, volts: f64 },
    Inductor { henries: f64, series_ohms: f64, amps: f64 },
    Diode { forward_volts: f64 },
}

impl Part {
    pub const fn resistor(ohms: f64) -> Self {
        Self::Resistor { ohms }
    }

    pub const fn capacitor(farads: f64) -> Self {
        Self::Capacitor { farads, volts: 0.0 }
    }

    pub const fn inductor(henries: f64, series_ohms: f64) -> Self {
        Self::Inductor {
            henries,
            series_ohms,
            amps: 0.0,
        }
    }

    pub const fn diode(forward_volts: f64) -> Self {
        Self::Diode { forward_volts }
    }
}

#[derive(Debug, Clone, Copy)]
struct Drive {
    volts: f64,
    ohms: f64,
}

struct BenchState {
    supply: f64,
    pin_ohms: f64,
    path_ohms: [f64; PATH_COUNT],
    paths: Vec<[PathState; PATH_COUNT]>,
    part: Part,
    a: usize,
    b: usize,
    now_ns: u64,
    adc_reads: u64,
}

impl BenchState {
    fn drive(&self, node: usize) -> Option<Drive> {
        let states = self.paths.get(node)?;
        PathId::ALL.iter().find_map(|path| {
            let ohms = self.path_ohms[path.index()] + self.pin_ohms;
            match states[path.index()] {
                PathState::DriveHigh => Some(Drive {
                    volts: self.supply,
                    ohms,
                }),
                PathState::DriveLow => Some(Drive { volts: 0.0, ohms }),
                PathState::Floating => None,
            }
        })
    }

    /// Voltages at the two terminals of the part.
    fn terminal_volts(&self) -> (f64, f64) {
        let da = self.drive(self.a);
        let db = self.drive(self.b);

        match (self.part, da, db) {
            (Part::Open, da, db) => (da.map_or(0.0, |d| d.volts), db.map_or(0.0, |d| d.volts)),

            (Part::Resistor { ohms }, Some(da), Some(db)) => {
                let amps = (da.volts - db.volts) / (da.ohms + ohms + db.ohms);
                (da.volts - amps * da.ohms, db.volts + amps * db.ohms)
            }
            (Part::Resistor { .. }, Some(da), None) => (da.volts, da.volts),
            (Part::Resistor { .. }, None, Some(db)) => (db.volts, db.volts),
            (Part::Resistor { .. }, None, None) => (0.0, 0.0),

            (Part::Capacitor { volts, .. }, Some(da), Some(db)) => {
                let amps = (da.volts - db.volts - volts) / (da.ohms + db.ohms);
                (da.volts - amps * da.ohms, db.volts + amps * db.ohms)
            }
            (Part::Capacitor { volts, .. }, Some(da), None) => (da.volts, da.volts - volts),
            (Part::Capacitor { volts, .. }, None, Some(db)) => (db.volts + volts, db.volts),
            (Part::Capacitor { volts, .. }, None, None) => (volts.max(0.0), (-volts).max(0.0)),

            (Part::Inductor { amps, .. }, Some(da), Some(db)) => {
                (da.volts - amps * da.ohms, db.volts + amps * db.ohms)
            }
            (Part::Inductor { .. }, Some(da), None) => (da.volts, da.volts),
            (Part::Inductor { .. }, None, Some(db)) => (db.volts, db.volts),
            (Part::Inductor { .. }, None, None) => (0.0, 0.0),

            (Part::Diode { forward_volts }, Some(da), Some(db)) => {
                let bias = da.volts - db.volts;
                if bias > forward_volts {
                    let amps = (bias - forward_volts) / (da.ohms + db.ohms);
                    (da.volts - amps * da.ohms, db.volts + amps * db.ohms)
                } else {
                    (da.volts, db.volts)
                }
            }
            (Part::Diode { .. }, da, db) => {
                (da.map_or(0.0, |d| d.volts), db.map_or(0.0, |d| d.volts))
            }
        }
    }

    fn node_volts(&self, node: usize) -> f64 {
        let raw = if node == self.a {
            self.terminal_volts().0
        } else if node == self.b {
            self.terminal_volts().1
        } else {
            self.drive(node).map_or(0.0, |d| d.volts)
        };
        raw.clamp(0.0, self.supply)
    }

    fn advance(&mut self, ns: u64) {
        self.now_ns += ns;
        let dt = ns as f64 * 1e-9;
        let da = self.drive(self.a);
        let db = self.drive(self.b);

        match (&mut self.part, da, db) {
            (Part::Capacitor { farads, volts }, Some(da), Some(db)) => {
                let target = da.volts - db.volts;
                let tau = (da.ohms + db.ohms) * *farads;
                *volts = target + (*volts - target) * libm::exp(-dt / tau);
            }
            (
                Part::Inductor {
                    henries,
                    series_ohms,
                    amps,
                },
                Some(da),
                Some(db),
            ) => {
                let loop_ohms = da.ohms + db.ohms + *series_ohms;
                let steady = (da.volts - db.volts) / loop_ohms;
                *amps = steady + (*amps - steady) * libm::exp(-dt * loop_ohms / *henries);
            }
            (Part::Inductor { amps, .. }, _, _) => *amps = 0.0,
            _ => {}
        }
    }
}

/// Shared simulated measurement bench.
#[derive(Clone)]
pub struct Bench {
    state: Rc<RefCell<BenchState>>,
}

impl Bench {
    /// Bench with `nodes` test points and nothing connected, using the
    /// electrical constants of `config`.
    pub fn new(config: &MeasurementConfig, nodes: usize) -> Self {
        let path_ohms = [
            f64::from(config.path_ohms[0]),
            f64::from(config.path_ohms[1]),
            f64::from(config.path_ohms[2]),
        ];
        let mut paths = Vec::with_capacity(nodes);
        paths.resize(nodes, [PathState::Floating; PATH_COUNT]);

        Self {
            state: Rc::new(RefCell::new(BenchState {
                supply: f64::from(config.supply_volts),
                pin_ohms: f64::from(config.pin_resistance_ohms),
                path_ohms,
                paths,
                part: Part::Open,
                a: 0,
                b: 1.min(nodes.saturating_sub(1)),
                now_ns: 0,
                adc_reads: 0,
            })),
        }
    }

    /// Wire `part` between nodes `a` and `b`.
    pub fn place(&self, part: Part, a: usize, b: usize) {
        let mut state = self.state.borrow_mut();
        state.part = part;
        state.a = a;
        state.b = b;
    }

    /// Set the stored voltage of a placed capacitor (first node positive).
    pub fn precharge(&self, volts: f64) {
        if let Part::Capacitor { volts: stored, .. } = &mut self.state.borrow_mut().part {
            *stored = volts;
        }
    }

    pub fn part(&self) -> Part {
        self.state.borrow().part
    }

    pub fn node_volts(&self, node: usize) -> f32 {
        self.state.borrow().node_volts(node) as f32
    }

    pub fn path_states(&self, node: usize) -> [PathState; PATH_COUNT] {
        self.state.borrow().paths[node]
    }

    pub fn adc_reads(&self) -> u64 {
        self.state.borrow().adc_reads
    }

    pub fn pin(&self, node: usize, path: PathId) -> SimPin {
        SimPin {
            state: self.state.clone(),
            node,
            path,
        }
    }

    pub fn adc(&self, node: usize) -> SimAdc {
        SimAdc {
            state: self.state.clone(),
            node,
        }
    }

    pub fn clock(&self) -> SimClock {
        SimClock {
            state: self.state.clone(),
        }
    }

    /// One test point per bench node, named TP1, TP2, ...
    pub fn test_points(&self) -> Vec<TestPoint<SimAdc, SimPin>> {
        let count = self.state.borrow().paths.len();
        (0..count)
            .map(|node| {
                TestPoint::new(
                    NodeId(node as u8),
                    NODE_NAMES.get(node).copied().unwrap_or("TP?"),
                    self.adc(node),
                    [
                        self.pin(node, PathId::R0),
                        self.pin(node, PathId::R1),
                        self.pin(node, PathId::R2),
                    ],
                )
            })
            .collect()
    }
}

pub struct SimPin {
    state: Rc<RefCell<BenchState>>,
    node: usize,
    path: PathId,
}

impl SimPin {
    fn set(&mut self, value: PathState) {
        self.state.borrow_mut().paths[self.node][self.path.index()] = value;
    }
}

impl PathPin for SimPin {
    fn drive_high(&mut self) {
        self.set(PathState::DriveHigh);
    }

    fn drive_low(&mut self) {
        self.set(PathState::DriveLow);
    }

    fn float(&mut self) {
        self.set(PathState::Floating);
    }
}

pub struct SimAdc {
    state: Rc<RefCell<BenchState>>,
    node: usize,
}

impl VoltageReader for SimAdc {
    fn read_volts(&mut self) -> f32 {
        let mut state = self.state.borrow_mut();
        state.adc_reads += 1;
        state.node_volts(self.node) as f32
    }
}

/// Virtual clock; every delay advances the bench.
#[derive(Clone)]
pub struct SimClock {
    state: Rc<RefCell<BenchState>>,
}

impl SimClock {
    /// Clock attached to an empty two-node bench.
    pub fn standalone() -> Self {
        Bench::new(&MeasurementConfig::default(), 2).clock()
    }
}

impl Monotonic for SimClock {
    fn now_micros(&self) -> u64 {
        self.state.borrow().now_ns / 1_000
    }
}

impl DelayNs for SimClock {
    async fn delay_ns(&mut self, ns: u32) {
        self.state.borrow_mut().advance(u64::from(ns));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_resistor_divider_voltages() {
        let bench = Bench::new(&MeasurementConfig::default(), 2);
        bench.place(Part::resistor(1_000.0), 0, 1);
        let mut points = bench.test_points();
        points[0].set_path_low(PathId::R0);
        points[1].set_path_high(PathId::R1);

        // 3.3 V across 40 + 1000 + 720 Ω
        approx::assert_relative_eq!(points[0].read_voltage(), 0.075, epsilon = 1e-4);
        approx::assert_relative_eq!(points[1].read_voltage(), 1.95, epsilon = 1e-4);
    }

    #[test]
    fn test_capacitor_charges_one_time_constant() {
        let bench = Bench::new(&MeasurementConfig::default(), 2);
        bench.place(Part::capacitor(100e-6), 0, 1);
        let mut points = bench.test_points();
        points[0].set_path_high(PathId::R1);
        points[1].set_path_low(PathId::R0);

        let mut clock = bench.clock();
        // tau = 760 Ω * 100 µF = 76 ms
        block_on(clock.delay_ms(76));
        let Part::Capacitor { volts, .. } = bench.part() else {
            panic!("capacitor expected");
        };
        approx::assert_relative_eq!(volts, 3.3 * (1.0 - (-1.0f64).exp()), epsilon = 1e-6);
        assert_eq!(clock.now_millis(), 76);
    }

    #[test]
    fn test_floating_nodes_hold_charge() {
        let bench = Bench::new(&MeasurementConfig::default(), 2);
        bench.place(Part::capacitor(1e-6), 0, 1);
        bench.precharge(3.0);
        assert_eq!(bench.node_volts(0), 3.0);
        assert_eq!(bench.node_volts(1), 0.0);

        let mut clock = bench.clock();
        block_on(clock.delay_ms(500));
        assert_eq!(bench.node_volts(0), 3.0);
    }

    #[test]
    fn test_reverse_biased_diode_blocks() {
        let bench = Bench::new(&MeasurementConfig::default(), 2);
        bench.place(Part::diode(0.65), 0, 1);
        let mut points = bench.test_points();
        points[1].set_path_high(PathId::R0);
        points[0].set_path_low(PathId::R1);

        assert_eq!(points[0].read_voltage(), 0.0);
        assert_eq!(points[1].read_voltage(), 3.3);
    }
}
