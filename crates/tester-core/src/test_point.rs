//! Test point abstraction
//!
//! A test point is one physical measurement node. It has an ADC-backed voltage
//! reader and three reference paths (R0, R1, R2), each a GPIO behind its own
//! resistor that can drive the node high, drive it low, or float.
//!
//! The three paths share one node, so at most one of them may be driven at any
//! instant. Every activation floats the other two paths before driving the
//! selected one.

use crate::classification::NodeId;
use crate::sampler::{self, SampleAverage};

/// Number of switchable reference paths per test point.
pub const PATH_COUNT: usize = 3;

/// Identifies one of the three reference paths of a test point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathId {
    /// Low-value shunt (direct pin connection)
    R0,
    /// Mid reference, e.g. 680 Ω
    R1,
    /// High reference, e.g. 470 kΩ
    R2,
}

impl PathId {
    pub const ALL: [PathId; PATH_COUNT] = [PathId::R0, PathId::R1, PathId::R2];

    pub const fn index(self) -> usize {
        match self {
            Self::R0 => 0,
            Self::R1 => 1,
            Self::R2 => 2,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::R0 => "R0",
            Self::R1 => "R1",
            Self::R2 => "R2",
        }
    }
}

/// Output state of a reference path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathState {
    DriveHigh,
    DriveLow,
    #[default]
    Floating,
}

impl PathState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DriveHigh => "high",
            Self::DriveLow => "low",
            Self::Floating => "float",
        }
    }
}

/// A GPIO that can be switched between push-pull output and high impedance input.
pub trait PathPin {
    /// Drive the pin high (output mode).
    fn drive_high(&mut self);

    /// Drive the pin low (output mode).
    fn drive_low(&mut self);

    /// Release the pin (input mode, high impedance).
    fn float(&mut self);
}

/// An instantaneous node voltage source, typically one ADC channel.
pub trait VoltageReader {
    /// Perform a single conversion and return the node voltage in volts.
    fn read_volts(&mut self) -> f32;
}

/// One physical measurement node.
pub struct TestPoint<A, P> {
    id: NodeId,
    name: &'static str,
    reader: A,
    paths: [P; PATH_COUNT],
    states: [PathState; PATH_COUNT],
}

impl<A, P> TestPoint<A, P>
where
    A: VoltageReader,
    P: PathPin,
{
    /// Create a test point with every path released.
    pub fn new(id: NodeId, name: &'static str, reader: A, paths: [P; PATH_COUNT]) -> Self {
        let mut point = Self {
            id,
            name,
            reader,
            paths,
            states: [PathState::Floating; PATH_COUNT],
        };
        point.set_all_floating();
        point
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state of every path, indexed by [`PathId::index`].
    pub fn path_states(&self) -> [PathState; PATH_COUNT] {
        self.states
    }

    pub fn path_state(&self, path: PathId) -> PathState {
        self.states[path.index()]
    }

    /// Drive the node high through `path`, floating the other two paths first.
    pub fn set_path_high(&mut self, path: PathId) {
        self.float_others(path);
        self.paths[path.index()].drive_high();
        self.states[path.index()] = PathState::DriveHigh;
    }

    /// Drive the node low through `path`, floating the other two paths first.
    pub fn set_path_low(&mut self, path: PathId) {
        self.float_others(path);
        self.paths[path.index()].drive_low();
        self.states[path.index()] = PathState::DriveLow;
    }

    pub fn set_path_floating(&mut self, path: PathId) {
        self.paths[path.index()].float();
        self.states[path.index()] = PathState::Floating;
    }

    pub fn set_all_floating(&mut self) {
        for path in PathId::ALL {
            self.set_path_floating(path);
        }
    }

    /// Single instantaneous read.
    pub fn read_voltage(&mut self) -> f32 {
        self.reader.read_volts()
    }

    /// Mean of `sample_count` back-to-back reads.
    pub fn read_averaged_voltage(&mut self, sample_count: usize) -> SampleAverage {
        sampler::average(&mut self.reader, sample_count)
    }

    fn float_others(&mut self, keep: PathId) {
        for path in PathId::ALL {
            if path != keep {
                self.set_path_floating(path);
            }
        }
    }
}

/// Borrow two distinct test points of a slice mutably.
///
/// Returns `None` when `x == y` or either index is out of range.
pub fn pair_mut<T>(points: &mut [T], x: usize, y: usize) -> Option<(&mut T, &mut T)> {
    if x == y || x >= points.len() || y >= points.len() {
        return None;
    }
    if x < y {
        let (low, high) = points.split_at_mut(y);
        Some((&mut low[x], &mut high[0]))
    } else {
        let (low, high) = points.split_at_mut(x);
        Some((&mut high[0], &mut low[y]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use proptest::prelude::*;

    #[derive(Default)]
    struct FakePin {
        driven: Option<bool>,
    }

    impl PathPin for FakePin {
        fn drive_high(&mut self) {
            self.driven = Some(true);
        }

        fn drive_low(&mut self) {
            self.driven = Some(false);
        }

        fn float(&mut self) {
            self.driven = None;
        }
    }

    struct Ramp(f32);

    impl VoltageReader for Ramp {
        fn read_volts(&mut self) -> f32 {
            self.0 += 0.1;
            self.0
        }
    }

    fn point() -> TestPoint<Ramp, FakePin> {
        TestPoint::new(
            NodeId(0),
            "TP1",
            Ramp(0.0),
            [FakePin::default(), FakePin::default(), FakePin::default()],
        )
    }

    fn active_paths(point: &TestPoint<Ramp, FakePin>) -> usize {
        point
            .path_states()
            .iter()
            .filter(|s| **s != PathState::Floating)
            .count()
    }

    #[test]
    fn test_new_point_is_floating() {
        let tp = point();
        assert_eq!(tp.path_states(), [PathState::Floating; PATH_COUNT]);
        assert!(tp.paths.iter().all(|p| p.driven.is_none()));
    }

    #[test]
    fn test_activation_floats_other_paths() {
        let mut tp = point();
        tp.set_path_high(PathId::R2);
        tp.set_path_low(PathId::R0);

        assert_eq!(tp.path_state(PathId::R0), PathState::DriveLow);
        assert_eq!(tp.path_state(PathId::R2), PathState::Floating);
        assert_eq!(tp.paths[0].driven, Some(false));
        assert_eq!(tp.paths[2].driven, None);
    }

    #[test]
    fn test_averaged_voltage() {
        let mut tp = point();
        // 0.1, 0.2, 0.3, 0.4
        let avg = tp.read_averaged_voltage(4);
        assert_eq!(avg.count, 4);
        approx::assert_relative_eq!(avg.volts, 0.25, epsilon = 1e-5);
    }

    #[test]
    fn test_pair_mut_orders() {
        let mut values = [1, 2, 3];
        let (a, b) = pair_mut(&mut values, 2, 0).unwrap();
        assert_eq!((*a, *b), (3, 1));
        assert!(pair_mut(&mut values, 1, 1).is_none());
        assert!(pair_mut(&mut values, 0, 3).is_none());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        High(usize),
        Low(usize),
        Float(usize),
        AllFloat,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..PATH_COUNT).prop_map(Op::High),
            (0..PATH_COUNT).prop_map(Op::Low),
            (0..PATH_COUNT).prop_map(Op::Float),
            Just(Op::AllFloat),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_path_driven(ops in proptest::collection::vec(op(), 0..64)) {
            let mut tp = point();
            for op in ops {
                match op {
                    Op::High(i) => tp.set_path_high(PathId::ALL[i]),
                    Op::Low(i) => tp.set_path_low(PathId::ALL[i]),
                    Op::Float(i) => tp.set_path_floating(PathId::ALL[i]),
                    Op::AllFloat => tp.set_all_floating(),
                }
                prop_assert!(active_paths(&tp) <= 1);
                let driven: Vec<_> = tp.paths.iter().filter(|p| p.driven.is_some()).collect();
                prop_assert!(driven.len() <= 1);
            }
        }
    }
}
