//! Component estimators
//!
//! Each estimator drives a pair of test points through their reference
//! paths, samples the resulting voltages and infers one component value.
//! All of them leave both test points fully floating when they return,
//! whether they succeeded or aborted.

mod capacitance;
mod diode;
mod discharge;
mod inductance;
mod resistance;

pub use capacitance::{CapacitanceEstimate, capacitance_microfarads, measure_capacitance};
pub use diode::{DiodeEstimate, measure_diode};
pub use discharge::discharge;
pub use inductance::{InductanceEstimate, inductance_millihenries, measure_inductance};
pub use resistance::{
    ResistanceEstimate, high_range_ohms, low_range_ohms, measure_resistance,
};

use crate::test_point::{PathPin, TestPoint, VoltageReader};

/// Release every path of both test points.
pub(crate) fn release<A, P>(x: &mut TestPoint<A, P>, y: &mut TestPoint<A, P>)
where
    A: VoltageReader,
    P: PathPin,
{
    x.set_all_floating();
    y.set_all_floating();
}

#[cfg(test)]
pub(crate) mod testing {
    use alloc::vec::Vec;

    use crate::config::MeasurementConfig;
    use crate::sim::{Bench, Part, SimAdc, SimClock, SimPin};
    use crate::test_point::{PathState, TestPoint};

    pub(crate) struct Rig {
        pub bench: Bench,
        pub points: Vec<TestPoint<SimAdc, SimPin>>,
        pub clock: SimClock,
        pub config: MeasurementConfig,
    }

    impl Rig {
        /// Two-node bench with `part` wired from TP1 to TP2.
        pub fn with(part: Part) -> Self {
            let config = MeasurementConfig::default();
            let bench = Bench::new(&config, 2);
            bench.place(part, 0, 1);
            let points = bench.test_points();
            let clock = bench.clock();
            Self {
                bench,
                points,
                clock,
                config,
            }
        }

        pub fn pair(&mut self) -> (&mut TestPoint<SimAdc, SimPin>, &mut TestPoint<SimAdc, SimPin>) {
            let (x, y) = self.points.split_at_mut(1);
            (&mut x[0], &mut y[0])
        }

        pub fn all_floating(&self) -> bool {
            self.points.iter().all(|tp| {
                tp.path_states()
                    .iter()
                    .all(|s| *s == PathState::Floating)
            }) && (0..self.points.len()).all(|node| {
                self.bench
                    .path_states(node)
                    .iter()
                    .all(|s| *s == PathState::Floating)
            })
        }
    }
}
