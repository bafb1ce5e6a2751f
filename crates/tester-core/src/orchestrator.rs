//! Measurement cycle orchestration
//!
//! One cycle runs the resistance, capacitance, inductance and diode estimators
//! in that order over every configured node pair, collects their readings in a
//! private [`ClassificationState`] and publishes the resolved snapshot.
//! Estimator failures only leave their slot empty.

use heapless::Vec;
use log::{debug, info, warn};

use crate::classification::{
    ClassificationSnapshot, ClassificationState, ComponentKind, ComponentReading,
};
use crate::config::{MAX_PAIRS, MeasurementConfig};
use crate::estimators::{
    measure_capacitance, measure_diode, measure_inductance, measure_resistance,
};
use crate::publish::{NodeStatus, NodeStatuses, SharedReadings};
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader, pair_mut};
use crate::timing::Clock;

/// Estimator order within a cycle.
const MEASUREMENT_ORDER: [ComponentKind; 4] = [
    ComponentKind::Resistor,
    ComponentKind::Capacitor,
    ComponentKind::Inductor,
    ComponentKind::Diode,
];

pub struct Orchestrator<'a, C> {
    config: MeasurementConfig,
    pairs: Vec<(usize, usize), MAX_PAIRS>,
    shared: &'a SharedReadings,
    clock: C,
    state: ClassificationState,
    cycle: u32,
}

impl<'a, C: Clock> Orchestrator<'a, C> {
    /// Pairs beyond [`MAX_PAIRS`] are ignored.
    pub fn new(
        config: MeasurementConfig,
        pairs: &[(usize, usize)],
        shared: &'a SharedReadings,
        clock: C,
    ) -> Self {
        let mut selected = Vec::new();
        for pair in pairs.iter().take(MAX_PAIRS) {
            let _ = selected.push(*pair);
        }

        Self {
            config,
            pairs: selected,
            shared,
            clock,
            state: ClassificationState::new(),
            cycle: 0,
        }
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Number of cycles completed and published.
    pub fn cycles(&self) -> u32 {
        self.cycle
    }

    pub fn current_snapshot(&self) -> ClassificationSnapshot {
        self.shared.current_snapshot()
    }

    pub fn last_voltages(&self) -> NodeStatuses {
        self.shared.last_voltages()
    }

    /// Run every estimator over every pair and publish the result.
    ///
    /// A cancel request is honoured before every estimator run on a pair. A cancelled cycle
    /// publishes nothing and returns the previously published snapshot. Every
    /// test point is floating when this returns.
    pub async fn run_full_cycle<A, P>(
        &mut self,
        points: &mut [TestPoint<A, P>],
    ) -> ClassificationSnapshot
    where
        A: VoltageReader,
        P: PathPin,
    {
        self.state.reset();
        let pairs = self.pairs.clone();

        for kind in MEASUREMENT_ORDER {
            for &(xi, yi) in &pairs {
                if self.shared.take_cancel() {
                    warn!(
                        "Cycle {} cancelled before {} on ({}, {})",
                        self.cycle + 1,
                        kind.label(),
                        xi,
                        yi
                    );
                    self.park(points).await;
                    return self.shared.current_snapshot();
                }

                let Some((x, y)) = pair_mut(points, xi, yi) else {
                    warn!("Skipping invalid pair ({}, {})", xi, yi);
                    continue;
                };
                let reading = self.measure(kind, x, y).await;
                let timestamp_ms = self.clock.now_millis();
                if self.state.record(reading, timestamp_ms) {
                    debug!("{}-{}: {}", x.name(), y.name(), reading);
                }
            }
        }

        let nodes = self.park(points).await;
        self.cycle = self.cycle.wrapping_add(1);
        let snapshot = self.state.snapshot(self.cycle);
        self.shared.publish(snapshot, nodes);

        info!("Cycle {}: {}", self.cycle, snapshot.resolved);
        snapshot
    }

    async fn measure<A, P>(
        &mut self,
        kind: ComponentKind,
        x: &mut TestPoint<A, P>,
        y: &mut TestPoint<A, P>,
    ) -> ComponentReading
    where
        A: VoltageReader,
        P: PathPin,
    {
        let config = &self.config;
        let clock = &mut self.clock;

        let result = match kind {
            ComponentKind::Resistor => {
                let estimate = measure_resistance(x, y, config, clock).await;
                if estimate.ohms.is_finite() && estimate.ohms < config.open_circuit_ohms {
                    return ComponentReading::Resistor { ohms: estimate.ohms };
                }
                debug!("{}-{} open ({} Ω)", x.name(), y.name(), estimate.ohms);
                return ComponentReading::None;
            }
            ComponentKind::Capacitor => measure_capacitance(x, y, config, clock)
                .await
                .map(|e| ComponentReading::Capacitor {
                    microfarads: e.microfarads,
                }),
            ComponentKind::Inductor => measure_inductance(x, y, config, clock)
                .await
                .map(|e| ComponentReading::Inductor {
                    millihenries: e.millihenries,
                }),
            ComponentKind::Diode => {
                measure_diode(x, y, config, clock)
                    .await
                    .map(|e| ComponentReading::Diode {
                        forward_volts: e.forward_volts,
                        anode: e.anode,
                        cathode: e.cathode,
                    })
            }
        };

        result.unwrap_or_else(|e| {
            debug!("{} on {}-{}: {}", kind.label(), x.name(), y.name(), e);
            ComponentReading::None
        })
    }

    /// Pull every node low through R1 for `park_ms`, float it, and record its
    /// resting voltage.
    async fn park<A, P>(&mut self, points: &mut [TestPoint<A, P>]) -> NodeStatuses
    where
        A: VoltageReader,
        P: PathPin,
    {
        for point in points.iter_mut() {
            point.set_path_low(PathId::R1);
        }
        self.clock.delay_ms(self.config.park_ms).await;

        let mut nodes = NodeStatuses::new();
        for point in points.iter_mut() {
            point.set_all_floating();
            let status = NodeStatus {
                id: point.id(),
                name: point.name(),
                volts: point.read_averaged_voltage(self.config.sample_count).volts,
                paths: point.path_states(),
            };
            let _ = nodes.push(status);
        }
        nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::NodeId;
    use crate::config::all_pairs;
    use crate::sim::{Bench, Part, SimAdc, SimClock, SimPin};
    use crate::test_point::PathState;
    use crate::timing::Monotonic;
    use approx::assert_relative_eq;
    use embedded_hal_async::delay::DelayNs;
    use core::sync::atomic::{AtomicBool, Ordering};
    use embassy_futures::block_on;

    fn bench_with(
        part: Part,
        nodes: usize,
        a: usize,
        b: usize,
    ) -> (Bench, alloc::vec::Vec<TestPoint<SimAdc, SimPin>>) {
        let bench = Bench::new(&MeasurementConfig::default(), nodes);
        bench.place(part, a, b);
        let points = bench.test_points();
        (bench, points)
    }

    fn orchestrator<'a>(
        bench: &Bench,
        nodes: usize,
        shared: &'a SharedReadings,
    ) -> Orchestrator<'a, SimClock> {
        Orchestrator::new(
            MeasurementConfig::default(),
            &all_pairs(nodes),
            shared,
            bench.clock(),
        )
    }

    fn all_floating(points: &[TestPoint<SimAdc, SimPin>]) -> bool {
        points
            .iter()
            .all(|tp| tp.path_states().iter().all(|s| *s == PathState::Floating))
    }

    #[test]
    fn test_resolves_resistor() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::resistor(1_000.0), 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        let ComponentReading::Resistor { ohms } = snapshot.resolved else {
            panic!("expected a resistor, got {:?}", snapshot.resolved);
        };
        assert_relative_eq!(ohms, 1_000.0, max_relative = 1e-3);
        assert_eq!(snapshot.cycle, 1);
        assert!(snapshot.slots.capacitor.is_none());
        assert!(snapshot.slots.diode.is_none());
        assert_eq!(shared.current_snapshot(), snapshot);
        assert!(all_floating(&points));
    }

    #[test]
    fn test_capacitor_outranks_its_resistance_reading() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::capacitor(100e-6), 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        let ComponentReading::Capacitor { microfarads } = snapshot.resolved else {
            panic!("expected a capacitor, got {:?}", snapshot.resolved);
        };
        assert_relative_eq!(microfarads, 100.0, max_relative = 0.02);
        assert!(all_floating(&points));
    }

    #[test]
    fn test_resolves_inductor() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::inductor(10e-3, 2.0), 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        let ComponentReading::Inductor { millihenries } = snapshot.resolved else {
            panic!("expected an inductor, got {:?}", snapshot.resolved);
        };
        assert_relative_eq!(millihenries, 10.0, max_relative = 0.05);
        assert!(snapshot.slots.capacitor.is_none());
    }

    #[test]
    fn test_resolves_diode_polarity() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::diode(0.65), 2, 1, 0);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        let ComponentReading::Diode {
            forward_volts,
            anode,
            cathode,
        } = snapshot.resolved
        else {
            panic!("expected a diode, got {:?}", snapshot.resolved);
        };
        assert_eq!(anode, NodeId(1));
        assert_eq!(cathode, NodeId(0));
        assert_relative_eq!(forward_volts, 0.65, epsilon = 1e-3);
    }

    #[test]
    fn test_open_pair_reports_nothing() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::Open, 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        assert_eq!(snapshot.resolved, ComponentReading::None);
        assert_eq!(snapshot.slots, ClassificationState::new());
    }

    #[test]
    fn test_finds_part_on_third_pair() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::resistor(4_700.0), 3, 1, 2);
        let mut orchestrator = orchestrator(&bench, 3, &shared);

        let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
        let ComponentReading::Resistor { ohms } = snapshot.resolved else {
            panic!("expected a resistor, got {:?}", snapshot.resolved);
        };
        assert_relative_eq!(ohms, 4_700.0, max_relative = 1e-3);

        let nodes = shared.last_voltages();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[2].name, "TP3");
        assert!(nodes.iter().all(|n| n.paths == [PathState::Floating; 3]));
        assert!(all_floating(&points));
    }

    #[test]
    fn test_cycles_are_independent() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::capacitor(10e-6), 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let first = block_on(orchestrator.run_full_cycle(&mut points));
        assert_eq!(first.resolved.kind(), Some(ComponentKind::Capacitor));

        // Swapping the part clears the capacitor slot on the next cycle.
        bench.place(Part::resistor(220.0), 0, 1);
        let second = block_on(orchestrator.run_full_cycle(&mut points));
        assert_eq!(second.cycle, 2);
        assert!(second.slots.capacitor.is_none());
        assert_eq!(second.resolved.kind(), Some(ComponentKind::Resistor));
    }

    #[test]
    fn test_cancel_publishes_nothing_and_floats() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::resistor(1_000.0), 2, 0, 1);
        let mut orchestrator = orchestrator(&bench, 2, &shared);

        let first = block_on(orchestrator.run_full_cycle(&mut points));

        shared.request_cancel();
        let returned = block_on(orchestrator.run_full_cycle(&mut points));
        assert_eq!(returned, first);
        assert_eq!(shared.current_snapshot(), first);
        assert_eq!(orchestrator.cycles(), 1);
        assert!(!shared.cancel_requested());
        assert!(all_floating(&points));
        assert!((0..2).all(|n| bench.path_states(n) == [PathState::Floating; 3]));
    }

    /// Bench clock that raises a cancel request on its first delay.
    struct CancelOnFirstDelay<'a> {
        inner: SimClock,
        shared: &'a SharedReadings,
        armed: bool,
    }

    impl Monotonic for CancelOnFirstDelay<'_> {
        fn now_micros(&self) -> u64 {
            self.inner.now_micros()
        }
    }

    impl DelayNs for CancelOnFirstDelay<'_> {
        async fn delay_ns(&mut self, ns: u32) {
            if self.armed {
                self.armed = false;
                self.shared.request_cancel();
            }
            self.inner.delay_ns(ns).await;
        }
    }

    #[test]
    fn test_cancel_stops_between_pairs() {
        let shared = SharedReadings::new();
        let (bench, mut points) = bench_with(Part::resistor(1_000.0), 3, 0, 1);
        let clock = CancelOnFirstDelay {
            inner: bench.clock(),
            shared: &shared,
            armed: true,
        };
        let mut orchestrator =
            Orchestrator::new(MeasurementConfig::default(), &all_pairs(3), &shared, clock);

        let single_pair = {
            let (bench, mut points) = bench_with(Part::resistor(1_000.0), 2, 0, 1);
            let mut clock = bench.clock();
            let config = MeasurementConfig::default();
            let (x, y) = points.split_at_mut(1);
            block_on(measure_resistance(&mut x[0], &mut y[0], &config, &mut clock));
            bench.adc_reads()
        };

        let returned = block_on(orchestrator.run_full_cycle(&mut points));
        assert_eq!(returned, ClassificationSnapshot::EMPTY);
        assert_eq!(orchestrator.cycles(), 0);
        assert!(!shared.cancel_requested());
        assert!(all_floating(&points));

        // The first resistance run plus the park reads, nothing from pairs 2 and 3.
        let park_reads = 3 * MeasurementConfig::default().sample_count as u64;
        assert_eq!(bench.adc_reads(), single_pair + park_reads);
    }

    #[test]
    fn test_reader_sees_only_completed_cycles() {
        let shared = SharedReadings::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let snapshot = shared.current_snapshot();
                    assert_eq!(snapshot.resolved, snapshot.slots.resolve());
                    if snapshot.cycle > 0 {
                        assert!(snapshot.slots.resistor.is_some());
                        assert!(shared.last_voltages().len() <= 2);
                    }
                }
            });

            // The simulated bench is single-threaded, so it stays on this thread.
            let (bench, mut points) = bench_with(Part::resistor(330.0), 2, 0, 1);
            let mut orchestrator = orchestrator(&bench, 2, &shared);
            for _ in 0..3 {
                block_on(orchestrator.run_full_cycle(&mut points));
            }
            done.store(true, Ordering::Release);
        });

        assert_eq!(shared.current_snapshot().cycle, 3);
    }
}
