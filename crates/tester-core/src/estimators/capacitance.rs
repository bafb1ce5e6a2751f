//! RC rise-time measurement of an unknown capacitance.
//!
//! After a discharge, one node is sunk through R0 and the other sourced
//! through R1. The charge loop is sampled at a fixed pace until the voltage
//! across the part reaches `fraction * Vsupply`. From the RC charging law
//! `v(t) = Vsupply * (1 - e^(-t/RC))` the time to reach that fraction is
//! `t = RC * ln(1 / (1 - fraction))`. Charge left over from the discharge
//! phase is taken into account by starting the curve at the first sample.

use log::{debug, warn};

use super::{discharge, release};
use crate::config::MeasurementConfig;
use crate::error::MeasureError;
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader};
use crate::timing::{Clock, Pacer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacitanceEstimate {
    pub microfarads: f32,
    /// Time from the start of the charge to the threshold crossing
    pub rise_time_us: u64,
}

/// Capacitance for a measured rise time through `loop_ohms`, charging from
/// `start_fraction` to `threshold_fraction` of the supply.
pub fn capacitance_microfarads(
    rise_time_us: u64,
    loop_ohms: f32,
    start_fraction: f32,
    threshold_fraction: f32,
) -> f32 {
    let time_constants = libm::logf((1.0 - start_fraction) / (1.0 - threshold_fraction));
    let seconds = rise_time_us as f32 / 1_000_000.0;
    seconds / (loop_ohms * time_constants) * 1_000_000.0
}

/// Flags a junction clamp: two consecutive samples inside the plateau band
/// that moved by no more than `stall_volts`. A charging capacitor crosses the
/// band without stalling, however slowly.
#[derive(Debug, Clone)]
struct PlateauDetector {
    band: (f32, f32),
    stall_volts: f32,
    previous: Option<f32>,
}

impl PlateauDetector {
    fn new(config: &MeasurementConfig) -> Self {
        Self {
            band: config.diode_band_volts,
            stall_volts: config.plateau_stall_volts,
            previous: None,
        }
    }

    fn observe(&mut self, volts: f32) -> bool {
        let (low, high) = self.band;
        if !(low..=high).contains(&volts) {
            self.previous = None;
            return false;
        }
        let stalled = self
            .previous
            .is_some_and(|previous| (volts - previous).abs() <= self.stall_volts);
        self.previous = Some(volts);
        stalled
    }
}

/// Threshold crossing of one charge run.
struct Rise {
    elapsed_us: u64,
    start_volts: f32,
}

/// Charge phase for one ordering. `low` is sunk through R0, `high` sourced through R1.
async fn charge<A, P, C>(
    low: &mut TestPoint<A, P>,
    high: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Result<Rise, MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    let threshold = config.charge_threshold_volts();

    low.set_path_low(PathId::R0);
    high.set_path_high(PathId::R1);
    let start = clock.now_micros();

    let first = high.read_voltage() - low.read_voltage();
    if first >= threshold {
        debug!(
            "{} already at {} V on the first sample, nothing is storing charge",
            high.name(),
            first
        );
        return Err(MeasureError::NoCapacitorDetected);
    }

    let mut plateau = PlateauDetector::new(config);
    let mut pacer = Pacer::new(config.charge_poll_us, config.charge_max_polls);
    while pacer.tick(clock).await {
        let v_high = high.read_voltage();
        let across = v_high - low.read_voltage();
        let elapsed = clock.now_micros().saturating_sub(start);

        if across >= threshold {
            debug!(
                "{}-{} crossed {} V after {} µs ({} polls)",
                low.name(),
                high.name(),
                threshold,
                elapsed,
                pacer.polls()
            );
            return Ok(Rise {
                elapsed_us: elapsed,
                start_volts: first,
            });
        }

        if plateau.observe(v_high) {
            debug!("{} clamped at {} V", high.name(), v_high);
            return Err(MeasureError::DiodeSuspected);
        }
    }

    Err(MeasureError::ChargeTimeout)
}

/// Discharge then charge in both orderings, keeping the most recent success.
///
/// A large residual charge aborts immediately. Otherwise the error of the
/// last ordering is returned when neither ordering produced a rise time.
pub async fn measure_capacitance<A, P, C>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Result<CapacitanceEstimate, MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    let loop_ohms = config.charge_loop_ohms();
    let mut last: Result<CapacitanceEstimate, MeasureError> =
        Err(MeasureError::NoCapacitorDetected);

    for forward in [true, false] {
        let run = async {
            discharge(x, y, config, clock, config.capacitor_discharge_polls, true).await?;
            if forward {
                charge(x, y, config, clock).await
            } else {
                charge(y, x, config, clock).await
            }
        };
        let result = run.await;
        release(x, y);

        match result {
            Ok(rise) => {
                last = Ok(CapacitanceEstimate {
                    microfarads: capacitance_microfarads(
                        rise.elapsed_us,
                        loop_ohms,
                        rise.start_volts / config.supply_volts,
                        config.charge_threshold_fraction,
                    ),
                    rise_time_us: rise.elapsed_us,
                });
            }
            Err(e @ MeasureError::LargeResidualCharge { .. }) => return Err(e),
            Err(e) => {
                warn!("Capacitance {}-{} aborted: {}", x.name(), y.name(), e);
                if last.is_err() {
                    last = Err(e);
                }
            }
        }
    }

    last
}
