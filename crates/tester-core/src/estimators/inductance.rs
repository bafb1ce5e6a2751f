//! Short-pulse measurement of an unknown inductance.
//!
//! The companion node is sunk through the mid reference (R1) and the driven
//! node pulsed high through R0 for a few microseconds. Current through an
//! inductor rises as a single-pole exponential, so the voltage across the
//! sense resistor after `Δt` gives
//! `L = -Δt * Rsense / ln(1 - V / Vsupply)`.
//!
//! The pulse is held for a second interval: an inductive response keeps
//! rising, while resistors, junctions and capacitors do not.

use log::debug;

use super::{discharge, release};
use crate::config::MeasurementConfig;
use crate::error::MeasureError;
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader};
use crate::timing::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InductanceEstimate {
    pub millihenries: f32,
    /// Measured pulse length
    pub pulse_us: u64,
    /// Companion node rise at the end of the pulse
    pub volts: f32,
}

/// Inductance from the exponential model. Degenerate samples (at or above the
/// supply, at or below zero) are rejected instead of taking the logarithm.
pub fn inductance_millihenries(
    pulse_us: u64,
    volts: f32,
    sense_ohms: f32,
    supply_volts: f32,
) -> Result<f32, MeasureError> {
    if !(volts > 0.0 && volts < supply_volts) || pulse_us == 0 {
        return Err(MeasureError::InvalidSample { volts });
    }
    let seconds = pulse_us as f32 / 1_000_000.0;
    let henries = -seconds * sense_ohms / libm::logf(1.0 - volts / supply_volts);
    Ok(henries * 1_000.0)
}

async fn pulse<A, P, C>(
    driven: &mut TestPoint<A, P>,
    sense: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Result<InductanceEstimate, MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    discharge(
        driven,
        sense,
        config,
        clock,
        config.inductor_discharge_polls,
        false,
    )
    .await?;
    clock.delay_us(config.inductor_settle_us).await;

    sense.set_path_low(PathId::R1);
    let before = sense.read_voltage();

    driven.set_path_high(PathId::R0);
    let start = clock.now_micros();
    clock.delay_us(config.inductor_pulse_us).await;
    let after = sense.read_voltage();
    let pulse_us = clock.now_micros().saturating_sub(start);
    clock.delay_us(config.inductor_pulse_us).await;
    let held = sense.read_voltage();
    driven.set_path_low(PathId::R0);

    let volts = after - before;
    debug!(
        "Pulse {} -> {}: {} V before, {} V after {} µs, {} V held",
        driven.name(),
        sense.name(),
        before,
        after,
        pulse_us,
        held
    );

    let sense_ohms = config.path(PathId::R1) + config.pin_resistance_ohms;
    let millihenries = inductance_millihenries(pulse_us, volts, sense_ohms, config.supply_volts)?;

    if held - after < config.inductive_rise_volts {
        return Err(MeasureError::NotInductive);
    }

    Ok(InductanceEstimate {
        millihenries,
        pulse_us,
        volts,
    })
}

/// Discharge, settle and pulse `x` while sensing on `y`.
pub async fn measure_inductance<A, P, C>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Result<InductanceEstimate, MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    let result = pulse(x, y, config, clock).await;
    release(x, y);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::testing::Rig;
    use crate::sim::Part;
    use crate::timing::Monotonic;
    use approx::assert_relative_eq;
    use embassy_futures::block_on;

    #[test]
    fn test_degenerate_samples_are_rejected() {
        assert_eq!(
            inductance_millihenries(5, 3.3, 720.0, 3.3),
            Err(MeasureError::InvalidSample { volts: 3.3 })
        );
        assert_eq!(
            inductance_millihenries(5, 0.0, 720.0, 3.3),
            Err(MeasureError::InvalidSample { volts: 0.0 })
        );
        assert!(inductance_millihenries(5, -0.1, 720.0, 3.3).is_err());
    }

    #[test]
    fn test_small_signal_limit() {
        // For V << Vsupply the model reduces to L = Δt * R * Vsupply / V = 3.6 H
        let mh = inductance_millihenries(5, 0.0033, 720.0, 3.3).unwrap();
        assert_relative_eq!(mh, 3_600.0, max_relative = 1e-3);
    }

    fn measure(part: Part) -> (Result<InductanceEstimate, MeasureError>, Rig) {
        let mut rig = Rig::with(part);
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();
        let result = block_on(measure_inductance(x, y, &config, &mut clock));
        (result, rig)
    }

    #[test]
    fn test_measures_choke() {
        let (result, rig) = measure(Part::inductor(10e-3, 2.0));
        let estimate = result.unwrap();
        assert_relative_eq!(estimate.millihenries, 10.0, max_relative = 0.05);
        assert_eq!(estimate.pulse_us, 5);
        assert!(rig.all_floating());
    }

    #[test]
    fn test_resistor_is_not_inductive() {
        let (result, rig) = measure(Part::resistor(1_000.0));
        assert_eq!(result, Err(MeasureError::NotInductive));
        assert!(rig.all_floating());
    }

    #[test]
    fn test_capacitor_is_not_inductive() {
        let (result, _) = measure(Part::capacitor(100e-6));
        assert_eq!(result, Err(MeasureError::NotInductive));
    }

    #[test]
    fn test_open_circuit_is_invalid_sample() {
        let (result, _) = measure(Part::Open);
        assert_eq!(result, Err(MeasureError::InvalidSample { volts: 0.0 }));
    }

    #[test]
    fn test_stuck_charge_times_out() {
        let mut rig = Rig::with(Part::capacitor(50.0));
        rig.bench.precharge(3.0);
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();

        let result = block_on(measure_inductance(x, y, &config, &mut clock));
        assert_eq!(result, Err(MeasureError::DischargeTimeout));
        assert_eq!(clock.now_millis(), 3 * 200);
        assert!(rig.all_floating());
    }
}
