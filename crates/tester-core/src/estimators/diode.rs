//! Junction detection by polarity.
//!
//! The pair is biased one way and then the other, with the driven node on R0
//! and the sinking node on R1. A junction conducts in exactly one direction,
//! so the sinking node only lifts off ground once. Resistors and inductors
//! conduct both ways and an open pair neither.

use log::debug;

use super::{discharge, release};
use crate::classification::NodeId;
use crate::config::MeasurementConfig;
use crate::error::MeasureError;
use crate::sampler;
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader};
use crate::timing::Clock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiodeEstimate {
    pub forward_volts: f32,
    pub anode: NodeId,
    pub cathode: NodeId,
}

/// Bias `anode` high and `cathode` low. Returns the drop across the pair when
/// the cathode side rises above the conduction threshold.
async fn bias<A, P, C>(
    anode: &mut TestPoint<A, P>,
    cathode: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Option<f32>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    release(anode, cathode);
    anode.set_path_high(PathId::R0);
    cathode.set_path_low(PathId::R1);
    clock.delay_us(config.diode_settle_us).await;

    let (va, vc) = sampler::average_pair(anode, cathode, config.sample_count);
    release(anode, cathode);

    let conducts = vc.volts > config.diode_conduction_volts;
    debug!(
        "{} -> {}: {} V / {} V{}",
        anode.name(),
        cathode.name(),
        va.volts,
        vc.volts,
        if conducts { ", conducting" } else { "" }
    );
    conducts.then_some(va.volts - vc.volts)
}

/// Look for a junction between `x` and `y`.
///
/// A pair that conducts in both directions or in neither is
/// [`MeasureError::NotDetected`].
pub async fn measure_diode<A, P, C>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> Result<DiodeEstimate, MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    discharge(x, y, config, clock, config.inductor_discharge_polls, false).await?;

    let forward = bias(x, y, config, clock).await;
    let reverse = bias(y, x, config, clock).await;

    match (forward, reverse) {
        (Some(drop), None) => Ok(DiodeEstimate {
            forward_volts: drop,
            anode: x.id(),
            cathode: y.id(),
        }),
        (None, Some(drop)) => Ok(DiodeEstimate {
            forward_volts: drop,
            anode: y.id(),
            cathode: x.id(),
        }),
        _ => Err(MeasureError::NotDetected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::testing::Rig;
    use crate::sim::Part;
    use approx::assert_relative_eq;
    use embassy_futures::block_on;

    fn measure(rig: &mut Rig) -> Result<DiodeEstimate, MeasureError> {
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();
        block_on(measure_diode(x, y, &config, &mut clock))
    }

    #[test]
    fn test_finds_anode_on_first_node() {
        let mut rig = Rig::with(Part::diode(0.65));
        let estimate = measure(&mut rig).unwrap();
        assert_eq!(estimate.anode, NodeId(0));
        assert_eq!(estimate.cathode, NodeId(1));
        assert_relative_eq!(estimate.forward_volts, 0.65, epsilon = 1e-3);
        assert!(rig.all_floating());
    }

    #[test]
    fn test_finds_reversed_diode() {
        let mut rig = Rig::with(Part::diode(1.8));
        rig.bench.place(Part::diode(1.8), 1, 0);
        let estimate = measure(&mut rig).unwrap();
        assert_eq!(estimate.anode, NodeId(1));
        assert_eq!(estimate.cathode, NodeId(0));
        assert_relative_eq!(estimate.forward_volts, 1.8, epsilon = 1e-3);
    }

    #[test]
    fn test_resistor_conducts_both_ways() {
        let mut rig = Rig::with(Part::resistor(4_700.0));
        assert_eq!(measure(&mut rig), Err(MeasureError::NotDetected));
        assert!(rig.all_floating());
    }

    #[test]
    fn test_open_pair_never_conducts() {
        let mut rig = Rig::with(Part::Open);
        assert_eq!(measure(&mut rig), Err(MeasureError::NotDetected));
    }
}
