use log::{debug, warn};

use super::release;
use crate::config::MeasurementConfig;
use crate::error::MeasureError;
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader};
use crate::timing::{Clock, Pacer};

/// Short both nodes to ground through their R0 paths until neither holds charge.
///
/// With `residual_guard` set, both nodes are first read fully floating and the
/// run aborts with [`MeasureError::LargeResidualCharge`] if either sits above
/// the large-charge threshold. Dumping that much charge through the pins is
/// left to the operator.
///
/// Both nodes are driven low when this returns `Ok`, and floated otherwise.
pub async fn discharge<A, P, C>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
    max_polls: u32,
    residual_guard: bool,
) -> Result<(), MeasureError>
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    if residual_guard {
        release(x, y);
        let vx = x.read_averaged_voltage(config.sample_count).volts;
        let vy = y.read_averaged_voltage(config.sample_count).volts;
        let residual = vx.max(vy);
        if residual > config.large_charge_volts {
            warn!(
                "Residual charge of {} V across {}-{}, discharge manually",
                residual,
                x.name(),
                y.name()
            );
            return Err(MeasureError::LargeResidualCharge { volts: residual });
        }
    }

    x.set_path_low(PathId::R0);
    y.set_path_low(PathId::R0);

    let mut pacer = Pacer::new(config.discharge_poll_ms.saturating_mul(1_000), max_polls);
    while pacer.tick(clock).await {
        let vx = x.read_averaged_voltage(config.sample_count).volts;
        let vy = y.read_averaged_voltage(config.sample_count).volts;
        if vx < config.discharged_volts && vy < config.discharged_volts {
            debug!(
                "{}-{} discharged after {} polls ({} V, {} V)",
                x.name(),
                y.name(),
                pacer.polls(),
                vx,
                vy
            );
            return Ok(());
        }
    }

    warn!(
        "{}-{} still charged after {} polls",
        x.name(),
        y.name(),
        pacer.polls()
    );
    release(x, y);
    Err(MeasureError::DischargeTimeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::testing::Rig;
    use crate::sim::Part;
    use crate::test_point::PathState;
    use crate::timing::Monotonic;
    use embassy_futures::block_on;

    #[test]
    fn test_discharges_small_capacitor() {
        let mut rig = Rig::with(Part::capacitor(100e-6));
        rig.bench.precharge(2.5);
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();

        let result = block_on(discharge(x, y, &config, &mut clock, 25, true));
        assert_eq!(result, Ok(()));
        assert_eq!(x.path_state(PathId::R0), PathState::DriveLow);
        // One 200 ms poll is enough for a 8 ms time constant.
        assert_eq!(clock.now_millis(), 200);
    }

    #[test]
    fn test_large_residual_charge_aborts_before_driving() {
        let mut rig = Rig::with(Part::capacitor(100e-6));
        rig.bench.precharge(3.29);
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();

        let result = block_on(discharge(x, y, &config, &mut clock, 25, true));
        assert!(matches!(
            result,
            Err(MeasureError::LargeResidualCharge { volts }) if volts > 3.2
        ));
        assert_eq!(clock.now_micros(), 0);
        assert!(rig.all_floating());
    }

    #[test]
    fn test_timeout_leaves_nodes_floating() {
        // A 50 F supercapacitor cannot drain through 80 Ω in five seconds.
        let mut rig = Rig::with(Part::capacitor(50.0));
        rig.bench.precharge(3.0);
        let config = rig.config.clone();
        let mut clock = rig.clock.clone();
        let (x, y) = rig.pair();

        let result = block_on(discharge(x, y, &config, &mut clock, 25, true));
        assert_eq!(result, Err(MeasureError::DischargeTimeout));
        assert_eq!(clock.now_millis(), 25 * 200);
        assert!(rig.all_floating());
    }
}
