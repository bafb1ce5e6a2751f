//! Two-range divider measurement of an unknown resistance.
//!
//! For each ordering the low-side node is sunk through R0 and the high-side
//! node sourced through a reference path. Both node voltages are averaged in
//! that configuration.
//!
//! - Low range (R1): the current is sensed across the low-side shunt
//!   (R0 plus the sinking pin), `R = Vy/Vx * Rshunt - Rshunt`.
//! - High range (R2): the reference forms a divider with the unknown and the
//!   pin resistance is negligible, `R = Rref * (Vy - Vx) / (Vsupply - Vy)`.

use log::debug;

use super::release;
use crate::config::MeasurementConfig;
use crate::sampler;
use crate::test_point::{PathId, PathPin, TestPoint, VoltageReader};
use crate::timing::Clock;

/// Smallest voltage step of a 12-bit conversion across the supply.
fn adc_step(config: &MeasurementConfig) -> f32 {
    config.supply_volts / 4096.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResistanceEstimate {
    /// Mean of both orderings through R1
    pub low_range_ohms: f32,
    /// Mean of both orderings through R2
    pub high_range_ohms: f32,
    /// Low range below the split, high range otherwise
    pub ohms: f32,
}

/// Low-range formula. `vx` is floored at `floor` so the result stays finite.
pub fn low_range_ohms(vx: f32, vy: f32, shunt_ohms: f32, floor: f32) -> f32 {
    vy / vx.max(floor) * shunt_ohms - shunt_ohms
}

/// High-range divider formula. `Vsupply - Vy` is floored at `floor`.
pub fn high_range_ohms(vx: f32, vy: f32, ref_ohms: f32, supply_volts: f32, floor: f32) -> f32 {
    ref_ohms * (vy - vx).max(0.0) / (supply_volts - vy).max(floor)
}

/// Sink `low` through R0, source `high` through `path`, settle and sample both.
async fn sample_divider<A, P, C>(
    low: &mut TestPoint<A, P>,
    high: &mut TestPoint<A, P>,
    path: PathId,
    config: &MeasurementConfig,
    clock: &mut C,
) -> (f32, f32)
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    low.set_path_low(PathId::R0);
    high.set_path_high(path);
    clock.delay_us(config.resistance_settle_us).await;

    let (v_low, v_high) = sampler::average_pair(low, high, config.sample_count);
    debug!(
        "{} divider: low-side {} {} V, high-side {} {} V",
        path.label(),
        low.name(),
        v_low.volts,
        high.name(),
        v_high.volts
    );

    release(low, high);
    (v_low.volts, v_high.volts)
}

/// Measure the resistance between `x` and `y` in both orderings and both ranges.
///
/// Never fails. With no resistor present the value is meaningless (typically
/// enormous), and it is up to the caller to treat it as an open circuit.
pub async fn measure_resistance<A, P, C>(
    x: &mut TestPoint<A, P>,
    y: &mut TestPoint<A, P>,
    config: &MeasurementConfig,
    clock: &mut C,
) -> ResistanceEstimate
where
    A: VoltageReader,
    P: PathPin,
    C: Clock,
{
    let floor = adc_step(config);
    let shunt = config.shunt_ohms();
    let high_ref = config.path(PathId::R2);

    let (vx, vy) = sample_divider(x, y, PathId::R1, config, clock).await;
    let low_xy = low_range_ohms(vx, vy, shunt, floor);
    let (vy, vx) = sample_divider(y, x, PathId::R1, config, clock).await;
    let low_yx = low_range_ohms(vy, vx, shunt, floor);

    let (vx, vy) = sample_divider(x, y, PathId::R2, config, clock).await;
    let high_xy = high_range_ohms(vx, vy, high_ref, config.supply_volts, floor);
    let (vy, vx) = sample_divider(y, x, PathId::R2, config, clock).await;
    let high_yx = high_range_ohms(vy, vx, high_ref, config.supply_volts, floor);

    let low_range_ohms = (low_xy + low_yx) / 2.0;
    let high_range_ohms = (high_xy + high_yx) / 2.0;
    let ohms = if low_range_ohms < config.range_split_ohms {
        low_range_ohms
    } else {
        high_range_ohms
    };

    debug!(
        "Resistance {}-{}: low range {} Ω, high range {} Ω",
        x.name(),
        y.name(),
        low_range_ohms,
        high_range_ohms
    );

    ResistanceEstimate {
        low_range_ohms,
        high_range_ohms,
        ohms,
    }
}
