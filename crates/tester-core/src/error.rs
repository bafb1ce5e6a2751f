//! Estimator failure taxonomy.
//!
//! Every variant is local to a single estimator run. The orchestrator logs it,
//! floats the test points, leaves the matching classification slot unset and
//! moves on to the next estimator.

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum MeasureError {
    #[error("node holds {volts} V before discharge, discharge the part by hand")]
    LargeResidualCharge { volts: f32 },
    #[error("nodes did not discharge within the retry bound")]
    DischargeTimeout,
    #[error("node reached the charge threshold on the first sample")]
    NoCapacitorDetected,
    #[error("charge curve stalled on a junction plateau")]
    DiodeSuspected,
    #[error("node never reached the charge threshold")]
    ChargeTimeout,
    #[error("sample of {volts} V is outside the model's domain")]
    InvalidSample { volts: f32 },
    #[error("companion node did not keep rising during the pulse")]
    NotInductive,
    #[error("no single-direction conduction")]
    NotDetected,
}
