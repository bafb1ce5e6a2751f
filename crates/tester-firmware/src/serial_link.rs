//! UART report stream
//!
//! Every published snapshot goes out as one COBS framed postcard record for
//! the host serial bridge.

use esp_hal::Async;
use esp_hal::uart::UartTx;
use log::{debug, error};
use tester_core::report::{FRAME_CAPACITY, encode_frame};

use crate::app_error::{AppError, describe};
use crate::{CYCLE_DONE, READINGS};

pub const BAUD_RATE: u32 = 115_200;

async fn send_latest(tx: &mut UartTx<'static, Async>) -> Result<(), AppError> {
    let snapshot = READINGS.current_snapshot();
    let mut buf = [0u8; FRAME_CAPACITY];
    let frame = encode_frame(&snapshot, &mut buf)?;

    let mut pending: &[u8] = frame;
    while !pending.is_empty() {
        let written = tx
            .write_async(pending)
            .await
            .map_err(|e| AppError::Serial(describe(e)))?;
        pending = &pending[written..];
    }
    tx.flush_async()
        .await
        .map_err(|e| AppError::Serial(describe(e)))?;

    debug!("Sent report for cycle {} ({} bytes)", snapshot.cycle, frame.len());
    Ok(())
}

#[embassy_executor::task]
pub async fn serial_task(mut tx: UartTx<'static, Async>) {
    loop {
        CYCLE_DONE.wait().await;
        if let Err(e) = send_latest(&mut tx).await {
            error!("{}", e);
        }
    }
}
