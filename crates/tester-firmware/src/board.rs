//! Board wiring and the hardware bindings of the tester-core seams.
//!
//! Three test points, each on its own ADC1 channel with three reference path
//! GPIOs. The table below is the single source of GPIO numbers; `main` hands
//! the matching peripherals to [`BoardAdc::new`] and [`DualModePin::new`].

use core::cell::RefCell;

use embassy_time::{Instant, Timer};
use embedded_hal_async::delay::DelayNs;
use esp_hal::Blocking;
use esp_hal::analog::adc::{
    Adc, AdcCalCurve, AdcCalScheme, AdcChannel, AdcConfig, AdcPin, Attenuation,
};
use esp_hal::peripherals::{ADC1, GPIO1, GPIO2, GPIO3};
use tester_core::config::TestPointConfig;
use tester_core::{BoardConfig, Monotonic, VoltageReader};

use crate::dual_mode_pin::DualModePin;

pub const TEST_POINTS: [TestPointConfig; 3] = [
    TestPointConfig {
        name: "TP1",
        adc_gpio: 1,
        path_gpios: [4, 5, 6],
    },
    TestPointConfig {
        name: "TP2",
        adc_gpio: 2,
        path_gpios: [7, 15, 16],
    },
    TestPointConfig {
        name: "TP3",
        adc_gpio: 3,
        path_gpios: [17, 18, 8],
    },
];

pub fn board_config() -> BoardConfig {
    BoardConfig::with_all_pairs(&TEST_POINTS)
}

type Adc1 = ADC1<'static>;
type Calibration = AdcCalCurve<Adc1>;

/// ADC1 with one calibrated channel per test point.
pub struct BoardAdc {
    adc: Adc<'static, Adc1, Blocking>,
    tp1: AdcPin<GPIO1<'static>, Adc1, Calibration>,
    tp2: AdcPin<GPIO2<'static>, Adc1, Calibration>,
    tp3: AdcPin<GPIO3<'static>, Adc1, Calibration>,
}

impl BoardAdc {
    pub fn new(adc1: Adc1, tp1: GPIO1<'static>, tp2: GPIO2<'static>, tp3: GPIO3<'static>) -> Self {
        let mut config = AdcConfig::new();
        // 11 dB covers the full node swing up to the 3.3 V rail.
        let tp1 = config.enable_pin_with_cal::<_, Calibration>(tp1, Attenuation::_11dB);
        let tp2 = config.enable_pin_with_cal::<_, Calibration>(tp2, Attenuation::_11dB);
        let tp3 = config.enable_pin_with_cal::<_, Calibration>(tp3, Attenuation::_11dB);

        Self {
            adc: Adc::new(adc1, config),
            tp1,
            tp2,
            tp3,
        }
    }

    fn read_millivolts(&mut self, node: usize) -> u16 {
        match node {
            0 => oneshot(&mut self.adc, &mut self.tp1),
            1 => oneshot(&mut self.adc, &mut self.tp2),
            _ => oneshot(&mut self.adc, &mut self.tp3),
        }
    }
}

fn oneshot<PIN, CS>(adc: &mut Adc<'static, Adc1, Blocking>, pin: &mut AdcPin<PIN, Adc1, CS>) -> u16
where
    PIN: AdcChannel,
    CS: AdcCalScheme<Adc1>,
{
    // A conversion completes in a few microseconds.
    loop {
        if let Ok(millivolts) = adc.read_oneshot(pin) {
            return millivolts;
        }
    }
}

/// One test point's view of the shared ADC.
pub struct NodeAdc {
    adc: &'static RefCell<BoardAdc>,
    node: usize,
}

impl NodeAdc {
    pub const fn new(adc: &'static RefCell<BoardAdc>, node: usize) -> Self {
        Self { adc, node }
    }
}

impl VoltageReader for NodeAdc {
    fn read_volts(&mut self) -> f32 {
        f32::from(self.adc.borrow_mut().read_millivolts(self.node)) / 1_000.0
    }
}

pub type BoardTestPoint = tester_core::TestPoint<NodeAdc, DualModePin<'static>>;

/// Embassy timer backed [`tester_core::Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbassyClock;

impl Monotonic for EmbassyClock {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

impl DelayNs for EmbassyClock {
    async fn delay_ns(&mut self, ns: u32) {
        Timer::after_nanos(u64::from(ns)).await;
    }

    async fn delay_us(&mut self, us: u32) {
        Timer::after_micros(u64::from(us)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        Timer::after_millis(u64::from(ms)).await;
    }
}
