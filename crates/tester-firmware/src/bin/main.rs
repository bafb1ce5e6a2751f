#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{self, UartTx};
use esp_storage::FlashStorage;
use log::{error, info};
use static_cell::StaticCell;

use tester_core::{
    BoardConfig, MeasurementConfig, NodeId, Orchestrator, StoredCredentials, TestPoint,
};
use tester_firmware::board::{
    BoardAdc, BoardTestPoint, EmbassyClock, NodeAdc, TEST_POINTS, board_config,
};
use tester_firmware::app_error::AppError;
use tester_firmware::dual_mode_pin::DualModePin;
use tester_firmware::{CYCLE_DONE, READINGS, serial_link, web, wifi, wifi_secrets};

/// Pause between measurement cycles.
const CYCLE_INTERVAL: Duration = Duration::from_secs(1);

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static ADC: StaticCell<RefCell<BoardAdc>> = StaticCell::new();
static BOARD: StaticCell<BoardConfig> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static CREDENTIALS: StaticCell<StoredCredentials> = StaticCell::new();

#[embassy_executor::task]
async fn measurement_task(
    mut orchestrator: Orchestrator<'static, EmbassyClock>,
    mut points: [BoardTestPoint; 3],
) {
    loop {
        let snapshot = orchestrator.run_full_cycle(&mut points).await;
        CYCLE_DONE.signal(snapshot.cycle);
        Timer::after(CYCLE_INTERVAL).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized!");

    let measurement = MeasurementConfig::default();
    let board: &'static BoardConfig = BOARD.init(board_config());
    if let Err(e) = measurement
        .validate()
        .and_then(|_| board.validate())
        .map_err(AppError::from)
    {
        error!("Refusing to measure: {}", e);
        loop {
            Timer::after(Duration::from_secs(60)).await;
        }
    }

    // Test points: one ADC1 channel and three path GPIOs each, as in TEST_POINTS.
    let adc: &'static RefCell<BoardAdc> = ADC.init(RefCell::new(BoardAdc::new(
        peripherals.ADC1,
        peripherals.GPIO1,
        peripherals.GPIO2,
        peripherals.GPIO3,
    )));
    let [tp1, tp2, tp3] = &TEST_POINTS;
    let points = [
        TestPoint::new(
            NodeId(0),
            tp1.name,
            NodeAdc::new(adc, 0),
            [
                DualModePin::new(peripherals.GPIO4, tp1.path_gpios[0]),
                DualModePin::new(peripherals.GPIO5, tp1.path_gpios[1]),
                DualModePin::new(peripherals.GPIO6, tp1.path_gpios[2]),
            ],
        ),
        TestPoint::new(
            NodeId(1),
            tp2.name,
            NodeAdc::new(adc, 1),
            [
                DualModePin::new(peripherals.GPIO7, tp2.path_gpios[0]),
                DualModePin::new(peripherals.GPIO15, tp2.path_gpios[1]),
                DualModePin::new(peripherals.GPIO16, tp2.path_gpios[2]),
            ],
        ),
        TestPoint::new(
            NodeId(2),
            tp3.name,
            NodeAdc::new(adc, 2),
            [
                DualModePin::new(peripherals.GPIO17, tp3.path_gpios[0]),
                DualModePin::new(peripherals.GPIO18, tp3.path_gpios[1]),
                DualModePin::new(peripherals.GPIO8, tp3.path_gpios[2]),
            ],
        ),
    ];

    let orchestrator = Orchestrator::new(measurement, &board.pairs, &READINGS, EmbassyClock);
    spawner
        .spawn(measurement_task(orchestrator, points))
        .expect("Failed to spawn measurement task");

    let uart_config = uart::Config::default().with_baudrate(serial_link::BAUD_RATE);
    let tx = UartTx::new(peripherals.UART0, uart_config)
        .expect("Failed to initialize UART")
        .with_tx(peripherals.GPIO43)
        .into_async();
    spawner
        .spawn(serial_link::serial_task(tx))
        .expect("Failed to spawn serial task");

    let mut flash = FlashStorage::new(peripherals.FLASH);
    if let Some(credentials) = wifi_secrets::load(&mut flash) {
        let credentials: &'static StoredCredentials = CREDENTIALS.init(credentials);
        let radio = RADIO
            .init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
        let (controller, interfaces) =
            esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
                .expect("Failed to initialize Wi-Fi controller");

        match wifi::start(spawner, controller, interfaces.sta, credentials) {
            Ok(stack) => {
                for id in 0..web::WEB_TASKS {
                    if let Err(e) = spawner.spawn(web::web_task(stack, board, id)) {
                        error!("Failed to spawn web task {}: {:?}", id, e);
                    }
                }
                wifi::wait_for_address(stack).await;
            }
            Err(e) => error!("{}", e),
        }
    } else {
        info!("Serving on UART only");
    }

    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}
