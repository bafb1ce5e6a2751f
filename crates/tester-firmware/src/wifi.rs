//! Wi-Fi station bring-up
//!
//! The tester joins an existing network with DHCP under the hostname
//! `component-tester`. Each association is tried a bounded number of times;
//! when all attempts fail the station gives up until the next reset and the
//! measurement task carries on without a status page.

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer};
use esp_hal::rng::Rng;
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use log::{error, info, warn};
use static_cell::StaticCell;
use tester_core::StoredCredentials;

use crate::app_error::{AppError, describe};

pub const HOSTNAME: &str = "component-tester";

const CONNECT_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sockets: the HTTP pool plus DHCP.
const SOCKETS: usize = crate::web::WEB_TASKS + 1;

static RESOURCES: StaticCell<StackResources<SOCKETS>> = StaticCell::new();

/// Create the network stack on the station interface and spawn its tasks.
pub fn start(
    spawner: Spawner,
    controller: WifiController<'static>,
    device: WifiDevice<'static>,
    credentials: &'static StoredCredentials,
) -> Result<Stack<'static>, AppError> {
    let mut dhcp = DhcpConfig::default();
    dhcp.hostname = HOSTNAME.try_into().ok();

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    let (stack, runner) = embassy_net::new(
        device,
        embassy_net::Config::dhcpv4(dhcp),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner
        .spawn(connection_task(controller, credentials))
        .map_err(|e| AppError::Wifi(describe(e)))?;
    spawner
        .spawn(net_task(runner))
        .map_err(|e| AppError::Network(describe(e)))?;
    Ok(stack)
}

/// Wait until DHCP has handed out an address.
pub async fn wait_for_address(stack: Stack<'static>) {
    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("Status page at http://{}/", config.address.address());
    }
}

async fn connect(
    controller: &mut WifiController<'static>,
    credentials: &StoredCredentials,
) -> Result<(), AppError> {
    if !matches!(controller.is_started(), Ok(true)) {
        let client = ClientConfig::default()
            .with_ssid(credentials.ssid.as_str().into())
            .with_password(credentials.password.as_str().into());
        controller
            .set_config(&ModeConfig::Client(client))
            .map_err(|e| AppError::Wifi(describe(e)))?;
        controller
            .start_async()
            .await
            .map_err(|e| AppError::Wifi(describe(e)))?;
        info!("Wi-Fi started");
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        match controller.connect_async().await {
            Ok(()) => {
                info!("Connected to {} on attempt {}", credentials.ssid, attempt);
                return Ok(());
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!("Connect attempt {} failed: {:?}", attempt, e);
                Timer::after(RETRY_DELAY).await;
            }
            Err(e) => return Err(AppError::Wifi(describe(e))),
        }
    }
}

#[embassy_executor::task]
async fn connection_task(
    mut controller: WifiController<'static>,
    credentials: &'static StoredCredentials,
) {
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wi-Fi disconnected");
            Timer::after(RETRY_DELAY).await;
        }

        if let Err(e) = connect(&mut controller, credentials).await {
            error!("{}", e);
            // Parked until reset; measurements continue without the network.
            return;
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
