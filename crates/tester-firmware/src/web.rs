//! HTTP status page
//!
//! A small pool of socket tasks serves a single HTML page built from the last
//! published snapshot and node voltages. Accept and read are both bounded so
//! an idle peer only ever holds one slot for a few seconds.

use alloc::string::String;
use core::fmt::Write as _;

use embassy_net::tcp::TcpSocket;
use embassy_net::{IpListenEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use log::{debug, warn};
use tester_core::{
    BoardConfig, ClassificationSnapshot, ComponentKind, ComponentReading, NodeStatuses,
};

use crate::READINGS;
use crate::app_error::{AppError, describe};

pub const WEB_TASKS: usize = 2;
const PORT: u16 = 80;

const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(3);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

const RX_SIZE: usize = 1024;
const TX_SIZE: usize = 4096;

#[embassy_executor::task(pool_size = WEB_TASKS)]
pub async fn web_task(stack: Stack<'static>, board: &'static BoardConfig, id: usize) {
    let mut rx = [0u8; RX_SIZE];
    let mut tx = [0u8; TX_SIZE];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx, &mut tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        let endpoint = IpListenEndpoint {
            addr: None,
            port: PORT,
        };
        match with_timeout(ACCEPT_TIMEOUT, socket.accept(endpoint)).await {
            // Re-listen so a half-open accept never pins the slot.
            Err(_) => continue,
            Ok(Err(e)) => {
                warn!("web[{}]: accept failed: {:?}", id, e);
                continue;
            }
            Ok(Ok(())) => {}
        }

        if let Err(e) = serve(&mut socket, board).await {
            debug!("web[{}]: {}", id, e);
        }
        socket.close();
        let _ = socket.flush().await;
        socket.abort();
    }
}

async fn serve(socket: &mut TcpSocket<'_>, board: &BoardConfig) -> Result<(), AppError> {
    let mut request = [0u8; RX_SIZE];
    let mut len = 0;

    while !request[..len].windows(4).any(|w| w == b"\r\n\r\n") {
        if len == request.len() {
            break;
        }
        let read = with_timeout(READ_TIMEOUT, socket.read(&mut request[len..]))
            .await
            .map_err(|_| AppError::Timeout)?
            .map_err(|e| AppError::Network(describe(e)))?;
        if read == 0 {
            return Ok(());
        }
        len += read;
    }

    let response = match request_path(&request[..len]) {
        Some("/") | Some("/index.html") => {
            let body = render_page(
                &READINGS.current_snapshot(),
                &READINGS.last_voltages(),
                board,
            );
            respond("200 OK", "text/html; charset=utf-8", &body)
        }
        _ => respond("404 Not Found", "text/plain", "not found\n"),
    };

    let mut pending = response.as_bytes();
    while !pending.is_empty() {
        let written = socket
            .write(pending)
            .await
            .map_err(|e| AppError::Network(describe(e)))?;
        if written == 0 {
            return Err(AppError::Timeout);
        }
        pending = &pending[written..];
    }
    Ok(())
}

/// Path of a `GET` request line.
fn request_path(request: &[u8]) -> Option<&str> {
    let line = request.split(|b| *b == b'\r').next()?;
    let line = core::str::from_utf8(line).ok()?;
    let mut parts = line.split(' ');
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(path)) => Some(path),
        _ => None,
    }
}

fn respond(status: &str, content_type: &str, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 128);
    let _ = write!(
        out,
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    out
}

fn render_page(
    snapshot: &ClassificationSnapshot,
    nodes: &NodeStatuses,
    board: &BoardConfig,
) -> String {
    let mut page = String::with_capacity(2048);
    let _ = render_into(&mut page, snapshot, nodes, board);
    page
}

fn render_into(
    page: &mut String,
    snapshot: &ClassificationSnapshot,
    nodes: &NodeStatuses,
    board: &BoardConfig,
) -> core::fmt::Result {
    page.push_str(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"2\">\
         <title>Component tester</title></head><body>",
    );

    if snapshot.cycle == 0 {
        page.push_str("<h1>Measuring...</h1>");
    } else {
        write!(
            page,
            "<h1>{}</h1><p>Cycle {}</p>",
            snapshot.resolved.named(board),
            snapshot.cycle
        )?;
    }

    page.push_str("<h2>Readings</h2><table><tr><th>Kind</th><th>Value</th><th>At</th></tr>");
    for kind in ComponentKind::PRIORITY {
        match snapshot.slot(kind) {
            Some(slot) => write!(
                page,
                "<tr><td>{}</td><td>{}</td><td>{} ms</td></tr>",
                kind.label(),
                slot.reading.named(board),
                slot.timestamp_ms
            )?,
            None => write!(
                page,
                "<tr><td>{}</td><td>{}</td><td>-</td></tr>",
                kind.label(),
                ComponentReading::None
            )?,
        }
    }
    page.push_str("</table>");

    page.push_str("<h2>Test points</h2><table><tr><th>Node</th><th>Voltage</th><th>R0</th><th>R1</th><th>R2</th></tr>");
    for node in nodes {
        write!(
            page,
            "<tr><td>{}</td><td>{:.3} V</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            node.name,
            node.volts,
            node.paths[0].label(),
            node.paths[1].label(),
            node.paths[2].label()
        )?;
    }
    page.push_str("</table></body></html>");
    Ok(())
}
