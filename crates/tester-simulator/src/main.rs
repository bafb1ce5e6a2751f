//! Desktop simulator for the component tester.
//!
//! Wires a simulated part across two of three test points and runs full
//! measurement cycles against it in virtual time. A second thread plays the
//! serving side: it reads the published snapshots the way the HTTP page does,
//! and decodes the serial report frames the way the host bridge does.
//!
//! # Usage
//!
//! ```text
//! tester-simulator [part] [value] [--cycles N]
//! ```
//!
//! | Part        | Value               | Example            |
//! |-------------|---------------------|--------------------|
//! | `resistor`  | ohms                | `resistor 4.7k`    |
//! | `capacitor` | farads              | `capacitor 100u`   |
//! | `inductor`  | henries             | `inductor 10m`     |
//! | `diode`     | forward voltage (V) | `diode 0.65`       |
//! | `open`      | -                   | `open`             |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use embassy_futures::block_on;
use log::{error, info, warn};

use tester_core::config::all_pairs;
use tester_core::report::{FRAME_CAPACITY, FrameAccumulator, encode_frame};
use tester_core::sim::{Bench, Part};
use tester_core::{
    BoardConfig, MeasurementConfig, Monotonic, Orchestrator, SharedReadings, TestPointConfig,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const NODES: usize = 3;

/// Terminals the part is wired across (TP1 and TP3).
const PLACEMENT: (usize, usize) = (0, 2);

const DEFAULT_CYCLES: u32 = 3;

/// Series resistance of a simulated inductor winding.
const WINDING_OHMS: f64 = 2.0;

/// How often the reader thread polls the published snapshot.
const READER_POLL: Duration = Duration::from_millis(20);

static READINGS: SharedReadings = SharedReadings::new();

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Parse a number with an optional SI suffix (`p n u µ m k M`).
fn parse_si(text: &str) -> Option<f64> {
    let text = text.trim();
    let (number, scale) = match text.chars().last()? {
        'p' => (&text[..text.len() - 1], 1e-12),
        'n' => (&text[..text.len() - 1], 1e-9),
        'u' => (&text[..text.len() - 1], 1e-6),
        'µ' => (&text[..text.len() - 'µ'.len_utf8()], 1e-6),
        'm' => (&text[..text.len() - 1], 1e-3),
        'k' => (&text[..text.len() - 1], 1e3),
        'M' => (&text[..text.len() - 1], 1e6),
        _ => (text, 1.0),
    };
    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value * scale)
}

fn parse_value(text: &str) -> Result<f64, String> {
    parse_si(text).ok_or_else(|| {
        format!("`{text}` is not a non-negative number with an optional p/n/u/m/k/M suffix")
    })
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    #[value(alias = "r")]
    Resistor,
    #[value(alias = "c")]
    Capacitor,
    #[value(alias = "l")]
    Inductor,
    #[value(alias = "d")]
    Diode,
    Open,
}

#[derive(Parser, Debug)]
#[command(name = "tester-simulator")]
#[command(version)]
#[command(about = "Run component tester measurement cycles against a simulated part", long_about = None)]
struct Cli {
    /// Part wired across TP1 and TP3
    #[arg(value_enum, default_value_t = PartKind::Resistor)]
    part: PartKind,

    /// Ohms, farads, henries or forward volts, with an optional SI suffix
    #[arg(value_parser = parse_value)]
    value: Option<f64>,

    /// Measurement cycles to run
    #[arg(short, long, default_value_t = DEFAULT_CYCLES)]
    cycles: u32,
}

impl Cli {
    fn part(&self) -> Part {
        let value = |default: f64| self.value.unwrap_or(default);
        match self.part {
            PartKind::Resistor => Part::resistor(value(4_700.0)),
            PartKind::Capacitor => Part::capacitor(value(100e-6)),
            PartKind::Inductor => Part::inductor(value(10e-3), WINDING_OHMS),
            PartKind::Diode => Part::diode(value(0.65)),
            PartKind::Open => Part::Open,
        }
    }
}

// ---------------------------------------------------------------------------
// Serving side
// ---------------------------------------------------------------------------

/// Poll the published snapshot and decode serial frames until `done` is set.
fn serve(board: &BoardConfig, frames: mpsc::Receiver<Vec<u8>>, done: &AtomicBool) {
    let mut last_cycle = 0;
    let mut accumulator = FrameAccumulator::new();

    loop {
        let finished = done.load(Ordering::Acquire);

        let snapshot = READINGS.current_snapshot();
        if snapshot.cycle != last_cycle {
            last_cycle = snapshot.cycle;
            info!(
                "[page] cycle {}: {}",
                snapshot.cycle,
                snapshot.resolved.named(board)
            );
            for node in READINGS.last_voltages() {
                info!(
                    "[page]   {} {:.3} V ({} {} {})",
                    node.name,
                    node.volts,
                    node.paths[0].label(),
                    node.paths[1].label(),
                    node.paths[2].label()
                );
            }
        }

        for frame in frames.try_iter() {
            for result in frame.iter().filter_map(|b| accumulator.push(*b)) {
                match result {
                    Ok(report) => info!(
                        "[serial] cycle {}: {}",
                        report.cycle,
                        report.resolved.named(board)
                    ),
                    Err(e) => warn!("[serial] dropped frame: {}", e),
                }
            }
        }

        if finished {
            break;
        }
        std::thread::sleep(READER_POLL);
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let part = cli.part();

    let config = MeasurementConfig::default();
    if let Err(e) = config.validate() {
        error!("Invalid measurement configuration: {e}");
        return ExitCode::FAILURE;
    }

    info!("Starting component tester simulator");
    info!(
        "{:?} across TP{} and TP{}, {} cycles",
        part,
        PLACEMENT.0 + 1,
        PLACEMENT.1 + 1,
        cli.cycles
    );

    let bench = Bench::new(&config, NODES);
    bench.place(part, PLACEMENT.0, PLACEMENT.1);
    let mut points = bench.test_points();

    let board_points: Vec<_> = points
        .iter()
        .enumerate()
        .map(|(i, tp)| TestPointConfig {
            name: tp.name(),
            adc_gpio: i as u8,
            path_gpios: [0; 3],
        })
        .collect();
    let board = BoardConfig::with_all_pairs(&board_points);

    let done = AtomicBool::new(false);
    let (frames_tx, frames_rx) = mpsc::channel::<Vec<u8>>();

    std::thread::scope(|scope| {
        scope.spawn(|| serve(&board, frames_rx, &done));

        // The bench is single-threaded, so the orchestrator stays here.
        let mut orchestrator =
            Orchestrator::new(config.clone(), &all_pairs(NODES), &READINGS, bench.clock());
        let mut buf = [0u8; FRAME_CAPACITY];

        for _ in 0..cli.cycles {
            let snapshot = block_on(orchestrator.run_full_cycle(&mut points));
            match encode_frame(&snapshot, &mut buf) {
                Ok(frame) => {
                    let _ = frames_tx.send(frame.to_vec());
                }
                Err(e) => warn!("Report not sent: {e}"),
            }
            // Give the reader a chance to observe every cycle.
            std::thread::sleep(READER_POLL * 3);
        }

        info!(
            "Simulated {:.3} s over {} ADC reads",
            bench.clock().now_micros() as f64 / 1e6,
            bench.adc_reads()
        );
        done.store(true, Ordering::Release);
    });

    info!("Simulator exiting");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_si_suffixes() {
        assert_eq!(parse_si("4.7k"), Some(4_700.0));
        assert!(parse_si("100u").is_some_and(|f| (f - 100e-6).abs() < 1e-15));
        assert_eq!(parse_si("100u"), parse_si("100µ"));
        assert_eq!(parse_si("0.65"), Some(0.65));
        assert_eq!(parse_si("-1"), None);
        assert_eq!(parse_si("k"), None);
    }

    #[test]
    fn test_defaults_to_three_cycles_of_a_resistor() {
        let cli = Cli::try_parse_from(["tester-simulator"]).unwrap();
        assert_eq!(cli.part, PartKind::Resistor);
        assert_eq!(cli.cycles, DEFAULT_CYCLES);
        assert_eq!(cli.part(), Part::resistor(4_700.0));
    }

    #[test]
    fn test_part_value_and_cycles() {
        let cli = Cli::try_parse_from(["tester-simulator", "d", "1.8", "--cycles", "5"]).unwrap();
        assert_eq!(cli.part(), Part::diode(1.8));
        assert_eq!(cli.cycles, 5);

        let cli = Cli::try_parse_from(["tester-simulator", "open"]).unwrap();
        assert_eq!(cli.part(), Part::Open);
    }

    #[test]
    fn test_rejects_unknown_part_and_bad_value() {
        assert!(Cli::try_parse_from(["tester-simulator", "transistor"]).is_err());
        assert!(Cli::try_parse_from(["tester-simulator", "capacitor", "lots"]).is_err());
    }
}
