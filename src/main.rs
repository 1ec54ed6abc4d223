use std::env;
use std::path::Path;
use std::str::FromStr;

use getopts::{Matches, Options};
use tracing_subscriber::EnvFilter;

use weld_scanner::config::{read_config, ScannerConfig, ScannerController};
use weld_scanner::error::Result;
use weld_scanner::figure::Figure;
use weld_scanner::figure_welding::{AbstractFigureWelding, WeldingData, WeldingMode, WobbleMode};
use weld_scanner::rtc6::driver::RecordingDriver;
use weld_scanner::rtc6::figure_welding::FigureWelding as Rtc6FigureWelding;
use weld_scanner::smart_move::figure_welding::FigureWelding as SmartMoveFigureWelding;
use weld_scanner::smart_move::transport::RecordingTransport;

fn usage(prg: &str, opts: Options) {
    let brief = format!("Usage: {} [options] WELD_FIGURE", prg);
    print!("{}", opts.usage(&brief));
}

fn parse_opt<T: FromStr>(matches: &Matches, name: &str, default: T) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    match matches.opt_str(name) {
        Some(arg) => match arg.parse::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                println!("Invalid {}: {}", name, err);
                None
            }
        },
        None => Some(default),
    }
}

fn compile<W: AbstractFigureWelding>(welding: &mut W, data: &WeldingData, figure: Figure,
                                     wobble_file: Option<&str>) -> Result<()> {
    if data.mode == WeldingMode::ScanlabPreview {
        load_wobble_figure(welding, wobble_file)?;
        return welding.build_preview_list(data, figure);
    }
    welding.prepare_welding_list(data, figure)?;
    load_wobble_figure(welding, wobble_file)?;
    welding.build_welding_list()
}

/// A missing or broken wobble figure only drops the wobbling
fn load_wobble_figure<W: AbstractFigureWelding>(welding: &mut W, wobble_file: Option<&str>)
                                                -> Result<()> {
    if let Some(file) = wobble_file {
        if let Err(e) = welding.load_wobble_figure_file(Path::new(file)) {
            if e.is_fatal() {
                return Err(e);
            }
            println!("Continuing without wobble figure: {}", e);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();
    let mut opts = Options::new();
    opts.optopt("c", "config", "scanner configuration file", "FILE");
    opts.optopt("b", "backend", "rtc6 or smartmove, overrides the configuration", "BACKEND");
    opts.optopt("w", "wobble", "wobble figure file", "FILE");
    opts.optopt("m", "wobble-mode",
                "none, ellipse, standing-eight, lying-eight or free", "MODE");
    opts.optopt("", "power", "nominal laser power (0 - 1)", "POWER");
    opts.optopt("", "ring-power", "nominal ring laser power (0 - 1)", "POWER");
    opts.optopt("v", "speed", "default mark speed (mm/s)", "SPEED");
    opts.optflag("p", "preview", "build a preview list with the laser off");
    opts.optflag("h", "help", "print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            println!("{}", f);
            return;
        }
    };
    if matches.opt_present("h") {
        usage(&program, opts);
        return;
    }

    if matches.free.is_empty() {
        println!("No weld figure file");
        return;
    }

    let mut config = match matches.opt_str("config") {
        Some(filename) => match read_config(Path::new(&filename)) {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                return;
            }
        },
        None => ScannerConfig::default(),
    };
    if let Some(backend) = matches.opt_str("backend") {
        config.controller = match backend.as_str() {
            "rtc6" => ScannerController::Rtc6,
            "smartmove" => ScannerController::SmartMove,
            _ => {
                println!("Unknown backend '{}'", backend);
                return;
            }
        };
    }

    let figure = match Figure::load(Path::new(&matches.free[0])) {
        Ok(f) => f,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    let defaults = WeldingData::default();
    let wobble_mode = match parse_opt(&matches, "wobble-mode", WobbleMode::NoWobbling) {
        Some(m) => m,
        None => return,
    };
    let laser_power = match parse_opt(&matches, "power", defaults.laser_power) {
        Some(p) if (0.0..=1.0).contains(&p) => p,
        Some(_) => {
            println!("Invalid power, must be 0 - 1");
            return;
        }
        None => return,
    };
    let laser_power_ring = match parse_opt(&matches, "ring-power", defaults.laser_power_ring) {
        Some(p) if (0.0..=1.0).contains(&p) => p,
        Some(_) => {
            println!("Invalid ring power, must be 0 - 1");
            return;
        }
        None => return,
    };
    let velocity = match parse_opt(&matches, "speed", defaults.velocity) {
        Some(v) => v,
        None => return,
    };
    let data = WeldingData {
        seam: 1,
        mode: if matches.opt_present("preview") {
            WeldingMode::ScanlabPreview
        } else {
            WeldingMode::Welding
        },
        wobble_mode,
        laser_power,
        laser_power_ring,
        velocity,
        jump_speed: config.jump_speed,
        wobble_frequency: config.wobble_frequency,
        ..defaults
    };
    let wobble_file = matches.opt_str("wobble");

    match config.controller {
        ScannerController::Rtc6 => {
            let mut welding = Rtc6FigureWelding::new(config, RecordingDriver::new());
            if let Err(e) = compile(&mut welding, &data, figure, wobble_file.as_deref()) {
                println!("{}", e);
                return;
            }
            for call in welding.driver().calls() {
                println!("{:?}", call);
            }
        }
        ScannerController::SmartMove => {
            let mut welding = SmartMoveFigureWelding::new(config, RecordingTransport::new());
            if let Err(e) = compile(&mut welding, &data, figure, wobble_file.as_deref()) {
                println!("{}", e);
                return;
            }
            let transport = welding.transport();
            for line in &transport.requests {
                println!("{}", line);
            }
            for (name, contents) in &transport.files {
                println!("--- {}", name);
                print!("{}", String::from_utf8_lossy(contents));
            }
        }
    }
}
