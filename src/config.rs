use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub const BASE_DIR_VARIABLE: &str = "WM_BASE_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScannerController {
    Rtc6,
    SmartMove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmartMoveConfig {
    pub address: String,
    pub reply_timeout_ms: u64,
    /// Write the contour to this file instead of an anonymous buffer
    pub debug_contour_file: Option<PathBuf>,
    pub focal_length: f64,    // mm
    pub scanfield_size: f64,  // mm
    pub calibration_file: String,
}

impl Default for SmartMoveConfig {
    fn default() -> Self {
        SmartMoveConfig {
            address: String::from("192.168.170.105:32000"),
            reply_timeout_ms: 1000,
            debug_contour_file: None,
            focal_length: 340.0,
            scanfield_size: 52.0,
            calibration_file: String::from("calibration.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannerConfig {
    pub controller: ScannerController,
    /// Root of the figure and config tree. Empty means `WM_BASE_DIR`.
    pub base_dir: PathBuf,
    pub calibration_factor: f64, // bits/mm
    pub laser_delay: f64,        // ms
    /// Laser power response delay, in units of 10 µs
    pub laser_power_delay_compensation: i32,
    pub list_memory: usize,       // list entries
    pub jump_speed: f64,          // mm/s
    pub wobble_frequency: f64,    // Hz
    pub gate_timeout_ms: u64,
    pub smart_move: SmartMoveConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            controller: ScannerController::Rtc6,
            base_dir: PathBuf::new(),
            calibration_factor: 4000.0,
            laser_delay: 0.0,
            laser_power_delay_compensation: 0,
            list_memory: 1 << 16,
            jump_speed: 1000.0,
            wobble_frequency: 200.0,
            gate_timeout_ms: 400,
            smart_move: SmartMoveConfig::default(),
        }
    }
}

impl ScannerConfig {
    /// Base directory with the environment fallback applied.
    pub fn base_dir(&self) -> PathBuf {
        if self.base_dir.as_os_str().is_empty() {
            base_dir_from_env()
        } else {
            self.base_dir.clone()
        }
    }
}

pub fn base_dir_from_env() -> PathBuf {
    std::env::var(BASE_DIR_VARIABLE)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

pub fn wobble_figure_path(base: &Path, number: u32) -> PathBuf {
    base.join("config")
        .join("laser_controls")
        .join(format!("figureWobble{}.json", number))
}

pub fn weld_figure_path(base: &Path, number: u32) -> PathBuf {
    base.join("config")
        .join("weld_figure")
        .join(format!("weldingSeam{}.json", number))
}

pub fn read_config(file_name: &Path) -> Result<ScannerConfig> {
    let file = File::open(file_name).map_err(|source| Error::Io {
        path: file_name.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let config: ScannerConfig =
        serde_json::from_reader(reader).map_err(|source| Error::Config {
            path: file_name.to_path_buf(),
            source,
        })?;
    debug!(path = %file_name.display(), controller = ?config.controller, "scanner config loaded");
    Ok(config)
}
