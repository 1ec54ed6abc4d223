//! Backend independent part of the weld list compiler.
//!
//! `FigureWeldingBase` owns the seam state: welding data, weld and wobble
//! figures, the wobble compensation vectors and the contour generator.
//! The backends only implement `AbstractFigureWelding::build_list`.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::contour_generator::ContourGenerator;
use crate::coords::Point;
use crate::error::{Error, Result};
use crate::figure::{Figure, Order, PowerPort};
use crate::meta_language::ContourCommand;
use crate::wobble::{
    calculate_relative_laser_power, calculate_shift_resolution,
    calculate_shift_to_compensate_delay, define_pre_position, find_divisor,
    interpolate_micro_points, segment_limit, shifted_power_values,
};

/// Reuse the value of the previous point
pub const SPECIAL_VALUE_PREVIOUS: f64 = -1.0;
/// Use the product default
pub const SPECIAL_VALUE_DEFAULT: f64 = -2.0;

const SPECIAL_VALUE_TOLERANCE: f64 = 1e-9;
const NUMERIC_ZERO: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WobbleMode {
    NoWobbling,
    StandingEight,
    Ellipse,
    LyingEight,
    Free,
}

impl FromStr for WobbleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<WobbleMode, String> {
        match s {
            "none" => Ok(WobbleMode::NoWobbling),
            "standing-eight" => Ok(WobbleMode::StandingEight),
            "ellipse" => Ok(WobbleMode::Ellipse),
            "lying-eight" => Ok(WobbleMode::LyingEight),
            "free" => Ok(WobbleMode::Free),
            _ => Err(format!("Unknown wobble mode '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeldingMode {
    Welding,
    ScanlabPreview,
}

/// What the backend has to set up for the wobble figure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WobbleResult {
    NoWobbling,
    BasicFigure(WobbleMode),
    OnePortWobbling(PowerPort),
    TwoPortWobbling,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WobbleError {
    #[error("wobble figure missing or has fewer than 3 points")]
    InvalidWobbleFigure,
    #[error("nominal laser power is zero but port 1 is modulated")]
    NominalPowerWrong,
    #[error("nominal ring power is zero but port 2 is modulated")]
    NominalRingPowerWrong,
    #[error("{segments} wobble segments exceed the limit of {limit}")]
    TooManySegments { segments: usize, limit: usize },
    #[error("micro vector factor {0} must be even when both ports are modulated")]
    InvalidMicroVectorFactor(u32),
    #[error("shift {shift} exceeds the {segments} interpolated segments")]
    CompensationAbandoned { shift: i32, segments: usize },
}

impl WobbleError {
    pub fn is_fatal(&self) -> bool {
        match self {
            WobbleError::InvalidWobbleFigure => false,
            WobbleError::CompensationAbandoned { .. } => false,
            WobbleError::NominalPowerWrong
            | WobbleError::NominalRingPowerWrong
            | WobbleError::TooManySegments { .. }
            | WobbleError::InvalidMicroVectorFactor(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    Idle,
    SpeedsAndOffsetsSet,
    WobbleDefined,
    ListBuilt,
    Dispatched,
}

/// Product and seam parameters of one weld request
#[derive(Debug, Clone, PartialEq)]
pub struct WeldingData {
    pub seam: u32,
    pub mode: WeldingMode,
    pub wobble_mode: WobbleMode,
    pub laser_power: f64,      // [0,1] default for port 1
    pub laser_power_ring: f64, // [0,1] default for port 2
    pub velocity: f64,         // mm/s default mark speed
    pub jump_speed: f64,       // mm/s
    pub offset: (f64, f64),    // mm
    pub wobble_amplitude: (f64, f64), // transversal, longitudinal mm
    pub wobble_frequency: f64, // Hz
}

impl Default for WeldingData {
    fn default() -> Self {
        WeldingData {
            seam: 0,
            mode: WeldingMode::Welding,
            wobble_mode: WobbleMode::NoWobbling,
            laser_power: 0.0,
            laser_power_ring: 0.0,
            velocity: 100.0,
            jump_speed: 1000.0,
            offset: (0.0, 0.0),
            wobble_amplitude: (0.0, 0.0),
            wobble_frequency: 0.0,
        }
    }
}

/// Per-segment wobble vectors. Rebuilt as a whole on every definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WobbleCompensation {
    pub nominal_power: f64,
    pub nominal_ring_power: f64,
    pub shift: i32,
    pub divisor: u32,
    pub wobbel_trans_vector: Vec<f64>,
    pub wobbel_long_vector: Vec<f64>,
    pub delta_power: Vec<f64>,
    pub delta_ring_power: Vec<f64>,
}

impl WobbleCompensation {
    pub fn clear(&mut self) {
        *self = WobbleCompensation::default();
    }

    pub fn segments(&self) -> usize {
        self.wobbel_trans_vector.len()
    }
}

fn is_special(value: f64, special: f64) -> bool {
    (value - special).abs() < SPECIAL_VALUE_TOLERANCE
}

fn is_zero(v: f64) -> bool {
    v.abs() < NUMERIC_ZERO
}

/// Resolves the `-1` (previous) and `-2` (default) sentinels of one
/// per-point value.
pub fn translate_special_value(value: f64, previous: Option<f64>, default: f64) -> f64 {
    if is_special(value, SPECIAL_VALUE_PREVIOUS) {
        previous.unwrap_or(default)
    } else if is_special(value, SPECIAL_VALUE_DEFAULT) {
        default
    } else {
        value
    }
}

/// Weld points with power, ring power and velocity sentinels resolved
pub fn resolve_special_values(points: &[Order], data: &WeldingData) -> Vec<Order> {
    let mut resolved: Vec<Order> = Vec::with_capacity(points.len());
    for order in points {
        let previous = resolved.last().copied();
        resolved.push(Order {
            end_position: order.end_position,
            relative_power: translate_special_value(
                order.relative_power,
                previous.map(|p| p.relative_power),
                data.laser_power,
            ),
            relative_ring_power: translate_special_value(
                order.relative_ring_power,
                previous.map(|p| p.relative_ring_power),
                data.laser_power_ring,
            ),
            velocity: translate_special_value(
                order.velocity,
                previous.map(|p| p.velocity),
                data.velocity,
            ),
        });
    }
    resolved
}

/// Transverse and longitudinal vector of every segment, the segment
/// turned by 90 degrees.
fn segment_vectors(points: &[Order]) -> (Vec<f64>, Vec<f64>) {
    points
        .windows(2)
        .map(|pair| {
            let r = (pair[1].position() - pair[0].position()).rotated_90();
            (r.x, r.y)
        })
        .unzip()
}

/// Power deltas of one port. Figure values are offsets from `nominal`,
/// the first segment starts at `nominal` itself.
fn delta_power_values(port: PowerPort, points: &[Order], shift: i32, nominal: f64,
                      divisor: u32) -> Vec<f64> {
    let shifted = shifted_power_values(port, points, shift);
    let segments = points.len().saturating_sub(1);
    (0..segments)
        .map(|k| {
            let previous = if k == 0 { nominal } else { nominal + shifted[k - 1] };
            calculate_relative_laser_power(nominal, nominal + shifted[k], previous, divisor)
        })
        .collect()
}

pub struct FigureWeldingBase {
    config: ScannerConfig,
    state: ListState,
    data: WeldingData,
    weld_figure: Option<Figure>,
    wobble_figure: Option<Figure>,
    wobble: WobbleResult,
    compensation: WobbleCompensation,
    contour: ContourGenerator,
}

impl FigureWeldingBase {
    pub fn new(config: ScannerConfig) -> FigureWeldingBase {
        FigureWeldingBase {
            config,
            state: ListState::Idle,
            data: WeldingData::default(),
            weld_figure: None,
            wobble_figure: None,
            wobble: WobbleResult::NoWobbling,
            compensation: WobbleCompensation::default(),
            contour: ContourGenerator::new(),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn state(&self) -> ListState {
        self.state
    }

    pub fn welding_data(&self) -> &WeldingData {
        &self.data
    }

    pub fn weld_figure(&self) -> Option<&Figure> {
        self.weld_figure.as_ref()
    }

    pub fn wobble_figure(&self) -> Option<&Figure> {
        self.wobble_figure.as_ref()
    }

    pub fn set_wobble_figure(&mut self, figure: Option<Figure>) {
        self.wobble_figure = figure;
    }

    pub fn wobble(&self) -> WobbleResult {
        self.wobble
    }

    pub fn compensation(&self) -> &WobbleCompensation {
        &self.compensation
    }

    /// First weld point including the seam offset
    pub fn start_position(&self) -> Option<(f64, f64)> {
        let first = self.weld_figure.as_ref()?.figure.first()?;
        Some((first.position() + Point::from(self.data.offset)).into())
    }

    pub(crate) fn mark_dispatched(&mut self) {
        if self.state == ListState::ListBuilt {
            self.state = ListState::Dispatched;
        }
    }

    pub(crate) fn set_list_built(&mut self) {
        self.state = ListState::ListBuilt;
    }

    /// Drops everything derived from the current seam
    pub fn reset(&mut self) {
        self.state = ListState::Idle;
        self.data = WeldingData::default();
        self.weld_figure = None;
        self.wobble_figure = None;
        self.wobble = WobbleResult::NoWobbling;
        self.compensation.clear();
        self.contour.reset_contour();
    }

    pub fn prepare(&mut self, data: &WeldingData, figure: Figure) {
        self.data = data.clone();
        self.weld_figure = Some(figure);
        self.wobble = WobbleResult::NoWobbling;
        self.compensation.clear();
        self.state = ListState::SpeedsAndOffsetsSet;
        debug!(seam = data.seam, mode = ?data.mode, velocity = data.velocity,
               offset = ?data.offset, "speeds and offsets set");
    }

    /// Loads a wobble figure. Once speeds are set the figure is also
    /// defined. A file that cannot be read leaves no wobble figure.
    pub fn load_wobble_figure_file(&mut self, path: &Path) -> Result<()> {
        match Figure::load(path) {
            Ok(figure) => self.wobble_figure = Some(figure),
            Err(e) => {
                warn!(seam = self.data.seam, path = %path.display(), error = %e,
                      "wobble figure not loaded, welding without wobble");
                self.wobble_figure = None;
                self.wobble = WobbleResult::NoWobbling;
                return Err(e);
            }
        }
        if self.state == ListState::SpeedsAndOffsetsSet {
            self.wobble = self.resolve_wobble()?;
            self.state = ListState::WobbleDefined;
        }
        Ok(())
    }

    /// Defines the wobble figure for the requested mode. Failures that do
    /// not endanger the hardware fall back to no wobbling.
    pub fn resolve_wobble(&mut self) -> Result<WobbleResult> {
        let result = match self.define_wobble_figure(self.data.wobble_mode) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                error!(seam = self.data.seam, error = %e, "wobble figure rejected");
                return Err(e.into());
            }
            Err(e) => {
                warn!(seam = self.data.seam, error = %e, "welding without wobble");
                self.compensation.clear();
                WobbleResult::NoWobbling
            }
        };
        self.wobble = result;
        Ok(result)
    }

    pub fn define_wobble_figure(&mut self, mode: WobbleMode)
                                -> std::result::Result<WobbleResult, WobbleError> {
        self.compensation.clear();
        match mode {
            WobbleMode::NoWobbling => Ok(WobbleResult::NoWobbling),
            WobbleMode::StandingEight | WobbleMode::Ellipse | WobbleMode::LyingEight => {
                Ok(WobbleResult::BasicFigure(mode))
            }
            WobbleMode::Free => {
                let figure = match &self.wobble_figure {
                    Some(figure) if figure.len() > 2 => figure.clone(),
                    _ => return Err(WobbleError::InvalidWobbleFigure),
                };
                let ports = figure.modulated_ports();
                if self.data.mode == WeldingMode::Welding {
                    if ports.core && is_zero(self.data.laser_power) {
                        return Err(WobbleError::NominalPowerWrong);
                    }
                    if ports.ring && is_zero(self.data.laser_power_ring) {
                        return Err(WobbleError::NominalRingPowerWrong);
                    }
                }
                if ports.dual_port() {
                    if figure.micro_vector_factor % 2 != 0 {
                        return Err(WobbleError::InvalidMicroVectorFactor(
                            figure.micro_vector_factor,
                        ));
                    }
                    self.define_two_port_wobble_figure(&figure)?;
                    Ok(WobbleResult::TwoPortWobbling)
                } else {
                    let port = ports.single();
                    self.define_one_port_wobble_figure(&figure, port)?;
                    Ok(WobbleResult::OnePortWobbling(port))
                }
            }
        }
    }

    /// Finds divisor and shift for the figure and interpolates it at the
    /// reduced micro-vector factor. A shift longer than the figure abandons
    /// the compensation and reports nominal power 0.
    pub fn calculate_shift_and_shifted_nominal_power(&mut self, figure: &Figure, dual_port: bool)
                                                     -> std::result::Result<Vec<Order>, WobbleError> {
        let segments = figure.len().saturating_sub(1);
        let divisor = find_divisor(segments, figure.micro_vector_factor, dual_port);
        let reduced = figure.micro_vector_factor / divisor;
        let limit = segment_limit(dual_port);
        if segments * reduced as usize > limit {
            return Err(WobbleError::TooManySegments {
                segments: segments * reduced as usize,
                limit,
            });
        }
        let shift = calculate_shift_to_compensate_delay(
            self.config.laser_power_delay_compensation,
            calculate_shift_resolution(divisor),
        );
        let points = interpolate_micro_points(&figure.figure, reduced);
        let interpolated = points.len() - 1;
        if shift.unsigned_abs() as usize > interpolated {
            self.compensation.nominal_power = 0.0;
            self.compensation.nominal_ring_power = 0.0;
            return Err(WobbleError::CompensationAbandoned {
                shift,
                segments: interpolated,
            });
        }
        self.compensation.shift = shift;
        self.compensation.divisor = divisor;
        self.compensation.nominal_power = self.data.laser_power;
        self.compensation.nominal_ring_power = self.data.laser_power_ring;
        debug!(divisor, shift, segments = interpolated, "wobble figure interpolated");
        Ok(points)
    }

    pub fn define_one_port_wobble_figure(&mut self, figure: &Figure, port: PowerPort)
                                         -> std::result::Result<(), WobbleError> {
        let points = self.calculate_shift_and_shifted_nominal_power(figure, false)?;
        let (trans, long) = segment_vectors(&points);
        let c = &mut self.compensation;
        let nominal = match port {
            PowerPort::Core => c.nominal_power,
            PowerPort::Ring => c.nominal_ring_power,
        };
        let deltas = delta_power_values(port, &points, c.shift, nominal, c.divisor);
        let unmodulated = vec![0.0; deltas.len()];
        match port {
            PowerPort::Core => {
                c.delta_power = deltas;
                c.delta_ring_power = unmodulated;
            }
            PowerPort::Ring => {
                c.delta_power = unmodulated;
                c.delta_ring_power = deltas;
            }
        }
        c.wobbel_trans_vector = trans;
        c.wobbel_long_vector = long;
        Ok(())
    }

    pub fn define_two_port_wobble_figure(&mut self, figure: &Figure)
                                         -> std::result::Result<(), WobbleError> {
        let points = self.calculate_shift_and_shifted_nominal_power(figure, true)?;
        let (trans, long) = segment_vectors(&points);
        let c = &mut self.compensation;
        c.delta_power = delta_power_values(PowerPort::Core, &points, c.shift,
                                           c.nominal_power, c.divisor);
        c.delta_ring_power = delta_power_values(PowerPort::Ring, &points, c.shift,
                                                c.nominal_ring_power, c.divisor);
        c.wobbel_trans_vector = trans;
        c.wobbel_long_vector = long;
        Ok(())
    }

    /// Contour of the loaded weld figure. In preview both powers stay 0.
    pub fn compile_contour(&mut self) -> Result<Vec<ContourCommand>> {
        let points = match &self.weld_figure {
            Some(figure) if !figure.is_empty() => resolve_special_values(&figure.figure, &self.data),
            _ => return Err(Error::NoWeldFigure),
        };
        let preview = self.data.mode == WeldingMode::ScanlabPreview;
        let offset = Point::from(self.data.offset);
        let positions: Vec<Point> = points.iter().map(|o| o.position() + offset).collect();

        self.contour.reset_contour();
        self.contour.add_initialize();
        let start = positions[0];
        let pre_position = match positions.get(1) {
            Some(next) => Point::from(define_pre_position(
                points[0].velocity * self.config.laser_delay / 1000.0,
                self.config.calibration_factor,
                start.into(),
                (*next).into(),
            )),
            None => start,
        };
        self.contour.add_jump(pre_position.x, pre_position.y);
        if preview {
            self.contour.add_laser_power(0.0);
            self.contour.add_ring_laser_power(0.0);
        }
        if pre_position != start {
            self.add_weld_point(&points[0], start, preview);
        }
        for (order, position) in points.iter().zip(&positions).skip(1) {
            self.add_weld_point(order, *position, preview);
        }
        Ok(self.contour.new_contour())
    }

    fn add_weld_point(&mut self, order: &Order, position: Point, preview: bool) {
        self.contour.add_mark_speed(order.velocity);
        if !preview {
            self.contour.add_laser_power(order.relative_power * 100.0);
            self.contour.add_ring_laser_power(order.relative_ring_power * 100.0);
        }
        self.contour.add_mark(position.x, position.y);
    }
}

/// Direct control of the scanner outside of list compilation
pub trait ScannerControl {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()>;
    /// Executes the built list
    fn start_mark(&mut self) -> Result<()>;
    /// Aborts a running list immediately
    fn stop_mark(&mut self) -> Result<()>;
    /// Handle for the same abort from another thread, usable while this
    /// scanner is busy compiling or moving
    fn abort_handle(&self) -> Arc<dyn MarkAbort>;
}

/// Hardware abort that does not need the compiler
pub trait MarkAbort: Send + Sync {
    fn abort(&self) -> Result<()>;
}

/// Weld list compiler. The call order of one welding pass is
/// `prepare_welding_list`, optionally `load_wobble_figure_file`, then
/// `build_welding_list`.
pub trait AbstractFigureWelding {
    fn base(&self) -> &FigureWeldingBase;
    fn base_mut(&mut self) -> &mut FigureWeldingBase;

    /// Lowers a compiled contour and wobble definition to the device
    fn build_list(&mut self, contour: &[ContourCommand], wobble: WobbleResult) -> Result<()>;

    fn build_preview_list(&mut self, data: &WeldingData, figure: Figure) -> Result<()> {
        let data = WeldingData {
            mode: WeldingMode::ScanlabPreview,
            ..data.clone()
        };
        let base = self.base_mut();
        base.prepare(&data, figure);
        let wobble = base.resolve_wobble()?;
        let contour = base.compile_contour()?;
        self.build_list(&contour, wobble)?;
        self.base_mut().set_list_built();
        info!(seam = data.seam, commands = contour.len(), "preview list built");
        Ok(())
    }

    fn prepare_welding_list(&mut self, data: &WeldingData, figure: Figure) -> Result<()> {
        if figure.is_empty() {
            return Err(Error::NoWeldFigure);
        }
        self.base_mut().prepare(data, figure);
        Ok(())
    }

    fn load_wobble_figure_file(&mut self, path: &Path) -> Result<()> {
        self.base_mut().load_wobble_figure_file(path)
    }

    fn build_welding_list(&mut self) -> Result<()> {
        let base = self.base_mut();
        let wobble = match base.state() {
            ListState::SpeedsAndOffsetsSet => base.resolve_wobble()?,
            ListState::WobbleDefined => base.wobble(),
            state => {
                return Err(Error::OutOfOrder {
                    operation: "build_welding_list",
                    state,
                })
            }
        };
        let contour = base.compile_contour()?;
        self.build_list(&contour, wobble)?;
        let base = self.base_mut();
        base.set_list_built();
        info!(seam = base.welding_data().seam, commands = contour.len(), wobble = ?wobble,
              "welding list built");
        Ok(())
    }

    fn reset_seam(&mut self) {
        self.base_mut().reset();
    }
}
