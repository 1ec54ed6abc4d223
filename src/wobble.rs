//! Delay compensation for free wobble figures.
//!
//! All functions are pure. Degenerate input yields a neutral value
//! instead of an error.

use num::Integer;
use static_assertions::const_assert;

use crate::coords::Point;
use crate::figure::{Order, PowerPort};

/// Most segments the hardware accepts for one wobble figure
pub const MAX_SEGMENTS: usize = 1023;
pub const DUAL_PORT_SEGMENT_LIMIT: usize = 511;
pub const SINGLE_PORT_SEGMENT_LIMIT: usize = 1023;
pub const MAX_DIVISOR: u32 = 100;
/// Duration of one hardware micro-vector, µs
pub const MICRO_VECTOR_PERIOD_US: i32 = 10;

const NUMERIC_ZERO: f64 = 1e-9;

const_assert!(DUAL_PORT_SEGMENT_LIMIT < SINGLE_PORT_SEGMENT_LIMIT);
const_assert!(SINGLE_PORT_SEGMENT_LIMIT == MAX_SEGMENTS);

fn is_zero(v: f64) -> bool {
    v.abs() < NUMERIC_ZERO
}

pub fn segment_limit(dual_port: bool) -> usize {
    if dual_port {
        DUAL_PORT_SEGMENT_LIMIT
    } else {
        SINGLE_PORT_SEGMENT_LIMIT
    }
}

/// Power change per micro-vector relative to the nominal power, in [-1, 1].
pub fn calculate_relative_laser_power(nominal: f64, new_power: f64, old_power: f64,
                                      micro_vector_factor: u32) -> f64 {
    if is_zero(nominal) || micro_vector_factor == 0 {
        return 0.0;
    }
    ((new_power - old_power) / (nominal * micro_vector_factor as f64)).clamp(-1.0, 1.0)
}

/// Smallest divisor of `micro_vector_factor` that brings the figure under
/// the segment limit.
///
/// # Arguments
/// * `segment_count` - Macro segments of the figure
/// * `micro_vector_factor` - Micro-vectors per macro segment
/// * `dual_port` - Both power ports modulated. Limit is 511 instead of 1023
///   and only even divisors are used.
///
/// Gives up at `MAX_DIVISOR` and returns the best candidate seen, so the
/// caller has to check the limit again.
pub fn find_divisor(segment_count: usize, micro_vector_factor: u32, dual_port: bool) -> u32 {
    let limit = segment_limit(dual_port);
    let start = if dual_port { 2 } else { 1 };
    let mut best: Option<u32> = None;
    let mut divisor = start;
    while divisor <= MAX_DIVISOR {
        if Integer::is_multiple_of(&micro_vector_factor, &divisor)
            && (!dual_port || divisor.is_even())
        {
            best = Some(divisor);
            if segment_count * (micro_vector_factor / divisor) as usize <= limit {
                return divisor;
            }
        }
        divisor += 1;
    }
    best.unwrap_or(start)
}

/// Duration in µs of one micro-vector at this divisor
pub fn calculate_shift_resolution(divisor: u32) -> i32 {
    MICRO_VECTOR_PERIOD_US * divisor as i32
}

pub fn calculate_shift_to_compensate_delay(compensation_in_10us: i32, resolution: i32) -> i32 {
    if resolution == 0 {
        return 0;
    }
    (compensation_in_10us as f64 / resolution as f64).round() as i32
}

/// Splits every segment into `n` equal steps. Position and both powers
/// are interpolated linearly.
///
/// Returns `points` unchanged when there is nothing to split or the result
/// would exceed `MAX_SEGMENTS`.
pub fn interpolate_micro_points(points: &[Order], n: u32) -> Vec<Order> {
    if points.is_empty() || n <= 1 || (points.len() - 1) * n as usize > MAX_SEGMENTS {
        return points.to_vec();
    }
    let mut result = Vec::with_capacity((points.len() - 1) * n as usize + 1);
    for pair in points.windows(2) {
        result.push(pair[0]);
        for step in 1..n {
            result.push(pair[0].lerp(&pair[1], step as f64 / n as f64));
        }
    }
    if let Some(last) = points.last() {
        result.push(*last);
    }
    result
}

/// Power values of one port, rotated by `shift` points.
///
/// The last point is dropped since it closes the contour, and the rotated
/// first value is appended again so the result is closed too. A negative
/// shift rotates by `size - |shift|`, a positive shift by `shift`.
pub fn shifted_power_values(port: PowerPort, figure: &[Order], shift: i32) -> Vec<f64> {
    let first = match figure.first() {
        Some(first) => port.value(first),
        None => return Vec::new(),
    };
    let mut values: Vec<f64> = figure[..figure.len() - 1]
        .iter()
        .map(|order| port.value(order))
        .collect();
    if values.is_empty() {
        return vec![first];
    }
    let size = values.len();
    let magnitude = shift.unsigned_abs() as usize % size;
    let rotation = if shift < 0 {
        (size - magnitude) % size
    } else {
        magnitude
    };
    values.rotate_left(rotation);
    values.push(values[0]);
    values
}

/// Run-up point before `p1`, on the extension of `p2 -> p1` at
/// `intended_length` from `p1`.
pub fn define_pre_position(intended_length: f64, calibration_factor: f64,
                           p1: (f64, f64), p2: (f64, f64)) -> (f64, f64) {
    if is_zero(intended_length) || is_zero(calibration_factor) {
        return p1;
    }
    let start = Point::from(p1);
    let direction = start - Point::from(p2);
    let segment_length = direction.length();
    if is_zero(segment_length) {
        return p1;
    }
    (start + direction * (intended_length / segment_length)).into()
}
