use tracing::debug;

use crate::meta_language::ContourCommand;
use crate::rtc6::driver::Rtc6Driver;

pub const ANALOG_MAX: u32 = 4095;
pub const CORE_PORT: u32 = 1;
pub const RING_PORT: u32 = 2;

pub fn to_bits(mm: f64, calibration_factor: f64) -> i32
{
    (mm * calibration_factor).round() as i32
}

/// mm/s to bits/ms
pub fn speed_to_bits(speed: f64, calibration_factor: f64) -> f64
{
    speed * calibration_factor / 1000.0
}

/// Percent to the 12 bit analog output value
pub fn power_to_analog(percent: f64) -> u32
{
    ((percent / 100.0) * ANALOG_MAX as f64).round().clamp(0.0, ANALOG_MAX as f64) as u32
}

/// Values last written to the list. Repeated values are not written again.
#[derive(Debug, Default)]
struct LastProperties
{
    laser_power: Option<u32>,
    ring_power: Option<u32>,
    mark_speed: Option<f64>
}

/// Writes contour commands straight into the currently loaded list.
/// The caller has checked that the list memory is large enough.
pub struct Rtc6Interpreter
{
    calibration_factor: f64,
    last_properties: LastProperties
}

impl Rtc6Interpreter
{
    pub fn new(calibration_factor: f64) -> Rtc6Interpreter
    {
        Rtc6Interpreter{calibration_factor, last_properties: LastProperties::default()}
    }

    /// Returns the number of commands that were elided
    pub fn translate<D: Rtc6Driver + ?Sized>(&mut self, contour: &[ContourCommand],
                                             driver: &mut D) -> usize
    {
        let cal = self.calibration_factor;
        let mut elided = 0;
        for command in contour {
            match *command {
                ContourCommand::Initialize => {
                    self.last_properties = LastProperties::default();
                },
                ContourCommand::Jump{x, y} => {
                    driver.jump_abs(to_bits(x, cal), to_bits(y, cal));
                },
                ContourCommand::Mark{x, y} => {
                    driver.mark_abs(to_bits(x, cal), to_bits(y, cal));
                },
                ContourCommand::LaserPower{power} => {
                    let value = power_to_analog(power);
                    if self.last_properties.laser_power == Some(value) {
                        elided += 1;
                    } else {
                        driver.set_laser_power(CORE_PORT, value);
                        self.last_properties.laser_power = Some(value);
                    }
                },
                ContourCommand::RingLaserPower{power} => {
                    let value = power_to_analog(power);
                    if self.last_properties.ring_power == Some(value) {
                        elided += 1;
                    } else {
                        driver.set_laser_power(RING_PORT, value);
                        self.last_properties.ring_power = Some(value);
                    }
                },
                ContourCommand::MarkSpeed{speed} => {
                    let bits = speed_to_bits(speed, cal);
                    if self.last_properties.mark_speed == Some(bits) {
                        elided += 1;
                    } else {
                        driver.set_mark_speed(bits);
                        self.last_properties.mark_speed = Some(bits);
                    }
                }
            }
        }
        debug!(commands = contour.len(), elided, "contour written to list");
        elided
    }
}
