use std::sync::Arc;

use static_assertions::const_assert;
use tracing::{error, info};

use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::figure::Figure;
use crate::figure_welding::{
    AbstractFigureWelding, FigureWeldingBase, MarkAbort, ScannerControl, WeldingData,
    WobbleMode, WobbleResult,
};
use crate::meta_language::ContourCommand;
use crate::rtc6::driver::{Rtc6Control, Rtc6Driver};
use crate::rtc6::interpreter::{speed_to_bits, to_bits, Rtc6Interpreter};
use crate::wobble::MAX_SEGMENTS;

pub const LIST_NUMBER: u32 = 1;
/// Mark speed, two powers and the mark itself
pub const LIST_ENTRIES_PER_POINT: usize = 4;
pub const LIST_HEADER_ENTRIES: usize = 8;
/// Kept free for the vectors of a free wobble figure
pub const WOBBLE_VECTOR_RESERVE: usize = 1024;
pub const FREE_WOBBLE_MODE: i32 = 4;
const RESET_ALL_ERRORS: u32 = u32::MAX;

const_assert!(WOBBLE_VECTOR_RESERVE > MAX_SEGMENTS);

fn basic_wobble_code(mode: WobbleMode) -> i32 {
    match mode {
        WobbleMode::Ellipse => 0,
        WobbleMode::StandingEight => 1,
        WobbleMode::LyingEight => -1,
        WobbleMode::NoWobbling | WobbleMode::Free => 0,
    }
}

/// Stops the running list through the card's control handle
struct ListAbort {
    control: Arc<dyn Rtc6Control>,
}

impl MarkAbort for ListAbort {
    fn abort(&self) -> Result<()> {
        self.control.stop_execution();
        self.control.reset_error(RESET_ALL_ERRORS);
        info!("list execution stopped");
        Ok(())
    }
}

/// Weld list compiler writing into RTC6 list memory
pub struct FigureWelding<D: Rtc6Driver> {
    base: FigureWeldingBase,
    driver: D,
    interpreter: Rtc6Interpreter,
    abort: Arc<ListAbort>,
}

impl<D: Rtc6Driver> FigureWelding<D> {
    pub fn new(config: ScannerConfig, driver: D) -> FigureWelding<D> {
        let interpreter = Rtc6Interpreter::new(config.calibration_factor);
        let abort = Arc::new(ListAbort { control: driver.control() });
        FigureWelding {
            base: FigureWeldingBase::new(config),
            driver,
            interpreter,
            abort,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// List entries needed for a weld figure with `size` points
    pub fn number_of_points_from_contour(size: usize) -> usize {
        size * LIST_ENTRIES_PER_POINT + LIST_HEADER_ENTRIES
    }

    pub fn number_of_possible_points_for_list_memory(&self) -> usize {
        self.base.config().list_memory.saturating_sub(WOBBLE_VECTOR_RESERVE)
    }

    fn wobble_frequency(&self, data: &WeldingData) -> f64 {
        if data.wobble_frequency > 0.0 {
            data.wobble_frequency
        } else {
            self.base.config().wobble_frequency
        }
    }

    fn define_wobble_on_list(&mut self, wobble: WobbleResult, data: &WeldingData) {
        let cal = self.base.config().calibration_factor;
        let frequency = self.wobble_frequency(data);
        match wobble {
            WobbleResult::NoWobbling => self.driver.set_wobbel_mode(0, 0, 0.0, 0),
            WobbleResult::BasicFigure(mode) => {
                let transversal = to_bits(data.wobble_amplitude.0, cal).unsigned_abs();
                let longitudinal = to_bits(data.wobble_amplitude.1, cal).unsigned_abs();
                self.driver.set_wobbel_mode(transversal, longitudinal, frequency,
                                            basic_wobble_code(mode));
            }
            WobbleResult::OnePortWobbling(_) | WobbleResult::TwoPortWobbling => {
                let c = self.base.compensation();
                for k in 0..c.segments() {
                    self.driver.set_wobbel_vector(
                        c.wobbel_trans_vector[k] * cal,
                        c.wobbel_long_vector[k] * cal,
                        c.divisor,
                        c.delta_power[k],
                        c.delta_ring_power[k],
                    );
                }
                self.driver.set_wobbel_mode(0, 0, frequency, FREE_WOBBLE_MODE);
            }
        }
    }
}

impl<D: Rtc6Driver> AbstractFigureWelding for FigureWelding<D> {
    fn base(&self) -> &FigureWeldingBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FigureWeldingBase {
        &mut self.base
    }

    fn build_list(&mut self, contour: &[ContourCommand], wobble: WobbleResult) -> Result<()> {
        let data = self.base.welding_data().clone();
        let size = self.base.weld_figure().map_or(0, Figure::len);
        let needed = Self::number_of_points_from_contour(size);
        let capacity = self.number_of_possible_points_for_list_memory();
        if needed > capacity {
            error!(seam = data.seam, needed, capacity, "weld figure does not fit into list memory");
            return Err(Error::TooManyContourPoints { needed, capacity });
        }
        if !self.driver.load_list(LIST_NUMBER, 0) {
            return Err(Error::ListBusy(LIST_NUMBER));
        }
        let cal = self.base.config().calibration_factor;
        self.driver.set_jump_speed(speed_to_bits(data.jump_speed, cal));
        self.define_wobble_on_list(wobble, &data);
        self.interpreter.translate(contour, &mut self.driver);
        if wobble != WobbleResult::NoWobbling {
            self.driver.set_wobbel_mode(0, 0, 0.0, 0);
        }
        self.driver.set_end_of_list();
        Ok(())
    }
}

impl<D: Rtc6Driver> ScannerControl for FigureWelding<D> {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        let cal = self.base.config().calibration_factor;
        self.driver.goto_xy(to_bits(x, cal), to_bits(y, cal));
        Ok(())
    }

    fn start_mark(&mut self) -> Result<()> {
        self.driver.execute_list(LIST_NUMBER);
        self.base.mark_dispatched();
        info!(seam = self.base.welding_data().seam, "list {} started", LIST_NUMBER);
        Ok(())
    }

    fn stop_mark(&mut self) -> Result<()> {
        self.abort.abort()
    }

    fn abort_handle(&self) -> Arc<dyn MarkAbort> {
        self.abort.clone()
    }
}
