use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::figure_welding::{
    translate_special_value, AbstractFigureWelding, FigureWeldingBase, MarkAbort,
    ScannerControl, WobbleResult,
};
use crate::global_command_generator::GlobalCommandGenerator;
use crate::meta_language::{ContourCommand, GlobalCommand, InputMode, JobAction, OperationMode};
use crate::smart_move::global_interpreter::{is_set_line, SmartMoveGlobalInterpreter};
use crate::smart_move::interpreter::SmartMoveInterpreter;
use crate::smart_move::transport::Transport;

pub const CONTOUR_FILE_NAME: &str = "contour.plt";

fn lock<T>(transport: &Mutex<T>) -> MutexGuard<'_, T> {
    transport.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sends one line and checks the answer. The transport is locked for this
/// exchange only, so a stop can get in between two lines.
fn exchange<T: Transport>(transport: &Mutex<T>, interpreter: &SmartMoveGlobalInterpreter,
                          line: &str) -> Result<()> {
    let reply = lock(transport).request(line)?;
    if is_set_line(line) {
        interpreter.check_set_reply(line, &reply)
    } else {
        let value = interpreter.parse_get_reply(line, &reply)?;
        debug!(command = %line, value, "read");
        Ok(())
    }
}

/// Stops the running job over a shared transport
struct JobStop<T: Transport> {
    transport: Arc<Mutex<T>>,
    interpreter: SmartMoveGlobalInterpreter,
}

impl<T: Transport> MarkAbort for JobStop<T> {
    fn abort(&self) -> Result<()> {
        let stop = GlobalCommand::ProcessJob { set: true, action: JobAction::Stop };
        for line in self.interpreter.translate(&[stop]) {
            exchange(&self.transport, &self.interpreter, &line)?;
        }
        info!("job stopped");
        Ok(())
    }
}

/// Weld list compiler for the SmartMove controller. Settings go out as
/// protocol lines, the contour as a file.
pub struct FigureWelding<T: Transport> {
    base: FigureWeldingBase,
    global: GlobalCommandGenerator,
    global_interpreter: SmartMoveGlobalInterpreter,
    interpreter: SmartMoveInterpreter,
    transport: Arc<Mutex<T>>,
    stop: Arc<JobStop<T>>,
}

impl<T: Transport> FigureWelding<T> {
    pub fn new(config: ScannerConfig, transport: T) -> FigureWelding<T> {
        let interpreter = SmartMoveInterpreter::new(config.smart_move.debug_contour_file.clone());
        let transport = Arc::new(Mutex::new(transport));
        let stop = Arc::new(JobStop {
            transport: transport.clone(),
            interpreter: SmartMoveGlobalInterpreter::new(),
        });
        FigureWelding {
            base: FigureWeldingBase::new(config),
            global: GlobalCommandGenerator::new(),
            global_interpreter: SmartMoveGlobalInterpreter::new(),
            interpreter,
            transport,
            stop,
        }
    }

    /// Locks the transport, no request goes out while the guard lives
    pub fn transport(&self) -> MutexGuard<'_, T> {
        lock(&self.transport)
    }

    pub fn interpreter(&self) -> &SmartMoveInterpreter {
        &self.interpreter
    }

    /// Translates and sends everything queued in the global generator.
    /// Every answer is checked, the first bad one aborts the rest.
    fn send_global_commands(&mut self) -> Result<()> {
        let commands = self.global.take_global_commands();
        for line in self.global_interpreter.translate(&commands) {
            exchange(&self.transport, &self.global_interpreter, &line)?;
        }
        Ok(())
    }

    fn first_mark_speed(&self) -> f64 {
        let default = self.base.welding_data().velocity;
        self.base
            .weld_figure()
            .and_then(|f| f.figure.first())
            .map_or(default, |o| translate_special_value(o.velocity, None, default))
    }
}

impl<T: Transport> AbstractFigureWelding for FigureWelding<T> {
    fn base(&self) -> &FigureWeldingBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FigureWeldingBase {
        &mut self.base
    }

    fn build_list(&mut self, contour: &[ContourCommand], wobble: WobbleResult) -> Result<()> {
        if wobble != WobbleResult::NoWobbling {
            warn!(seam = self.base.welding_data().seam, wobble = ?wobble,
                  "wobbling not supported by SmartMove, ignored");
        }
        let mark_speed = self.first_mark_speed();
        let jump_speed = self.base.welding_data().jump_speed;
        let sm = self.base.config().smart_move.clone();

        self.global.reset();
        self.global.add_system_operation_mode(true, OperationMode::Marking);
        self.global.add_input_mode(true, InputMode::Ethernet);
        self.global.add_mark_speed(true, mark_speed);
        self.global.add_jump_speed(true, jump_speed);
        self.global.add_focal_length(true, sm.focal_length);
        self.global.add_scanfield_size(true, sm.scanfield_size);
        self.global.add_calibration_filename(true, &sm.calibration_file);
        self.send_global_commands()?;

        self.interpreter.translate(contour)?;
        self.transport().send_file(CONTOUR_FILE_NAME, self.interpreter.staged())?;
        debug!(bytes = self.interpreter.staged().len(), "contour transmitted");
        Ok(())
    }
}

impl<T: Transport + 'static> ScannerControl for FigureWelding<T> {
    fn move_to(&mut self, x: f64, y: f64) -> Result<()> {
        self.global.reset();
        self.global.add_system_operation_mode(true, OperationMode::Alignment);
        self.global.add_align(true, x, y);
        self.send_global_commands()
    }

    fn start_mark(&mut self) -> Result<()> {
        self.global.reset();
        self.global.add_process_job(true, JobAction::Start);
        self.send_global_commands()?;
        self.base.mark_dispatched();
        info!(seam = self.base.welding_data().seam, "job started");
        Ok(())
    }

    fn stop_mark(&mut self) -> Result<()> {
        self.stop.abort()
    }

    fn abort_handle(&self) -> Arc<dyn MarkAbort> {
        self.stop.clone()
    }
}
