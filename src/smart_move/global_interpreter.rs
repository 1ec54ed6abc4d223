//! Global commands to SmartMove protocol lines.
//!
//! A write renders as `S <KEY> <value>`, a read as `G <KEY> ` with the
//! value filled in by the controller's answer. Runs of writes are merged
//! into one `S <KEY1> v1 <KEY2> v2 ...` line while it stays below the line
//! limit.

use tracing::debug;

use crate::error::{Error, Result};
use crate::meta_language::GlobalCommand;

pub const MAX_LINE_LENGTH: usize = 80;

const SET_PREFIX: &str = "S ";
const GET_PREFIX: &str = "G ";

pub mod keys {
    pub const PROCESS_JOB: &str = "JOB_PROC";
    pub const JOB_SELECT: &str = "JOB_SEL";
    pub const SYSTEM_OPERATION_MODE: &str = "SYS_OPMODE";
    pub const INPUT_MODE: &str = "INPUT_MODE";
    pub const ALIGN_X: &str = "ALIGN_X";
    pub const ALIGN_Y: &str = "ALIGN_Y";
    pub const LASER_ON: &str = "LSR_ON";
    pub const LASER_ON_MAX: &str = "LSR_ON_MAX";
    pub const CALIBRATION_FILENAME: &str = "CALIB_FILE";
    pub const FOCAL_LENGTH: &str = "FOCAL_LEN";
    pub const SCANFIELD_SIZE: &str = "SCANFIELD_SIZE";
    pub const JUMP_SPEED: &str = "JUMP_SPEED";
    pub const MARK_SPEED: &str = "MARK_SPEED";
    pub const POSITION_FEEDBACK_BITS: &str = "POS_FB_BITS";
    pub const POSITION_COMMAND_BITS: &str = "POS_CMD_BITS";
    pub const FORCE_ENABLE: &str = "FORCE_ENABLE";
    pub const SYS_TS: &str = "SYS_TS";
    pub const LASER_POWER: &str = "LSR_POWER";
}

fn line(set: bool, key: &str, value: impl ToString) -> String {
    if set {
        format!("{}{} {}", SET_PREFIX, key, value.to_string())
    } else {
        format!("{}{} ", GET_PREFIX, key)
    }
}

fn flag(on: bool) -> u32 {
    if on {
        1
    } else {
        0
    }
}

pub fn is_set_line(line: &str) -> bool {
    line.starts_with(SET_PREFIX)
}

pub struct SmartMoveGlobalInterpreter {
    max_line_length: usize,
}

impl Default for SmartMoveGlobalInterpreter {
    fn default() -> Self {
        SmartMoveGlobalInterpreter::new()
    }
}

impl SmartMoveGlobalInterpreter {
    pub fn new() -> SmartMoveGlobalInterpreter {
        SmartMoveGlobalInterpreter {
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Protocol lines of one command. `Align` and `LaserOnForAlignment`
    /// give two lines each.
    pub fn command_lines(&self, command: &GlobalCommand) -> Vec<String> {
        use self::keys::*;
        match command {
            GlobalCommand::ProcessJob { set, action } => {
                vec![line(*set, PROCESS_JOB, *action as i32)]
            }
            GlobalCommand::JobSelect { set, job } => vec![line(*set, JOB_SELECT, job)],
            GlobalCommand::SystemOperationMode { set, mode } => {
                vec![line(*set, SYSTEM_OPERATION_MODE, *mode as i32)]
            }
            GlobalCommand::InputMode { set, mode } => vec![line(*set, INPUT_MODE, *mode as i32)],
            GlobalCommand::Align { set, x, y } => {
                vec![line(*set, ALIGN_X, x), line(*set, ALIGN_Y, y)]
            }
            GlobalCommand::LaserOnForAlignment { set, on, max_power } => vec![
                line(*set, LASER_ON, flag(*on)),
                line(*set, LASER_ON_MAX, max_power),
            ],
            GlobalCommand::CalibrationFilename { set, filename } => {
                vec![line(*set, CALIBRATION_FILENAME, filename)]
            }
            GlobalCommand::FocalLength { set, length } => vec![line(*set, FOCAL_LENGTH, length)],
            GlobalCommand::ScanfieldSize { set, size } => vec![line(*set, SCANFIELD_SIZE, size)],
            GlobalCommand::JumpSpeed { set, speed } => vec![line(*set, JUMP_SPEED, speed)],
            GlobalCommand::MarkSpeed { set, speed } => vec![line(*set, MARK_SPEED, speed)],
            GlobalCommand::PositionFeedbackBits { set, bits } => {
                vec![line(*set, POSITION_FEEDBACK_BITS, bits)]
            }
            GlobalCommand::PositionCommandBits { set, bits } => {
                vec![line(*set, POSITION_COMMAND_BITS, bits)]
            }
            GlobalCommand::ForceEnable { set, enable } => {
                vec![line(*set, FORCE_ENABLE, flag(*enable))]
            }
            GlobalCommand::SysTs { set, value } => vec![line(*set, SYS_TS, value)],
            GlobalCommand::LaserPower { set, power } => vec![line(*set, LASER_POWER, power)],
        }
    }

    /// One multi-set line for all `lines`, or an empty string when a line
    /// is a read or the result would reach the line limit.
    pub fn merge_multiple_sets_to_one_multi_set(&self, lines: &[String]) -> String {
        if lines.is_empty() || !lines.iter().all(|l| is_set_line(l)) {
            return String::new();
        }
        let mut merged = String::from(SET_PREFIX.trim_end());
        for l in lines {
            merged.push(' ');
            merged.push_str(&l[SET_PREFIX.len()..]);
        }
        if merged.len() >= self.max_line_length {
            return String::new();
        }
        merged
    }

    fn flush_run(&self, run: &mut Vec<String>, out: &mut Vec<String>) {
        match run.len() {
            0 => {}
            1 => out.append(run),
            _ => {
                out.push(self.merge_multiple_sets_to_one_multi_set(run));
                run.clear();
            }
        }
    }

    /// All commands as protocol lines, contiguous writes merged
    pub fn translate(&self, commands: &[GlobalCommand]) -> Vec<String> {
        let mut out = Vec::new();
        let mut run: Vec<String> = Vec::new();
        for command in commands {
            for l in self.command_lines(command) {
                if !is_set_line(&l) {
                    self.flush_run(&mut run, &mut out);
                    out.push(l);
                    continue;
                }
                run.push(l);
                if run.len() > 1 && self.merge_multiple_sets_to_one_multi_set(&run).is_empty() {
                    if let Some(last) = run.pop() {
                        self.flush_run(&mut run, &mut out);
                        run.push(last);
                    }
                }
            }
        }
        self.flush_run(&mut run, &mut out);
        debug!(commands = commands.len(), lines = out.len(), "global commands translated");
        out
    }

    /// A write is answered with its own text
    pub fn check_set_reply(&self, command: &str, reply: &str) -> Result<()> {
        if reply.trim_end() == command.trim_end() {
            Ok(())
        } else {
            Err(Error::UnexpectedReply {
                command: command.to_string(),
                reply: reply.to_string(),
            })
        }
    }

    /// A read is answered with its own text followed by the value
    pub fn parse_get_reply(&self, command: &str, reply: &str) -> Result<f64> {
        let value = match reply.strip_prefix(command) {
            Some(value) => value.trim(),
            None => {
                return Err(Error::UnexpectedReply {
                    command: command.to_string(),
                    reply: reply.to_string(),
                })
            }
        };
        value.parse::<f64>().map_err(|_| Error::NonNumericReply {
            command: command.to_string(),
            reply: reply.to_string(),
        })
    }
}
