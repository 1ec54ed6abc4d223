/// Per-point contour language
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContourCommand
{
    Initialize,
    Mark { x: f64, y: f64 },   // mm
    Jump { x: f64, y: f64 },   // mm
    LaserPower { power: f64 }, // percent, port 1
    RingLaserPower { power: f64 }, // percent, port 2
    MarkSpeed { speed: f64 },  // mm/s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode
{
    Service = 0,
    Marking = 1,
    Alignment = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode
{
    Ethernet = 0,
    Analog = 1,
    Xy2_100 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction
{
    Stop = 0,
    Start = 1,
}

/// Scanner-wide settings. `set` selects write (true) or read (false).
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalCommand
{
    ProcessJob { set: bool, action: JobAction },
    JobSelect { set: bool, job: u32 },
    SystemOperationMode { set: bool, mode: OperationMode },
    InputMode { set: bool, mode: InputMode },
    Align { set: bool, x: f64, y: f64 },
    LaserOnForAlignment { set: bool, on: bool, max_power: f64 },
    CalibrationFilename { set: bool, filename: String },
    FocalLength { set: bool, length: f64 },
    ScanfieldSize { set: bool, size: f64 },
    JumpSpeed { set: bool, speed: f64 },
    MarkSpeed { set: bool, speed: f64 },
    PositionFeedbackBits { set: bool, bits: u32 },
    PositionCommandBits { set: bool, bits: u32 },
    ForceEnable { set: bool, enable: bool },
    SysTs { set: bool, value: u32 },
    LaserPower { set: bool, power: f64 },
}

impl GlobalCommand
{
    pub fn is_set(&self) -> bool
    {
        match *self {
            GlobalCommand::ProcessJob { set, .. }
            | GlobalCommand::JobSelect { set, .. }
            | GlobalCommand::SystemOperationMode { set, .. }
            | GlobalCommand::InputMode { set, .. }
            | GlobalCommand::Align { set, .. }
            | GlobalCommand::LaserOnForAlignment { set, .. }
            | GlobalCommand::CalibrationFilename { set, .. }
            | GlobalCommand::FocalLength { set, .. }
            | GlobalCommand::ScanfieldSize { set, .. }
            | GlobalCommand::JumpSpeed { set, .. }
            | GlobalCommand::MarkSpeed { set, .. }
            | GlobalCommand::PositionFeedbackBits { set, .. }
            | GlobalCommand::PositionCommandBits { set, .. }
            | GlobalCommand::ForceEnable { set, .. }
            | GlobalCommand::SysTs { set, .. }
            | GlobalCommand::LaserPower { set, .. } => set,
        }
    }
}
