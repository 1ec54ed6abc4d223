use crate::meta_language::{GlobalCommand, InputMode, JobAction, OperationMode};

#[derive(Debug, Default)]
pub struct GlobalCommandGenerator
{
    commands: Vec<GlobalCommand>
}

impl GlobalCommandGenerator
{
    pub fn new() -> GlobalCommandGenerator
    {
        GlobalCommandGenerator{commands: Vec::new()}
    }

    pub fn add_process_job(&mut self, set: bool, action: JobAction)
    {
        self.commands.push(GlobalCommand::ProcessJob{set, action});
    }

    pub fn add_job_select(&mut self, set: bool, job: u32)
    {
        self.commands.push(GlobalCommand::JobSelect{set, job});
    }

    pub fn add_system_operation_mode(&mut self, set: bool, mode: OperationMode)
    {
        self.commands.push(GlobalCommand::SystemOperationMode{set, mode});
    }

    pub fn add_input_mode(&mut self, set: bool, mode: InputMode)
    {
        self.commands.push(GlobalCommand::InputMode{set, mode});
    }

    pub fn add_align(&mut self, set: bool, x: f64, y: f64)
    {
        self.commands.push(GlobalCommand::Align{set, x, y});
    }

    pub fn add_laser_on_for_alignment(&mut self, set: bool, on: bool, max_power: f64)
    {
        self.commands.push(GlobalCommand::LaserOnForAlignment{set, on, max_power});
    }

    pub fn add_calibration_filename(&mut self, set: bool, filename: &str)
    {
        self.commands.push(GlobalCommand::CalibrationFilename{
            set,
            filename: filename.to_string()
        });
    }

    pub fn add_focal_length(&mut self, set: bool, length: f64)
    {
        self.commands.push(GlobalCommand::FocalLength{set, length});
    }

    pub fn add_scanfield_size(&mut self, set: bool, size: f64)
    {
        self.commands.push(GlobalCommand::ScanfieldSize{set, size});
    }

    pub fn add_jump_speed(&mut self, set: bool, speed: f64)
    {
        self.commands.push(GlobalCommand::JumpSpeed{set, speed});
    }

    pub fn add_mark_speed(&mut self, set: bool, speed: f64)
    {
        self.commands.push(GlobalCommand::MarkSpeed{set, speed});
    }

    pub fn add_position_feedback_bits(&mut self, set: bool, bits: u32)
    {
        self.commands.push(GlobalCommand::PositionFeedbackBits{set, bits});
    }

    pub fn add_position_command_bits(&mut self, set: bool, bits: u32)
    {
        self.commands.push(GlobalCommand::PositionCommandBits{set, bits});
    }

    pub fn add_force_enable(&mut self, set: bool, enable: bool)
    {
        self.commands.push(GlobalCommand::ForceEnable{set, enable});
    }

    pub fn add_sys_ts(&mut self, set: bool, value: u32)
    {
        self.commands.push(GlobalCommand::SysTs{set, value});
    }

    pub fn add_laser_power(&mut self, set: bool, power: f64)
    {
        self.commands.push(GlobalCommand::LaserPower{set, power});
    }

    pub fn empty(&self) -> bool
    {
        self.commands.is_empty()
    }

    pub fn generated_global_commands(&self) -> &[GlobalCommand]
    {
        &self.commands
    }

    pub fn reset(&mut self)
    {
        self.commands.clear();
    }

    pub fn take_global_commands(&mut self) -> Vec<GlobalCommand>
    {
        std::mem::take(&mut self.commands)
    }
}
