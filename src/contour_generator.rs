use crate::meta_language::ContourCommand;

/// Appends contour commands in call order. No validation happens here.
#[derive(Debug, Default)]
pub struct ContourGenerator
{
    contour: Vec<ContourCommand>
}

impl ContourGenerator
{
    pub fn new() -> ContourGenerator
    {
        ContourGenerator{contour: Vec::new()}
    }

    pub fn add_initialize(&mut self)
    {
        self.contour.push(ContourCommand::Initialize);
    }

    pub fn add_mark(&mut self, x: f64, y: f64)
    {
        self.contour.push(ContourCommand::Mark{x, y});
    }

    pub fn add_jump(&mut self, x: f64, y: f64)
    {
        self.contour.push(ContourCommand::Jump{x, y});
    }

    pub fn add_laser_power(&mut self, power: f64)
    {
        self.contour.push(ContourCommand::LaserPower{power});
    }

    pub fn add_ring_laser_power(&mut self, power: f64)
    {
        self.contour.push(ContourCommand::RingLaserPower{power});
    }

    pub fn add_mark_speed(&mut self, speed: f64)
    {
        self.contour.push(ContourCommand::MarkSpeed{speed});
    }

    pub fn empty(&self) -> bool
    {
        self.contour.is_empty()
    }

    pub fn generated_contour(&self) -> &[ContourCommand]
    {
        &self.contour
    }

    pub fn reset_contour(&mut self)
    {
        self.contour.clear();
    }

    /// Hands the sequence over and starts a new, empty one
    pub fn new_contour(&mut self) -> Vec<ContourCommand>
    {
        std::mem::take(&mut self.contour)
    }
}
