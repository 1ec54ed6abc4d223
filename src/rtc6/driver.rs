use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// List and control calls of the RTC6 scanner card used by this crate.
/// Coordinates are in bits, speeds in bits/ms.
pub trait Rtc6Driver: Send
{
    fn load_list(&mut self, list: u32, position: u32) -> bool;
    fn set_end_of_list(&mut self);
    fn execute_list(&mut self, list: u32);
    fn jump_abs(&mut self, x: i32, y: i32);
    fn mark_abs(&mut self, x: i32, y: i32);
    /// `port` 1 is the core laser, 2 the ring laser. 12 bit value.
    fn set_laser_power(&mut self, port: u32, value: u32);
    fn set_mark_speed(&mut self, speed: f64);
    fn set_jump_speed(&mut self, speed: f64);
    /// Frequency 0 switches wobbling off
    fn set_wobbel_mode(&mut self, transversal: u32, longitudinal: u32, frequency: f64, mode: i32);
    fn set_wobbel_vector(&mut self, d_trans: f64, d_long: f64, period: u32,
                         d_power: f64, d_ring_power: f64);
    /// Moves the mirrors immediately, outside of any list
    fn goto_xy(&mut self, x: i32, y: i32);
    fn busy(&self) -> bool;
    /// Handle to the same card for calls made while a list is written
    fn control(&self) -> Arc<dyn Rtc6Control>;
}

/// Card calls that may run on any thread, concurrently with list writes
pub trait Rtc6Control: Send + Sync
{
    fn stop_execution(&self);
    fn reset_error(&self, code: u32);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rtc6Call
{
    LoadList(u32, u32),
    SetEndOfList,
    ExecuteList(u32),
    JumpAbs(i32, i32),
    MarkAbs(i32, i32),
    SetLaserPower(u32, u32),  // (port, value)
    SetMarkSpeed(f64),
    SetJumpSpeed(f64),
    SetWobbelMode(u32, u32, f64, i32),
    SetWobbelVector(f64, f64, u32, f64, f64),
    GotoXy(i32, i32),
    StopExecution,
    ResetError(u32),
}

#[derive(Debug, Default)]
struct Recording
{
    calls: Vec<Rtc6Call>,
    executing: bool
}

/// Driver stand-in that records every call, for dry runs and tests.
/// Clones share one recording, like control handles share one card.
#[derive(Debug, Default, Clone)]
pub struct RecordingDriver
{
    recording: Arc<Mutex<Recording>>
}

impl RecordingDriver
{
    pub fn new() -> RecordingDriver
    {
        RecordingDriver::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording>
    {
        self.recording.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Rtc6Call)
    {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<Rtc6Call>
    {
        self.lock().calls.clone()
    }

    pub fn count(&self, f: impl Fn(&Rtc6Call) -> bool) -> usize
    {
        self.lock().calls.iter().filter(|c| f(c)).count()
    }

    /// Pretends a list is running on the card
    pub fn set_executing(&self, executing: bool)
    {
        self.lock().executing = executing;
    }
}

impl Rtc6Driver for RecordingDriver
{
    fn load_list(&mut self, list: u32, position: u32) -> bool
    {
        let mut recording = self.lock();
        recording.calls.push(Rtc6Call::LoadList(list, position));
        !recording.executing
    }

    fn set_end_of_list(&mut self)
    {
        self.record(Rtc6Call::SetEndOfList);
    }

    fn execute_list(&mut self, list: u32)
    {
        let mut recording = self.lock();
        recording.calls.push(Rtc6Call::ExecuteList(list));
        recording.executing = true;
    }

    fn jump_abs(&mut self, x: i32, y: i32)
    {
        self.record(Rtc6Call::JumpAbs(x, y));
    }

    fn mark_abs(&mut self, x: i32, y: i32)
    {
        self.record(Rtc6Call::MarkAbs(x, y));
    }

    fn set_laser_power(&mut self, port: u32, value: u32)
    {
        self.record(Rtc6Call::SetLaserPower(port, value));
    }

    fn set_mark_speed(&mut self, speed: f64)
    {
        self.record(Rtc6Call::SetMarkSpeed(speed));
    }

    fn set_jump_speed(&mut self, speed: f64)
    {
        self.record(Rtc6Call::SetJumpSpeed(speed));
    }

    fn set_wobbel_mode(&mut self, transversal: u32, longitudinal: u32, frequency: f64, mode: i32)
    {
        self.record(Rtc6Call::SetWobbelMode(transversal, longitudinal, frequency, mode));
    }

    fn set_wobbel_vector(&mut self, d_trans: f64, d_long: f64, period: u32,
                         d_power: f64, d_ring_power: f64)
    {
        self.record(Rtc6Call::SetWobbelVector(d_trans, d_long, period, d_power, d_ring_power));
    }

    fn goto_xy(&mut self, x: i32, y: i32)
    {
        self.record(Rtc6Call::GotoXy(x, y));
    }

    fn busy(&self) -> bool
    {
        self.lock().executing
    }

    fn control(&self) -> Arc<dyn Rtc6Control>
    {
        Arc::new(self.clone())
    }
}

impl Rtc6Control for RecordingDriver
{
    fn stop_execution(&self)
    {
        let mut recording = self.lock();
        recording.calls.push(Rtc6Call::StopExecution);
        recording.executing = false;
    }

    fn reset_error(&self, code: u32)
    {
        self.record(Rtc6Call::ResetError(code));
    }
}
