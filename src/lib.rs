#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod config;
pub mod contour_generator;
pub mod coords;
pub mod error;
pub mod figure;
pub mod figure_welding;
pub mod global_command_generator;
pub mod meta_language;
pub mod orchestrator;
pub mod wobble;

pub mod rtc6 {
    pub mod driver;
    pub mod figure_welding;
    pub mod interpreter;
}

pub mod smart_move {
    pub mod contour_parser;
    pub mod figure_welding;
    pub mod global_interpreter;
    pub mod interpreter;
    pub mod transport;
}

#[cfg(test)]
mod tests;
