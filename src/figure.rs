use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coords::Point;
use crate::error::{Error, Result};

pub const POWER_MODULATION_CORE: u32 = 1;
pub const POWER_MODULATION_RING: u32 = 2;

fn default_one() -> u32 {
    1
}

fn default_velocity() -> f64 {
    -1.0
}

/// One point of a figure. The segment ending here is welded with its
/// power and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Order {
    pub end_position: (f64, f64),
    #[serde(rename = "Power")]
    pub relative_power: f64,
    #[serde(rename = "RingPower", default)]
    pub relative_ring_power: f64,
    #[serde(default = "default_velocity")]
    pub velocity: f64,
}

impl Order {
    pub fn new(x: f64, y: f64, power: f64, ring_power: f64, velocity: f64) -> Order {
        Order {
            end_position: (x, y),
            relative_power: power,
            relative_ring_power: ring_power,
            velocity,
        }
    }

    pub fn position(&self) -> Point {
        Point::from(self.end_position)
    }

    /// Linear blend of position and both powers. The velocity of `self`
    /// is kept.
    pub fn lerp(&self, next: &Order, t: f64) -> Order {
        Order {
            end_position: self.position().lerp(next.position(), t).into(),
            relative_power: self.relative_power
                + (next.relative_power - self.relative_power) * t,
            relative_ring_power: self.relative_ring_power
                + (next.relative_ring_power - self.relative_ring_power) * t,
            velocity: self.velocity,
        }
    }
}

/// Analog output carrying one of the two laser power channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerPort {
    Core, // port 1
    Ring, // port 2
}

impl PowerPort {
    pub fn value(&self, order: &Order) -> f64 {
        match self {
            PowerPort::Core => order.relative_power,
            PowerPort::Ring => order.relative_ring_power,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModulatedPorts {
    pub core: bool,
    pub ring: bool,
}

impl ModulatedPorts {
    pub fn dual_port(&self) -> bool {
        self.core && self.ring
    }

    /// The single modulated port. Meaningless when both are modulated.
    pub fn single(&self) -> PowerPort {
        if self.ring && !self.core {
            PowerPort::Ring
        } else {
            PowerPort::Core
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Figure {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_one")]
    pub micro_vector_factor: u32,
    #[serde(default = "default_one")]
    pub power_modulation_mode: u32,
    pub figure: Vec<Order>,
}

impl Figure {
    pub fn new(figure: Vec<Order>) -> Figure {
        Figure {
            name: String::new(),
            id: 0,
            description: String::new(),
            micro_vector_factor: 1,
            power_modulation_mode: POWER_MODULATION_CORE,
            figure,
        }
    }

    pub fn len(&self) -> usize {
        self.figure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.figure.is_empty()
    }

    pub fn modulated_ports(&self) -> ModulatedPorts {
        let core = self.power_modulation_mode & POWER_MODULATION_CORE != 0;
        let ring = self.power_modulation_mode & POWER_MODULATION_RING != 0;
        if !core && !ring {
            ModulatedPorts { core: true, ring: false }
        } else {
            ModulatedPorts { core, ring }
        }
    }

    pub fn from_json(text: &str) -> Result<Figure> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Figure> {
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let figure: Figure = serde_json::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), name = %figure.name, points = figure.len(), "figure loaded");
        Ok(figure)
    }
}
