use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};
use crate::meta_language::ContourCommand;

/// Where the rendered contour waits for transmission
#[derive(Debug)]
pub enum ContourStage
{
    Memory(Vec<u8>),
    DebugFile(PathBuf, Vec<u8>)
}

/// Renders contour commands in the HPGL2-like SmartMove format, one
/// command per line with three decimals.
pub struct SmartMoveInterpreter
{
    stage: ContourStage
}

pub fn render_command(command: &ContourCommand) -> Option<String>
{
    match *command {
        ContourCommand::Initialize => Some(String::from("IN;")),
        ContourCommand::Jump{x, y} => Some(format!("PU{:.3},{:.3};", x, y)),
        ContourCommand::Mark{x, y} => Some(format!("PD{:.3},{:.3};", x, y)),
        ContourCommand::LaserPower{power} => Some(format!("PW{:.3};", power)),
        ContourCommand::MarkSpeed{speed} => Some(format!("VS{:.3};", speed)),
        // no ring channel in this format
        ContourCommand::RingLaserPower{..} => None
    }
}

impl SmartMoveInterpreter
{
    /// Stages in memory, or in `debug_file` when given
    pub fn new(debug_file: Option<PathBuf>) -> SmartMoveInterpreter
    {
        let stage = match debug_file {
            Some(path) => ContourStage::DebugFile(path, Vec::new()),
            None => ContourStage::Memory(Vec::new())
        };
        SmartMoveInterpreter{stage}
    }

    pub fn translate(&mut self, contour: &[ContourCommand]) -> Result<()>
    {
        let mut text = String::new();
        let mut skipped = 0;
        for command in contour {
            match render_command(command) {
                Some(l) => {
                    text += &l;
                    text.push('\n');
                },
                None => skipped += 1
            }
        }
        debug!(commands = contour.len(), skipped, "contour rendered");
        match &mut self.stage {
            ContourStage::Memory(buffer) => {
                buffer.clear();
                buffer.extend_from_slice(text.as_bytes());
            },
            ContourStage::DebugFile(path, buffer) => {
                let mut file = fs::File::create(&path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source
                })?;
                file.write_all(text.as_bytes()).map_err(|source| Error::Io {
                    path: path.clone(),
                    source
                })?;
                buffer.clear();
                buffer.extend_from_slice(text.as_bytes());
            }
        }
        Ok(())
    }

    pub fn staged(&self) -> &[u8]
    {
        match &self.stage {
            ContourStage::Memory(buffer) => buffer,
            ContourStage::DebugFile(_, buffer) => buffer
        }
    }

    pub fn stage(&self) -> &ContourStage
    {
        &self.stage
    }
}
