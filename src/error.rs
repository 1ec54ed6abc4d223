use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::figure_welding::{ListState, WobbleError};
use crate::orchestrator::GatePhase;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse figure: {0}")]
    Figure(#[from] serde_json::Error),
    #[error(transparent)]
    Wobble(#[from] WobbleError),
    #[error("no weld figure loaded")]
    NoWeldFigure,
    #[error("{operation} not allowed in state {state:?}")]
    OutOfOrder {
        operation: &'static str,
        state: ListState,
    },
    #[error("list {0} is still executing")]
    ListBusy(u32),
    #[error("contour needs {needed} list entries, list memory holds {capacity}")]
    TooManyContourPoints { needed: usize, capacity: usize },
    #[error("connection to {address} failed: {source}")]
    Connection {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("unexpected reply to '{command}': '{reply}'")]
    UnexpectedReply { command: String, reply: String },
    #[error("non-numeric reply to '{command}': '{reply}'")]
    NonNumericReply { command: String, reply: String },
    #[error("start welding not ready after {waited:?}, gate in phase {phase:?}")]
    GateTimeout { waited: Duration, phase: GatePhase },
    #[error("a request for seam {0} is already in flight")]
    SeamAlreadyRequested(u32),
    #[error("seam aborted before start welding was ready")]
    GateAborted,
    #[error("failed to start the {name} worker: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("orchestrator is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Fatal errors abort the current seam and are shown to the operator.
    /// Everything else is logged and the seam continues with defaults.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Io { .. } | Error::Config { .. } | Error::Figure(_) => false,
            Error::Wobble(e) => e.is_fatal(),
            Error::NoWeldFigure | Error::OutOfOrder { .. } => true,
            Error::TooManyContourPoints { .. } | Error::ListBusy(_) => true,
            Error::Connection { .. }
            | Error::Transport(_)
            | Error::UnexpectedReply { .. }
            | Error::NonNumericReply { .. } => true,
            Error::GateTimeout { .. } => true,
            Error::Spawn { .. } => true,
            Error::SeamAlreadyRequested(_) | Error::GateAborted | Error::ShuttingDown => false,
        }
    }
}
