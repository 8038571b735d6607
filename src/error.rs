//! Typed error codes surfaced from construction, wiring, and preparation.
//!
//! Run-time errors inside `Proc::process` are never raised through this
//! type — see the real-time discipline notes on [`crate::proc`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("memory allocation failed")]
    MemErr,

    #[error("input index {index} out of bounds (proc has {count} inputs)")]
    InputBoundsErr { index: usize, count: usize },

    #[error("input slot {index} is already occupied")]
    InputOccupiedErr { index: usize },

    #[error("proc has no input named '{name}'")]
    NoInputErr { name: String },

    #[error("signal frame size mismatch: expected {expected}, got {got}")]
    InputMismatchErr { expected: usize, got: usize },

    #[error(
        "vector size {vector_size} is not an integer multiple of the resample ratio \
         ({numerator}/{denominator})"
    )]
    FractionalBlockSizeErr {
        vector_size: usize,
        numerator: u32,
        denominator: u32,
    },

    #[error("cannot connect procs belonging to different containers")]
    ConnectScopeErr,

    #[error("name '{name}' is already in use in this container")]
    NameInUseErr { name: String },

    #[error("path component '{name}' is not a container")]
    HeadNotContainerErr { name: String },

    #[error("no proc named '{name}' found")]
    NameNotFoundErr { name: String },

    #[error("unknown proc class '{class_name}'")]
    NewProcErr { class_name: String },

    #[error("index {index} is invalid (valid range is 0..{count})")]
    BadIndexErr { index: i64, count: usize },

    #[error("graph contains a cycle and no topological sort was requested")]
    CyclicGraph,

    #[error("unknown error: {0}")]
    UnknownErr(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
