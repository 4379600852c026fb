use thiserror::Error;

use crate::{OrderId, Time};

/// Outcomes reported by the dispatcher when an operation is refused.
/// The dispatcher stays usable after any of them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("order {0} is not scheduled")]
    NotFound(OrderId),

    #[error("order {0} has already been delivered")]
    AlreadyDelivered(OrderId),

    #[error("order {0} is already scheduled")]
    DuplicateId(OrderId),

    #[error("flight time must be positive, got {0}")]
    InvalidFlightTime(Time),

    #[error("scheduling order {0} would move a time past the representable range")]
    TimeOverflow(OrderId),
}

/// Problems loading or parsing a scenario script
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: unknown command `{command}`")]
    UnknownCommand { line: usize, command: String },

    #[error("line {line}: `{command}` takes {expected} arguments, got {found}")]
    Arity {
        line: usize,
        command: String,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: invalid argument `{argument}`")]
    InvalidArgument { line: usize, argument: String },
}
