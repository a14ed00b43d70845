//! Error types for CPG operations

use cpg_soc::{BusStopId, ClkId, ResetId};
use thiserror::Error;

/// Result type alias for CPG operations
pub type Result<T> = std::result::Result<T, CpgError>;

/// Structural problems found while building the graph from a descriptor.
///
/// Always fatal: no partial graph is exposed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Two nodes share an id
    #[error("Duplicate clock id {id}")]
    DuplicateId {
        /// Repeated id
        id: ClkId,
    },

    /// A parent reference does not name an earlier node
    #[error("Clock {node}: parent {parent} is not defined before it")]
    UndefinedParent {
        /// Referencing node
        node: &'static str,
        /// Missing parent
        parent: ClkId,
    },

    /// Divider table violates its invariants
    #[error("Clock {node}: malformed divider table ({reason})")]
    MalformedTable {
        /// Divider name
        node: &'static str,
        /// What is wrong
        reason: &'static str,
    },

    /// Mux parent list is unusable
    #[error("Clock {node}: malformed mux ({reason})")]
    MalformedMux {
        /// Mux name
        node: &'static str,
        /// What is wrong
        reason: &'static str,
    },

    /// Fixed factor with a zero multiplier or divisor
    #[error("Clock {node}: fixed factor must be non-zero")]
    ZeroFactor {
        /// Node name
        node: &'static str,
    },

    /// A bit or field does not fit in its 32-bit register
    #[error("{owner}: bits of register {reg:#x} out of range ({reason})")]
    BitOutOfRange {
        /// Clock, reset line or group naming the bits
        owner: &'static str,
        /// Register offset
        reg: u32,
        /// What is wrong
        reason: &'static str,
    },

    /// Internal (`.`-prefixed) node inside the exported id range
    #[error("Clock {node} ({id}) is internal but has an exported id")]
    ExportBoundary {
        /// Node name
        node: &'static str,
        /// Node id
        id: ClkId,
    },

    /// Two reset lines share an id
    #[error("Duplicate reset id {id}")]
    DuplicateReset {
        /// Repeated id
        id: ResetId,
    },

    /// Two bus-stop groups share an id
    #[error("Duplicate bus-stop id {id}")]
    DuplicateBusStop {
        /// Repeated id
        id: BusStopId,
    },

    /// A reset line or bus-stop group lists something that is not a module clock
    #[error("{owner}: {id} is not a module clock")]
    NotAModule {
        /// Reset line or group name
        owner: &'static str,
        /// Offending id
        id: ClkId,
    },

    /// A module clock names a reset line that does not exist or does not list it
    #[error("Module clock {node}: reset {reset} missing or does not list it")]
    MissingReset {
        /// Module clock name
        node: &'static str,
        /// Declared reset
        reset: ResetId,
    },

    /// A module clock names a bus-stop group that does not exist or does not list it
    #[error("Module clock {node}: bus-stop group {group} missing or does not list it")]
    MissingBusStop {
        /// Module clock name
        node: &'static str,
        /// Declared group
        group: BusStopId,
    },
}

/// Errors that can occur during CPG operations
#[derive(Debug, Error)]
pub enum CpgError {
    /// Descriptor failed validation
    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// A clock monitor or status bit never reported ready
    #[error("Clock {clock}: hardware did not respond after {polls} polls")]
    HardwareTimeout {
        /// Clock name
        clock: &'static str,
        /// Polls issued
        polls: u32,
    },

    /// A reset monitor never reported the module out of reset
    #[error("Reset {line}: still in reset after {polls} polls")]
    ResetTimeout {
        /// Reset line name
        line: &'static str,
        /// Polls issued
        polls: u32,
    },

    /// `disable` without a matching `enable`
    #[error("Clock {clock}: disable without matching enable")]
    RefcountUnderflow {
        /// Clock name
        clock: &'static str,
    },

    /// Operation not supported by this kind of node
    #[error("Clock {clock}: {op} not supported")]
    UnsupportedOperation {
        /// Clock name
        clock: &'static str,
        /// Attempted operation
        op: &'static str,
    },

    /// Latched field value has no table entry
    #[error("Clock {clock}: register value {value:#x} has no divisor")]
    InvalidDivisor {
        /// Clock name
        clock: &'static str,
        /// Latched value
        value: u32,
    },

    /// Id outside the exported range or not defined
    #[error("Clock {id} is not exported")]
    NotExported {
        /// Requested id
        id: ClkId,
    },

    /// Reset line id not defined
    #[error("Unknown reset line {id}")]
    UnknownReset {
        /// Requested id
        id: ResetId,
    },

    /// Bus-stop group id not defined
    #[error("Unknown bus-stop group {id}")]
    UnknownBusStop {
        /// Requested id
        id: BusStopId,
    },

    /// Register window could not be mapped
    #[error("Failed to map register window: {reason}")]
    MapFailed {
        /// Reason for failure
        reason: String,
    },

    /// I/O error while opening the register window
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl CpgError {
    /// Create a hardware timeout error
    pub fn hardware_timeout(clock: &'static str, polls: u32) -> Self {
        Self::HardwareTimeout { clock, polls }
    }

    /// Create an unsupported operation error
    pub fn unsupported(clock: &'static str, op: &'static str) -> Self {
        Self::UnsupportedOperation { clock, op }
    }

    /// Create an invalid divisor error
    pub fn invalid_divisor(clock: &'static str, value: u32) -> Self {
        Self::InvalidDivisor { clock, value }
    }

    /// Create a map failure error
    pub fn map_failed(reason: impl Into<String>) -> Self {
        Self::MapFailed {
            reason: reason.into(),
        }
    }

    /// True for errors the caller may retry with the same call.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::HardwareTimeout { .. } | Self::ResetTimeout { .. })
    }
}
