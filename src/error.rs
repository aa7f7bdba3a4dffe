//! Unified error type for the Aquafeed firmware.
//!
//! Every subsystem error converts into this enum so the bring-up path
//! and the periodic service loops handle failures uniformly. Variants
//! are cheap to pass around; none of them carries an allocation beyond
//! a static description.

use core::fmt;

use crate::app::ports::{BusError, StorageError};
use crate::connectivity::NetError;
use crate::store::StoreError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A persisted document could not be read, parsed or written.
    Store(StoreError),
    /// Raw storage backend failure.
    Storage(StorageError),
    /// A network interface driver failed.
    Net(NetError),
    /// The message bus rejected an operation.
    Bus(BusError),
    /// An actuator or sensor peripheral failed.
    Peripheral(&'static str),
    /// Subsystem initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Net(e) => write!(f, "net: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Peripheral(msg) => write!(f, "peripheral: {msg}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NetError> for Error {
    fn from(e: NetError) -> Self {
        Self::Net(e)
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}
