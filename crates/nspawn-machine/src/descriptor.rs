//! Typed decoding of machine and image property bags.

use nspawn_common::error::{NspawnError, Result};
use serde::Serialize;

use crate::bus::{PropertyBag, PropertyValue};

/// Runtime properties of a registered machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MachineDescriptor {
    /// Machine name.
    pub name: String,
    /// Registration time on the monotonic clock, in microseconds.
    pub timestamp_monotonic: u64,
    /// Registration time on the realtime clock, in microseconds.
    pub timestamp: u64,
    /// Host-side interface indices assigned to the machine.
    pub network_interfaces: Vec<i32>,
    /// 128-bit machine id.
    pub id: Vec<u8>,
    /// Machine class (`container`, `vm`).
    pub class: String,
    /// PID of the machine's leader process.
    pub leader: u32,
    /// Root directory of the machine.
    pub root_directory: String,
    /// Service that registered the machine.
    pub service: String,
    /// Machine state (`opening`, `running`, `closing`).
    pub state: String,
    /// Scope unit the machine runs in.
    pub unit: String,
}

impl MachineDescriptor {
    /// Decodes a machine property bag.
    ///
    /// # Errors
    ///
    /// Returns [`NspawnError::Decode`] naming the first missing or mistyped
    /// property.
    pub fn decode(bag: &PropertyBag) -> Result<Self> {
        let p = Props(bag);
        Ok(Self {
            name: p.string("Name")?,
            timestamp_monotonic: p.u64("TimestampMonotonic")?,
            timestamp: p.u64("Timestamp")?,
            network_interfaces: p.i32_array("NetworkInterfaces")?,
            id: p.bytes("Id")?,
            class: p.string("Class")?,
            leader: p.u32("Leader")?,
            root_directory: p.string("RootDirectory")?,
            service: p.string("Service")?,
            state: p.string("State")?,
            unit: p.string("Unit")?,
        })
    }
}

/// Properties of an image known to the machine manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDescriptor {
    /// Creation time, in microseconds.
    pub creation_timestamp: u64,
    /// Size limit, in bytes.
    pub limit: u64,
    /// Exclusive size limit, in bytes.
    pub limit_exclusive: u64,
    /// Last modification time, in microseconds.
    pub modification_timestamp: u64,
    /// Image name.
    pub name: String,
    /// Location of the image on disk.
    pub path: String,
    /// Whether the image is read-only.
    pub read_only: bool,
    /// Image type (`directory`, `subvolume`, `raw`, `block`).
    pub kind: String,
    /// Disk usage, in bytes.
    pub usage: u64,
    /// Exclusive disk usage, in bytes.
    pub usage_exclusive: u64,
}

impl ImageDescriptor {
    /// Decodes an image property bag.
    ///
    /// # Errors
    ///
    /// Returns [`NspawnError::Decode`] naming the first missing or mistyped
    /// property.
    pub fn decode(bag: &PropertyBag) -> Result<Self> {
        let p = Props(bag);
        Ok(Self {
            creation_timestamp: p.u64("CreationTimestamp")?,
            limit: p.u64("Limit")?,
            limit_exclusive: p.u64("LimitExclusive")?,
            modification_timestamp: p.u64("ModificationTimestamp")?,
            name: p.string("Name")?,
            path: p.string("Path")?,
            read_only: p.bool("ReadOnly")?,
            kind: p.string("Type")?,
            usage: p.u64("Usage")?,
            usage_exclusive: p.u64("UsageExclusive")?,
        })
    }
}

struct Props<'a>(&'a PropertyBag);

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        fn $name(&self, key: &'static str) -> Result<$ty> {
            match self.0.get(key) {
                Some(PropertyValue::$variant(v)) => Ok(v.clone()),
                other => Err(mismatch(key, $expected, other)),
            }
        }
    };
}

impl Props<'_> {
    typed_getter!(string, Str, String, "string");
    typed_getter!(u64, U64, u64, "u64");
    typed_getter!(u32, U32, u32, "u32");
    typed_getter!(bool, Bool, bool, "bool");
    typed_getter!(bytes, Bytes, Vec<u8>, "bytes");
    typed_getter!(i32_array, I32Array, Vec<i32>, "i32 array");
}

fn mismatch(
    key: &'static str,
    expected: &'static str,
    found: Option<&PropertyValue>,
) -> NspawnError {
    match found {
        Some(value) => {
            tracing::debug!(key, found = value.kind(), expected, "property type mismatch");
        }
        None => tracing::debug!(key, expected, "property missing"),
    }
    NspawnError::Decode {
        field: key,
        expected,
    }
}
