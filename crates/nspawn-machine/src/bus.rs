//! System management bus capability.
//!
//! The bus answers with loosely typed property bags. [`crate::descriptor`]
//! turns them into typed descriptors.

use std::collections::BTreeMap;

use async_trait::async_trait;
use nspawn_common::error::Result;
use nspawn_common::types::{ImageKind, VerifyMode};

/// A single property value as reported by the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean (`b`).
    Bool(bool),
    /// Unsigned 32-bit integer (`u`).
    U32(u32),
    /// Unsigned 64-bit integer (`t`).
    U64(u64),
    /// Signed 32-bit integer (`i`).
    I32(i32),
    /// Double (`d`).
    F64(f64),
    /// String or object path (`s`, `o`).
    Str(String),
    /// Byte array (`ay`).
    Bytes(Vec<u8>),
    /// Array of signed 32-bit integers (`ai`).
    I32Array(Vec<i32>),
}

impl PropertyValue {
    /// Short name of the value's shape, used in decode errors and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::I32(_) => "i32",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::I32Array(_) => "i32 array",
        }
    }
}

/// Property name to value mapping returned by describe calls.
pub type PropertyBag = BTreeMap<String, PropertyValue>;

/// An image transfer known to the import service.
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    /// Opaque transfer identifier.
    pub id: u32,
    /// Fraction completed; may hold sentinel values before the size is known.
    pub progress: f64,
    /// Transfer type as reported by the service (`pull-tar`, `pull-raw`, ...).
    pub kind: String,
    /// Remote URL.
    pub remote: String,
    /// Local image name.
    pub local: String,
}

/// Handle to a transfer started by [`MachineBus::pull_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    /// Transfer identifier, matched against [`Transfer::id`].
    pub id: u32,
    /// Bus object path of the transfer.
    pub path: String,
}

/// Parameters of an image pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    /// Where to fetch the image from.
    pub url: String,
    /// Local name to store the image under.
    pub name: String,
    /// Verification mode.
    pub verify: VerifyMode,
    /// Image format.
    pub kind: ImageKind,
    /// Replace an existing image with the same name.
    pub force: bool,
}

/// Queries and commands the driver issues against the management bus.
#[async_trait]
pub trait MachineBus: Send + Sync {
    /// Returns the property set of a registered machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the machine is unknown or the bus call fails.
    async fn describe_container(&self, name: &str) -> Result<PropertyBag>;

    /// Returns the property set of a named image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is unknown or the bus call fails.
    async fn describe_image(&self, name: &str) -> Result<PropertyBag>;

    /// Lists the transfers currently active in the import service.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus call fails.
    async fn list_transfers(&self) -> Result<Vec<Transfer>>;

    /// Starts pulling an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the import service refuses the transfer.
    async fn pull_image(&self, request: &PullRequest) -> Result<TransferHandle>;
}
