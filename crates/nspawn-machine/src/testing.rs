//! Scripted in-memory bus for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use nspawn_common::error::{NspawnError, Result};

use crate::bus::{MachineBus, PropertyBag, PropertyValue, PullRequest, Transfer, TransferHandle};

pub const PULL_TRANSFER_ID: u32 = 7;

#[derive(Default)]
pub struct StaticBus {
    images: BTreeMap<String, PropertyBag>,
    machine: Option<PropertyBag>,
    machine_ready_after: usize,
    machine_calls: AtomicUsize,
    image_calls: AtomicUsize,
    list_calls: AtomicUsize,
    transfers: Mutex<VecDeque<Result<Vec<Transfer>>>>,
    pulls: Mutex<Vec<PullRequest>>,
}

impl StaticBus {
    pub fn with_image(mut self, name: &str, bag: PropertyBag) -> Self {
        let _ = self.images.insert(name.to_string(), bag);
        self
    }

    /// The machine becomes describable after `failures` failed calls.
    pub fn with_machine(mut self, bag: PropertyBag, failures: usize) -> Self {
        self.machine = Some(bag);
        self.machine_ready_after = failures;
        self
    }

    /// One list result per `list_transfers` call; an exhausted script
    /// answers with an empty list.
    pub fn with_transfers(self, script: Vec<Result<Vec<Transfer>>>) -> Self {
        *self.transfers.lock().unwrap() = script.into();
        self
    }

    pub fn machine_calls(&self) -> usize {
        self.machine_calls.load(Ordering::SeqCst)
    }

    pub fn image_lookups(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MachineBus for StaticBus {
    async fn describe_container(&self, name: &str) -> Result<PropertyBag> {
        let n = self.machine_calls.fetch_add(1, Ordering::SeqCst);
        match &self.machine {
            Some(bag) if n >= self.machine_ready_after => Ok(bag.clone()),
            _ => Err(NspawnError::Bus {
                message: format!("no machine '{name}' known"),
            }),
        }
    }

    async fn describe_image(&self, name: &str) -> Result<PropertyBag> {
        let _ = self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.images.get(name).cloned().ok_or_else(|| NspawnError::Bus {
            message: format!("no image '{name}' known"),
        })
    }

    async fn list_transfers(&self) -> Result<Vec<Transfer>> {
        let _ = self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.transfers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn pull_image(&self, request: &PullRequest) -> Result<TransferHandle> {
        self.pulls.lock().unwrap().push(request.clone());
        Ok(TransferHandle {
            id: PULL_TRANSFER_ID,
            path: format!("/org/freedesktop/import1/transfer/_{PULL_TRANSFER_ID}"),
        })
    }
}

pub fn transfer(id: u32, progress: f64) -> Transfer {
    Transfer {
        id,
        progress,
        kind: "pull-tar".into(),
        remote: "https://example.com/debian.tar.xz".into(),
        local: "debian".into(),
    }
}

pub fn image_bag(path: &str) -> PropertyBag {
    let mut bag = PropertyBag::new();
    for key in [
        "CreationTimestamp",
        "Limit",
        "LimitExclusive",
        "ModificationTimestamp",
        "Usage",
        "UsageExclusive",
    ] {
        let _ = bag.insert(key.into(), PropertyValue::U64(0));
    }
    let _ = bag.insert("Name".into(), PropertyValue::Str("debian".into()));
    let _ = bag.insert("Path".into(), PropertyValue::Str(path.into()));
    let _ = bag.insert("ReadOnly".into(), PropertyValue::Bool(false));
    let _ = bag.insert("Type".into(), PropertyValue::Str("directory".into()));
    bag
}

pub fn machine_bag(name: &str) -> PropertyBag {
    let mut bag = PropertyBag::new();
    let _ = bag.insert("Name".into(), PropertyValue::Str(name.into()));
    let _ = bag.insert("TimestampMonotonic".into(), PropertyValue::U64(1));
    let _ = bag.insert("Timestamp".into(), PropertyValue::U64(2));
    let _ = bag.insert("NetworkInterfaces".into(), PropertyValue::I32Array(vec![]));
    let _ = bag.insert("Id".into(), PropertyValue::Bytes(vec![1; 16]));
    let _ = bag.insert("Class".into(), PropertyValue::Str("container".into()));
    let _ = bag.insert("Leader".into(), PropertyValue::U32(100));
    let _ = bag.insert("RootDirectory".into(), PropertyValue::Str("/var/lib/machines/web".into()));
    let _ = bag.insert("Service".into(), PropertyValue::Str("nspawn".into()));
    let _ = bag.insert("State".into(), PropertyValue::Str("running".into()));
    let _ = bag.insert("Unit".into(), PropertyValue::Str(format!("machine-{name}.scope")));
    bag
}
