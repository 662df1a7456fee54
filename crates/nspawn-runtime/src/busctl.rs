//! [`MachineBus`] adapter that drives `busctl --json=short`.
//!
//! Each query runs one `busctl call` against the machine manager or the
//! import service and decodes its JSON reply. Variant values are mapped
//! onto [`PropertyValue`] by their bus signature; properties with shapes
//! the driver never reads are skipped.

use async_trait::async_trait;
use nspawn_common::constants::{
    BUSCTL_BINARY, IMPORT1_DEST, IMPORT1_MANAGER, IMPORT1_PATH, MACHINE1_DEST, MACHINE1_MANAGER,
    MACHINE1_PATH,
};
use nspawn_common::error::{NspawnError, Result};
use nspawn_common::types::ImageKind;
use nspawn_machine::bus::{
    MachineBus, PropertyBag, PropertyValue, PullRequest, Transfer, TransferHandle,
};
use serde_json::Value;
use tokio::process::Command;

const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";
const MACHINE_IFACE: &str = "org.freedesktop.machine1.Machine";
const IMAGE_IFACE: &str = "org.freedesktop.machine1.Image";

/// Bus client that shells out to `busctl` on the system bus.
#[derive(Debug, Clone)]
pub struct BusctlBus {
    binary: String,
}

impl BusctlBus {
    /// Creates a client using `busctl` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: BUSCTL_BINARY.to_string(),
        }
    }

    /// Creates a client using a specific `busctl` binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn call(
        &self,
        dest: &str,
        path: &str,
        iface: &str,
        method: &str,
        signature_and_args: &[&str],
    ) -> Result<Value> {
        tracing::trace!(dest, path, method, "busctl call");
        let output = Command::new(&self.binary)
            .args(["--system", "--json=short", "call", dest, path, iface, method])
            .args(signature_and_args)
            .output()
            .await
            .map_err(|e| NspawnError::Bus {
                message: format!("failed to run {}: {e}", self.binary),
            })?;
        if !output.status.success() {
            return Err(NspawnError::Bus {
                message: format!(
                    "{iface}.{method} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn properties(&self, object: &str, iface: &str) -> Result<PropertyBag> {
        let reply = self
            .call(MACHINE1_DEST, object, PROPERTIES_IFACE, "GetAll", &["s", iface])
            .await?;
        parse_property_bag(&reply)
    }
}

impl Default for BusctlBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MachineBus for BusctlBus {
    async fn describe_container(&self, name: &str) -> Result<PropertyBag> {
        let reply = self
            .call(MACHINE1_DEST, MACHINE1_PATH, MACHINE1_MANAGER, "GetMachine", &["s", name])
            .await?;
        let object = parse_object_path(&reply)?;
        self.properties(&object, MACHINE_IFACE).await
    }

    async fn describe_image(&self, name: &str) -> Result<PropertyBag> {
        let reply = self
            .call(MACHINE1_DEST, MACHINE1_PATH, MACHINE1_MANAGER, "GetImage", &["s", name])
            .await?;
        let object = parse_object_path(&reply)?;
        self.properties(&object, IMAGE_IFACE).await
    }

    async fn list_transfers(&self) -> Result<Vec<Transfer>> {
        let reply = self
            .call(IMPORT1_DEST, IMPORT1_PATH, IMPORT1_MANAGER, "ListTransfers", &[])
            .await?;
        parse_transfers(&reply)
    }

    async fn pull_image(&self, request: &PullRequest) -> Result<TransferHandle> {
        let method = match request.kind {
            ImageKind::Tar => "PullTar",
            ImageKind::Raw => "PullRaw",
        };
        let force = if request.force { "true" } else { "false" };
        let reply = self
            .call(
                IMPORT1_DEST,
                IMPORT1_PATH,
                IMPORT1_MANAGER,
                method,
                &[
                    "sssb",
                    request.url.as_str(),
                    request.name.as_str(),
                    request.verify.as_str(),
                    force,
                ],
            )
            .await?;
        parse_transfer_handle(&reply)
    }
}

fn malformed(what: &str, reply: &Value) -> NspawnError {
    NspawnError::Bus {
        message: format!("unexpected {what} reply: {reply}"),
    }
}

fn first_out_arg(reply: &Value) -> Option<&Value> {
    reply.get("data")?.get(0)
}

/// Extracts the object path from a `GetMachine`/`GetImage` reply.
///
/// # Errors
///
/// Returns a bus error if the reply has an unexpected shape.
pub fn parse_object_path(reply: &Value) -> Result<String> {
    first_out_arg(reply)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| malformed("object path", reply))
}

/// Decodes a `Properties.GetAll` reply into a property bag.
///
/// # Errors
///
/// Returns a bus error if the reply has an unexpected shape.
pub fn parse_property_bag(reply: &Value) -> Result<PropertyBag> {
    let props = first_out_arg(reply)
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("GetAll", reply))?;

    let mut bag = PropertyBag::new();
    for (name, variant) in props {
        let signature = variant.get("type").and_then(Value::as_str).unwrap_or_default();
        let data = variant.get("data").unwrap_or(&Value::Null);
        match variant_value(signature, data) {
            Some(value) => {
                let _ = bag.insert(name.clone(), value);
            }
            None => tracing::trace!(property = %name, signature, "skipping property"),
        }
    }
    Ok(bag)
}

fn variant_value(signature: &str, data: &Value) -> Option<PropertyValue> {
    Some(match signature {
        "b" => PropertyValue::Bool(data.as_bool()?),
        "u" => PropertyValue::U32(u32::try_from(data.as_u64()?).ok()?),
        "t" => PropertyValue::U64(data.as_u64()?),
        "i" => PropertyValue::I32(i32::try_from(data.as_i64()?).ok()?),
        "d" => PropertyValue::F64(data.as_f64().unwrap_or(f64::NAN)),
        "s" | "o" | "g" => PropertyValue::Str(data.as_str()?.to_string()),
        "ay" => PropertyValue::Bytes(
            data.as_array()?
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<_>>()?,
        ),
        "ai" => PropertyValue::I32Array(
            data.as_array()?
                .iter()
                .map(|i| i.as_i64().and_then(|i| i32::try_from(i).ok()))
                .collect::<Option<_>>()?,
        ),
        _ => return None,
    })
}

/// Decodes a `ListTransfers` reply (`a(usssdo)`).
///
/// # Errors
///
/// Returns a bus error if the reply has an unexpected shape.
pub fn parse_transfers(reply: &Value) -> Result<Vec<Transfer>> {
    let rows = first_out_arg(reply)
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("ListTransfers", reply))?;
    rows.iter()
        .map(|row| parse_transfer_row(row).ok_or_else(|| malformed("transfer", row)))
        .collect()
}

fn parse_transfer_row(row: &Value) -> Option<Transfer> {
    let field = |i: usize| row.get(i);
    let text = |i: usize| field(i).and_then(Value::as_str).map(str::to_string);
    Some(Transfer {
        id: u32::try_from(field(0)?.as_u64()?).ok()?,
        kind: text(1)?,
        remote: text(2)?,
        local: text(3)?,
        progress: field(4)?.as_f64().unwrap_or(f64::NAN),
    })
}

/// Decodes a `PullTar`/`PullRaw` reply (`uo`).
///
/// # Errors
///
/// Returns a bus error if the reply has an unexpected shape.
pub fn parse_transfer_handle(reply: &Value) -> Result<TransferHandle> {
    let data = reply.get("data").ok_or_else(|| malformed("pull", reply))?;
    let id = data
        .get(0)
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok());
    let path = data.get(1).and_then(Value::as_str);
    match (id, path) {
        (Some(id), Some(path)) => Ok(TransferHandle {
            id,
            path: path.to_string(),
        }),
        _ => Err(malformed("pull", reply)),
    }
}

#[cfg(test)]
mod tests {
    use nspawn_machine::descriptor::MachineDescriptor;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_object_path_reply() {
        let reply = json!({"type": "o", "data": ["/org/freedesktop/machine1/machine/web"]});
        assert_eq!(
            parse_object_path(&reply).expect("path"),
            "/org/freedesktop/machine1/machine/web"
        );
        assert!(parse_object_path(&json!({"type": "o", "data": []})).is_err());
    }

    #[test]
    fn get_all_reply_decodes_into_machine_descriptor() {
        let reply = json!({
            "type": "a{sv}",
            "data": [{
                "Name": {"type": "s", "data": "web"},
                "Id": {"type": "ay", "data": [1, 2, 3]},
                "Timestamp": {"type": "t", "data": 1_700_000_000_000_000_u64},
                "TimestampMonotonic": {"type": "t", "data": 5_000_000},
                "Service": {"type": "s", "data": "systemd-nspawn"},
                "Unit": {"type": "s", "data": "machine-web.scope"},
                "Leader": {"type": "u", "data": 4242},
                "Class": {"type": "s", "data": "container"},
                "RootDirectory": {"type": "s", "data": "/var/lib/machines/web"},
                "NetworkInterfaces": {"type": "ai", "data": [5]},
                "VSockCID": {"type": "u", "data": 4_294_967_295_u64},
                "SSHAddress": {"type": "s", "data": ""},
                "State": {"type": "s", "data": "running"}
            }]
        });
        let bag = parse_property_bag(&reply).expect("bag");
        let desc = MachineDescriptor::decode(&bag).expect("descriptor");
        assert_eq!(desc.leader, 4242);
        assert_eq!(desc.id, vec![1, 2, 3]);
        assert_eq!(desc.network_interfaces, vec![5]);
    }

    #[test]
    fn unknown_signatures_are_skipped() {
        let reply = json!({
            "type": "a{sv}",
            "data": [{
                "Addresses": {"type": "a(iay)", "data": []},
                "Name": {"type": "s", "data": "web"}
            }]
        });
        let bag = parse_property_bag(&reply).expect("bag");
        assert_eq!(bag.len(), 1);
        assert_eq!(bag["Name"], PropertyValue::Str("web".into()));
    }

    #[test]
    fn out_of_range_values_are_skipped() {
        let reply = json!({
            "type": "a{sv}",
            "data": [{"Leader": {"type": "u", "data": 5_000_000_000_u64}}]
        });
        assert!(parse_property_bag(&reply).expect("bag").is_empty());
    }

    #[test]
    fn parses_transfer_list() {
        let reply = json!({
            "type": "a(usssdo)",
            "data": [[
                [7, "pull-tar", "https://example.com/d.tar.xz", "debian", 0.5, "/transfer/_7"],
                [9, "pull-raw", "https://example.com/f.raw", "fedora", null, "/transfer/_9"]
            ]]
        });
        let transfers = parse_transfers(&reply).expect("transfers");
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].id, 7);
        assert!((transfers[0].progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(transfers[1].local, "fedora");
        assert!(transfers[1].progress.is_nan());
    }

    #[test]
    fn empty_transfer_list() {
        let reply = json!({"type": "a(usssdo)", "data": [[]]});
        assert!(parse_transfers(&reply).expect("transfers").is_empty());
    }

    #[test]
    fn parses_pull_reply() {
        let reply = json!({"type": "uo", "data": [12, "/org/freedesktop/import1/transfer/_12"]});
        let handle = parse_transfer_handle(&reply).expect("handle");
        assert_eq!(handle.id, 12);
        assert!(handle.path.ends_with("_12"));
        assert!(parse_transfer_handle(&json!({"type": "uo", "data": ["x"]})).is_err());
    }

    #[tokio::test]
    async fn missing_busctl_binary_is_a_bus_error() {
        let bus = BusctlBus::with_binary("/nonexistent/busctl");
        let err = bus.list_transfers().await.expect_err("no binary");
        assert!(matches!(err, NspawnError::Bus { .. }));
    }
}
