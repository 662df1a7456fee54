//! System-wide constants: tool names, bus coordinates, and poll timings.

use std::time::Duration;

/// Container-spawning tool invoked for every task.
pub const NSPAWN_BINARY: &str = "systemd-nspawn";

/// Machine and image management CLI shipped with systemd.
pub const MACHINECTL_BINARY: &str = "machinectl";

/// Bus introspection CLI used by the bus adapter.
pub const BUSCTL_BINARY: &str = "busctl";

/// Directory that exists only when systemd is PID 1.
pub const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";

/// Bus name of the machine manager.
pub const MACHINE1_DEST: &str = "org.freedesktop.machine1";
/// Object path of the machine manager.
pub const MACHINE1_PATH: &str = "/org/freedesktop/machine1";
/// Manager interface of the machine manager.
pub const MACHINE1_MANAGER: &str = "org.freedesktop.machine1.Manager";

/// Bus name of the image import service.
pub const IMPORT1_DEST: &str = "org.freedesktop.import1";
/// Object path of the image import service.
pub const IMPORT1_PATH: &str = "/org/freedesktop/import1";
/// Manager interface of the image import service.
pub const IMPORT1_MANAGER: &str = "org.freedesktop.import1.Manager";

/// Interval between machine descriptor queries.
pub const DESCRIBE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Interval between transfer list queries while an image is pulled.
pub const TRANSFER_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default deadline for machine descriptor lookups, in seconds.
pub const DEFAULT_DESCRIBE_TIMEOUT_SECS: u64 = 30;

/// Root filesystem path guarded against non-ephemeral use.
pub const HOST_ROOT: &str = "/";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "nspawnctl";
