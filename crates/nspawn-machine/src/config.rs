//! Declarative container configuration.
//!
//! A [`ContainerConfig`] is decoded from a task's configuration block,
//! validated once, resolved once (the image path is filled in), and then
//! rendered into `systemd-nspawn` arguments for every launch attempt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nspawn_common::constants::HOST_ROOT;
use nspawn_common::error::{NspawnError, Result};
use serde::{Deserialize, Serialize};

use crate::bus::{MachineBus, PullRequest};
use crate::compat::string_map;

const VOLATILE_MODES: &[&str] = &["yes", "state", "overlay", "no"];
const CONSOLE_MODES: &[&str] = &["interactive", "read-only", "passive", "pipe"];
const RESOLV_CONF_MODES: &[&str] = &[
    "copy-host",
    "copy-static",
    "bind-host",
    "bind-static",
    "delete",
    "auto",
];
const DOWNLOAD_TYPES: &[&str] = &["raw", "tar"];
const VERIFY_MODES: &[&str] = &["no", "checksum", "signature"];

/// Configuration of one nspawn container.
///
/// Serialized key names are the external contract and differ from some
/// field names (`process_two`, `machine`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Run an init program inside the container (`--boot`).
    pub boot: bool,
    /// Run on a throw-away snapshot of the image (`--ephemeral`).
    pub ephemeral: bool,
    /// Run the command as PID 2 under a stub init (`--as-pid2`).
    #[serde(rename = "process_two")]
    pub run_as_pid_two: bool,
    /// Mount the root filesystem read-only (`--read-only`).
    pub read_only: bool,
    /// Enable user namespacing (`-U`).
    pub user_namespacing: bool,
    /// Entrypoint and arguments; empty uses the image default.
    pub command: Vec<String>,
    /// Console mode.
    pub console: String,
    /// Image directory, image file, or image name.
    pub image: String,
    /// Download the image before the first launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_download: Option<ImageDownload>,
    /// Machine name to register.
    #[serde(rename = "machine")]
    pub machine_name: String,
    /// `new-root[:old-root]` pivot inside the container.
    pub pivot_root: String,
    /// How `/etc/resolv.conf` is provided.
    pub resolv_conf: String,
    /// User to run the command as.
    pub user: String,
    /// Volatile mode.
    pub volatile: String,
    /// Working directory of the command.
    pub working_directory: String,
    /// Network namespace to join.
    pub network_namespace_path: String,
    /// Host path to container path bind mounts.
    #[serde(deserialize_with = "string_map")]
    pub bind: BTreeMap<String, String>,
    /// Read-only bind mounts.
    #[serde(deserialize_with = "string_map")]
    pub bind_read_only: BTreeMap<String, String>,
    /// Environment variables for the command.
    #[serde(deserialize_with = "string_map")]
    pub environment: BTreeMap<String, String>,
    /// Unit properties for the container scope.
    #[serde(deserialize_with = "string_map")]
    pub properties: BTreeMap<String, String>,
    #[serde(skip)]
    resolved_image_path: Option<PathBuf>,
}

/// Image download parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDownload {
    /// Source URL.
    pub url: String,
    /// Image format, `raw` or `tar`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Replace an existing image of the same name.
    pub force: bool,
    /// Verification mode, `no`, `checksum`, or `signature`.
    pub verify: String,
}

impl ImageDownload {
    /// Builds the bus pull request storing the image under `name`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unsupported type or verify mode.
    pub fn pull_request(&self, name: &str) -> Result<PullRequest> {
        Ok(PullRequest {
            url: self.url.clone(),
            name: name.to_string(),
            verify: self.verify.parse()?,
            kind: self.kind.parse()?,
            force: self.force,
        })
    }
}

impl ContainerConfig {
    /// Creates a configuration that runs `image` with every option unset.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid configuration document.
    pub fn from_json_str(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parses a configuration from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid configuration document.
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Loads a configuration file; `.yaml` and `.yml` are parsed as YAML,
    /// anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| NspawnError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        tracing::debug!(path = %path.display(), yaml = is_yaml, "loading container config");
        if is_yaml {
            Self::from_yaml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    /// Checks every configuration invariant and returns the first violation.
    ///
    /// Checks run in a fixed order: enumerated values, mutually exclusive
    /// options, path shapes, the host root guard, then the download block.
    ///
    /// # Errors
    ///
    /// Returns [`NspawnError::Validation`] for the first violated rule.
    pub fn validate(&self) -> Result<()> {
        one_of(
            "volatile",
            &self.volatile,
            VOLATILE_MODES,
            "must be one of yes, state, overlay, no",
        )?;
        one_of(
            "console",
            &self.console,
            CONSOLE_MODES,
            "must be one of interactive, read-only, passive, pipe",
        )?;
        one_of(
            "resolv_conf",
            &self.resolv_conf,
            RESOLV_CONF_MODES,
            "must be one of copy-host, copy-static, bind-host, bind-static, delete, auto",
        )?;

        if self.boot && self.run_as_pid_two {
            return Err(invalid("boot", "true", "boot and process_two may not be combined"));
        }
        if !self.volatile.is_empty() && self.user_namespacing {
            return Err(invalid(
                "volatile",
                &self.volatile,
                "volatile and user_namespacing may not be combined",
            ));
        }
        if self.read_only && self.user_namespacing {
            return Err(invalid(
                "read_only",
                "true",
                "read_only and user_namespacing may not be combined",
            ));
        }

        if !self.working_directory.is_empty()
            && !Path::new(&self.working_directory).is_absolute()
        {
            return Err(invalid(
                "working_directory",
                &self.working_directory,
                "not an absolute path",
            ));
        }
        if !self.pivot_root.is_empty()
            && !self.pivot_root.split(':').all(|p| Path::new(p).is_absolute())
        {
            return Err(invalid("pivot_root", &self.pivot_root, "not an absolute path"));
        }

        if self.image == HOST_ROOT
            && !(self.ephemeral || self.volatile == "yes" || self.volatile == "state")
        {
            return Err(invalid(
                "image",
                &self.image,
                "starting a container from the root directory requires ephemeral or volatile",
            ));
        }

        if let Some(download) = &self.image_download {
            if !DOWNLOAD_TYPES.contains(&download.kind.as_str()) {
                return Err(invalid(
                    "image_download.type",
                    &download.kind,
                    "must be one of raw, tar",
                ));
            }
            if !VERIFY_MODES.contains(&download.verify.as_str()) {
                return Err(invalid(
                    "image_download.verify",
                    &download.verify,
                    "must be one of no, checksum, signature",
                ));
            }
        }
        Ok(())
    }

    /// Resolves the image reference and stores the resulting path.
    ///
    /// # Errors
    ///
    /// Returns a render error if no image is configured, or the resolver's
    /// error if the image cannot be found.
    pub async fn resolve(&mut self, bus: &dyn MachineBus) -> Result<&Path> {
        if self.image.is_empty() {
            return Err(no_image());
        }
        let path = crate::image::resolve_image(&self.image, bus).await?;
        Ok(self.resolved_image_path.insert(path).as_path())
    }

    /// Sets the resolved image path directly, bypassing the resolver.
    #[must_use]
    pub fn with_resolved_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolved_image_path = Some(path.into());
        self
    }

    /// Returns the resolved image path, if resolution has run.
    #[must_use]
    pub fn resolved_image_path(&self) -> Option<&Path> {
        self.resolved_image_path.as_deref()
    }

    /// Renders the argument list using the resolved image path.
    ///
    /// # Errors
    ///
    /// Returns a render error if the image has not been resolved, plus any
    /// error from [`Self::render_with`].
    pub fn args(&self) -> Result<Vec<String>> {
        let path = self
            .resolved_image_path
            .as_deref()
            .ok_or_else(|| NspawnError::Render {
                message: format!("image {:?} has not been resolved", self.image),
            })?;
        self.render_with(path)
    }

    /// Renders the `systemd-nspawn` argument list for the given image path.
    ///
    /// The image selector is always the first two arguments and the command
    /// is always last. Map-valued options are emitted in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if no image is configured or `image_path` does not
    /// exist.
    pub fn render_with(&self, image_path: &Path) -> Result<Vec<String>> {
        if self.image.is_empty() {
            return Err(no_image());
        }
        let meta = std::fs::metadata(image_path).map_err(|e| NspawnError::Io {
            path: image_path.to_path_buf(),
            source: e,
        })?;
        let selector = if meta.is_dir() { "-D" } else { "-i" };
        let mut args = vec![selector.to_string(), image_path.to_string_lossy().into_owned()];

        let flags = [
            (self.boot, "--boot"),
            (self.ephemeral, "--ephemeral"),
            (self.run_as_pid_two, "--as-pid2"),
            (self.read_only, "--read-only"),
            (self.user_namespacing, "-U"),
        ];
        args.extend(flags.iter().filter(|(on, _)| *on).map(|(_, f)| (*f).to_string()));

        if !self.console.is_empty() {
            args.push(format!("--console={}", self.console));
        }
        push_option(&mut args, "--machine", &self.machine_name);
        push_option(&mut args, "--pivot-root", &self.pivot_root);
        push_option(&mut args, "--resolv-conf", &self.resolv_conf);
        push_option(&mut args, "--user", &self.user);
        if !self.volatile.is_empty() {
            args.push(format!("--volatile={}", self.volatile));
        }
        push_option(&mut args, "--chdir", &self.working_directory);
        push_option(&mut args, "--network-namespace-path", &self.network_namespace_path);

        for (k, v) in &self.bind {
            args.extend(["--bind".to_string(), format!("{k}:{v}")]);
        }
        for (k, v) in &self.bind_read_only {
            args.extend(["--bind-ro".to_string(), format!("{k}:{v}")]);
        }
        for (k, v) in &self.environment {
            args.extend(["-E".to_string(), format!("{k}={v}")]);
        }
        for (k, v) in &self.properties {
            args.push(format!("--property={k}={v}"));
        }

        args.extend(self.command.iter().cloned());
        Ok(args)
    }
}

fn push_option(args: &mut Vec<String>, flag: &str, value: &str) {
    if !value.is_empty() {
        args.extend([flag.to_string(), value.to_string()]);
    }
}

fn one_of(field: &'static str, value: &str, allowed: &[&str], reason: &'static str) -> Result<()> {
    if value.is_empty() || allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, value, reason))
    }
}

fn invalid(field: &'static str, value: &str, reason: &'static str) -> NspawnError {
    NspawnError::Validation {
        field,
        value: value.to_string(),
        reason,
    }
}

fn no_image() -> NspawnError {
    NspawnError::Render {
        message: "no image configured".into(),
    }
}
