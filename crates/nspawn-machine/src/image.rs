//! Image reference resolution.
//!
//! An image is either a path (absolute, or relative to the working
//! directory) or the name of an image registered with the machine manager.

use std::path::{Path, PathBuf};

use nspawn_common::error::{NspawnError, Result};

use crate::bus::MachineBus;
use crate::descriptor::ImageDescriptor;

/// Resolves an image reference against the current working directory.
///
/// # Errors
///
/// Returns an error if the working directory is unavailable, or
/// [`NspawnError::NotFound`] if the image is neither on disk nor known to
/// the machine manager.
pub async fn resolve_image(image: &str, bus: &dyn MachineBus) -> Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| NspawnError::Io {
        path: PathBuf::from("."),
        source: e,
    })?;
    resolve_image_in(&cwd, image, bus).await
}

/// Resolves an image reference, joining relative paths onto `base`.
///
/// The filesystem is probed first; on a miss the original reference is
/// looked up by name on the bus and the reported path is returned.
///
/// # Errors
///
/// Returns [`NspawnError::NotFound`] if both lookups miss, or a decode
/// error if the bus answers with a malformed image descriptor.
pub async fn resolve_image_in(base: &Path, image: &str, bus: &dyn MachineBus) -> Result<PathBuf> {
    let candidate = if Path::new(image).is_absolute() {
        PathBuf::from(image)
    } else {
        base.join(image)
    };
    if candidate.exists() {
        tracing::debug!(image, path = %candidate.display(), "resolved image on disk");
        return Ok(candidate);
    }

    let bag = match bus.describe_image(image).await {
        Ok(bag) => bag,
        Err(e) => {
            tracing::debug!(image, error = %e, "image lookup failed");
            return Err(NspawnError::NotFound {
                kind: "image",
                id: image.to_string(),
            });
        }
    };
    let descriptor = ImageDescriptor::decode(&bag)?;
    tracing::info!(image, path = %descriptor.path, "resolved registered image");
    Ok(PathBuf::from(descriptor.path))
}
