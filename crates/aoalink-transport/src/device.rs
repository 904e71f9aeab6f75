use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::platform::{AccessoryHandle, AccessoryPlatform};
use crate::stream::AccessoryStream;

/// Accessory exposed as a character device by the USB gadget driver.
///
/// The Linux `f_accessory` function (used by Android) publishes the host
/// connection at `/dev/usb_accessory`. At most one accessory is ever listed.
pub struct DevicePlatform {
    path: PathBuf,
}

impl DevicePlatform {
    /// Default device node of the accessory gadget function.
    pub const DEFAULT_PATH: &'static str = "/dev/usb_accessory";

    /// Use the default device node.
    pub fn new() -> Self {
        Self::with_path(Self::DEFAULT_PATH)
    }

    /// Use an explicit device node.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The device node path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle(&self) -> AccessoryHandle {
        AccessoryHandle::new(self.path.display().to_string())
            .with_description("usb gadget accessory")
    }
}

impl Default for DevicePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessoryPlatform for DevicePlatform {
    fn list_accessories(&self) -> Vec<AccessoryHandle> {
        if self.path.exists() {
            vec![self.handle()]
        } else {
            debug!(path = ?self.path, "accessory device node not present");
            Vec::new()
        }
    }

    fn has_permission(&self, _accessory: &AccessoryHandle) -> bool {
        access_read_write(&self.path)
    }

    fn open(&self, accessory: &AccessoryHandle) -> Result<AccessoryStream> {
        if !self.path.exists() {
            return Err(TransportError::NoAccessory);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|source| TransportError::Open {
                accessory: accessory.id().to_string(),
                source,
            })?;

        debug!(path = ?self.path, "opened accessory device node");
        Ok(AccessoryStream::from_device(file))
    }

    fn name(&self) -> &'static str {
        "device-node"
    }
}

fn access_read_write(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };

    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::link::ByteLink;

    fn temp_node(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "aoalink-dev-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("usb_accessory")
    }

    #[test]
    fn missing_node_lists_nothing() {
        let platform = DevicePlatform::with_path("/nonexistent/aoalink/usb_accessory");
        assert!(platform.list_accessories().is_empty());

        let handle = AccessoryHandle::new("/nonexistent/aoalink/usb_accessory");
        assert!(matches!(
            platform.open(&handle),
            Err(TransportError::NoAccessory)
        ));
    }

    #[test]
    fn present_node_is_listed_and_opened() {
        let node = temp_node("present");
        std::fs::write(&node, [1u8, 2u8]).unwrap();

        let platform = DevicePlatform::with_path(&node);
        let accessories = platform.list_accessories();
        assert_eq!(accessories.len(), 1);
        assert!(platform.has_permission(&accessories[0]));

        let link = ByteLink::open(&platform, &accessories[0]).expect("node should open");
        assert_eq!(link.read_byte().unwrap(), 1);
        assert_eq!(link.read_byte().unwrap(), 2);
        // Regular files report EOF once drained.
        assert!(matches!(link.read_byte(), Err(TransportError::Closed)));

        if let Some(parent) = node.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn default_path_is_gadget_node() {
        assert_eq!(
            DevicePlatform::default().path(),
            Path::new("/dev/usb_accessory")
        );
    }
}
