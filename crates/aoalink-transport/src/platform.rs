use std::fmt;

use crate::error::Result;
use crate::stream::AccessoryStream;

/// Opaque identifier for a currently attached accessory.
///
/// Obtained from [`AccessoryPlatform::list_accessories`]. Handles compare equal
/// when their ids match; the description is informational only.
#[derive(Clone)]
pub struct AccessoryHandle {
    id: String,
    description: Option<String>,
}

impl AccessoryHandle {
    /// Create a handle with the given platform id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    /// Attach a human-readable description (manufacturer, model, ...).
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Platform id of the accessory.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Optional description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for AccessoryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AccessoryHandle {}

impl std::hash::Hash for AccessoryHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AccessoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessoryHandle")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Display for AccessoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Platform accessory service: enumeration, permission, and open.
pub trait AccessoryPlatform: Send + Sync {
    /// Accessories currently attached, in platform order.
    fn list_accessories(&self) -> Vec<AccessoryHandle>;

    /// Whether access to `accessory` has already been granted.
    fn has_permission(&self, accessory: &AccessoryHandle) -> bool;

    /// Ask the platform to grant access.
    ///
    /// Returns `true` if a request was issued; the answer arrives later through
    /// the owner's permission-result hook. Platforms without an interactive grant
    /// return `false`.
    fn request_permission(&self, accessory: &AccessoryHandle) -> bool {
        let _ = accessory;
        false
    }

    /// Open the duplex descriptor for `accessory`.
    fn open(&self, accessory: &AccessoryHandle) -> Result<AccessoryStream>;

    /// Platform name for diagnostics.
    fn name(&self) -> &'static str;
}
