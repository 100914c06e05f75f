//! Tenant identity.
//!
//! Every registry, tracker, and catalog is partitioned by [`Tenant`]. A tenant
//! travels with each HTTP request (as headers) and with each bus message (inside
//! the envelope), and no operation ever touches more than one tenant.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header carrying the tenant id.
pub const TENANT_ID_HEADER: &str = "TENANT_ID";
/// Header carrying the tenant region.
pub const REGION_HEADER: &str = "REGION";
/// Header carrying the client major version.
pub const MAJOR_VERSION_HEADER: &str = "MAJOR_VERSION";
/// Header carrying the client minor version.
pub const MINOR_VERSION_HEADER: &str = "MINOR_VERSION";

/// Opaque tenant identity.
///
/// Two tenants are equal only if every field matches, so the same id served
/// under two client versions is partitioned separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant id
    pub id: Uuid,
    /// Region code (e.g. `GMS`)
    pub region: String,
    /// Client major version
    pub major_version: u16,
    /// Client minor version
    pub minor_version: u16,
}

impl Tenant {
    /// Create a tenant.
    #[must_use]
    pub fn new(id: Uuid, region: impl Into<String>, major_version: u16, minor_version: u16) -> Self {
        Self {
            id,
            region: region.into(),
            major_version,
            minor_version,
        }
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} v{}.{}]",
            self.id, self.region, self.major_version, self.minor_version
        )
    }
}
