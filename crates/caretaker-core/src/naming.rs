//! Deterministic tenant naming.
//!
//! Every per-user resource name derives from a single opaque tenant key:
//! the `app__` prefix followed by the first 12 hex characters of
//! HMAC-SHA-256(namespace key, lowercased user id). The mapping is stable
//! across restarts for a fixed namespace key; rotating the key re-homes all
//! users to fresh tenants (an operational action, not a migration).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every tenant key.
pub const TENANT_PREFIX: &str = "app__";

/// Prefix of every tenant network name.
pub const NETWORK_PREFIX: &str = "net__";

/// Hex characters of the HMAC kept in the tenant key (48 bits).
const TENANT_HEX_LEN: usize = 12;

/// Derives opaque tenant keys from user identifiers.
#[derive(Clone)]
pub struct TenantNamer {
    namespace_key: String,
}

impl TenantNamer {
    #[must_use]
    pub fn new(namespace_key: impl Into<String>) -> Self {
        Self {
            namespace_key: namespace_key.into(),
        }
    }

    /// Compute the tenant key for a user identifier.
    ///
    /// Case-insensitive in the user id: `U-1` and `u-1` map to the same
    /// tenant.
    #[must_use]
    #[allow(clippy::missing_panics_doc)]
    pub fn tenant_key(&self, user_id: &str) -> String {
        #[allow(clippy::unwrap_used)]
        let mut mac = HmacSha256::new_from_slice(self.namespace_key.as_bytes())
            // SAFETY: HMAC-SHA-256 accepts any key length — this never fails.
            .unwrap();
        mac.update(user_id.to_lowercase().as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        format!("{TENANT_PREFIX}{}", &digest[..TENANT_HEX_LEN])
    }
}

impl std::fmt::Debug for TenantNamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantNamer")
            .field("namespace_key", &"[REDACTED]")
            .finish()
    }
}

/// Name of a tenant's dedicated bridge network.
#[must_use]
pub fn network_name(tenant: &str) -> String {
    format!("{NETWORK_PREFIX}{tenant}")
}

/// Name of a tenant's persistent user-files volume.
#[must_use]
pub fn files_volume(tenant: &str) -> String {
    format!("vol__{tenant}__files")
}

/// Name of a tenant's persistent conversation-history volume.
#[must_use]
pub fn history_volume(tenant: &str) -> String {
    format!("vol__{tenant}__history")
}
