//! One-shot pass assigning a stable `vault_uuid` to every managed note that
//! lacks one (§4.6). Runs before the vault index is built, so the index
//! always sees a UUID on every managed file.

use uuid::Uuid;

use crate::error::Error;
use crate::frontmatter::keys;
use crate::vault::{process_frontmatter, VaultFileSystem};

/// Generates a fresh UUID v4. `uuid`'s v4 generator draws from the OS CSPRNG
/// and is infallible on every platform this crate targets, so the
/// time-and-randomness fallback from §4.6 ([`fallback_uuid`]) is kept
/// available but never reached by this function.
fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// The §4.6 fallback for a platform lacking a UUID generator: wall-clock
/// nanoseconds mixed with a process-local counter. Weaker uniqueness
/// guarantees than v4, but a write is never skipped for want of an
/// identifier.
#[allow(dead_code)]
fn fallback_uuid() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("fallback-{nanos:016x}-{seq:08x}")
}

/// Runs the backfill pass over every managed file. Never overwrites an
/// existing `vault_uuid` (I2).
pub async fn backfill_vault_uuids(vault: &dyn VaultFileSystem) -> Result<usize, Error> {
    let mut backfilled = 0;
    for path in vault.list_managed_files().await? {
        let has_uuid = vault
            .read_frontmatter_cached(&path)
            .await?
            .map(|fm| fm.get_string(&keys::VAULT_UUID).is_some())
            .unwrap_or(false);
        if has_uuid {
            continue;
        }

        process_frontmatter(vault, &path, |fm| {
            if fm.get_string(&keys::VAULT_UUID).is_none() {
                fm.set_string(&keys::VAULT_UUID, &generate_uuid());
            }
            Ok(())
        })
        .await?;
        backfilled += 1;
    }
    Ok(backfilled)
}
