//! Backup log trimming.

use tracing::{debug, info};

use crate::store::BackupLogStore;

/// Number of log entries kept by default.
pub const DEFAULT_MAX_ENTRIES: u32 = 100;

/// Keep the `keep` most recently created entries and delete the rest.
///
/// Deletes by exclusion of the newest `keep`, so entries inserted while this
/// runs are never removed. Running twice deletes nothing the second time.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub async fn enforce(logs: &dyn BackupLogStore, keep: u32) -> anyhow::Result<u64> {
    let deleted = logs.delete_excluding_top_n(keep).await?;
    if deleted > 0 {
        info!(deleted, keep, "trimmed backup logs");
    } else {
        debug!(keep, "backup logs within retention");
    }
    Ok(deleted)
}
