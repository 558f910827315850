use wl_core::OwnerId;

use crate::bootstrap::AppRuntime;

/// Delete the remote session persisted for `owner` by an earlier run.
pub async fn run_unpair(runtime: &AppRuntime, owner: OwnerId) -> anyhow::Result<()> {
    if runtime.registry.cleanup_stale(&owner).await? {
        println!("Removed pairing session for {owner}");
    } else {
        println!("No pairing session recorded for {owner}");
    }
    Ok(())
}
