//! Dependency resolution inside the triggering transaction.
//!
//! - `cascade_failure`: fail a record and everything downstream of it
//! - `unblock_ready`: release dependents whose prerequisites all succeeded
//!
//! Both walk the graph through the open transaction, so the walk commits or
//! rolls back together with the transition that triggered it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::domain::{StoreError, WorkId, WorkState};
use crate::ports::StoreTransaction;

/// Mark `id` and every transitive dependent FAILED, except records that are
/// already CANCELLED. Returns the ids that were set to FAILED.
///
/// Iterative walk with a visited set; an acyclic graph is assumed but a cycle
/// would still terminate.
pub async fn cascade_failure(
    tx: &mut dyn StoreTransaction,
    id: WorkId,
) -> Result<Vec<WorkId>, StoreError> {
    let mut failed = Vec::new();
    let mut visited: HashSet<WorkId> = HashSet::new();
    let mut stack = vec![id];

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        match tx.get_state(current).await? {
            Some(WorkState::Cancelled) | None => {}
            Some(_) => {
                tx.set_state(WorkState::Failed, current).await?;
                failed.push(current);
            }
        }
        // dependents of a cancelled record are still failed
        stack.extend(tx.dependent_ids(current).await?);
    }
    Ok(failed)
}

/// Move every BLOCKED direct dependent of `id` whose prerequisites have all
/// SUCCEEDED to ENQUEUED with a period start of `now`. Returns the ids that
/// were unblocked.
pub async fn unblock_ready(
    tx: &mut dyn StoreTransaction,
    id: WorkId,
    now: DateTime<Utc>,
) -> Result<Vec<WorkId>, StoreError> {
    let mut unblocked = Vec::new();
    for dependent in tx.dependent_ids(id).await? {
        if tx.get_state(dependent).await? != Some(WorkState::Blocked) {
            continue;
        }
        if tx.has_completed_all_prerequisites(dependent).await? {
            tx.set_state(WorkState::Enqueued, dependent).await?;
            tx.set_period_start_time(dependent, now).await?;
            unblocked.push(dependent);
        }
    }
    Ok(unblocked)
}
