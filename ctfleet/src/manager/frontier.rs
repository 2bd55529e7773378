use std::collections::HashSet;

use tracing::debug;

use crate::core::config::ManagerConfig;
use crate::error::FleetResult;

/// Per-(category, log) watermark of contiguously completed batches.
pub struct ProgressFrontier;

impl ProgressFrontier {
    /// Cached watermark. A stale value is fine: it only ever understates progress.
    pub async fn min_completed_end(config: &ManagerConfig, category: &str, log_name: &str) -> FleetResult<Option<u64>> {
        let key = (category.to_string(), log_name.to_string());
        if let Some(cached) = config.frontier_cache().get(&key)? {
            return Ok(cached);
        }
        let value = Self::recompute(config, category, log_name).await?;
        config.frontier_cache().insert(key, value)?;
        Ok(value)
    }

    /// Steps the stored watermark forward over completed batch boundaries and persists it.
    pub async fn recompute(config: &ManagerConfig, category: &str, log_name: &str) -> FleetResult<Option<u64>> {
        let database = config.database();
        let stored = database.get_frontier(category, log_name).await?;
        let completed = database.completed_ends(log_name, stored).await?;
        let advanced = advance_watermark(stored, config.scheduler().batch_size, &completed);

        if let Some(end) = advanced.filter(|end| Some(*end) != stored) {
            debug!(category, log_name, from = ?stored, to = end, "Frontier advanced");
            database.set_frontier(category, log_name, end).await?;
        }
        Ok(advanced)
    }

    pub fn invalidate(config: &ManagerConfig, category: &str, log_name: &str) -> FleetResult<()> {
        config.frontier_cache().invalidate(&(category.to_string(), log_name.to_string()))?;
        Ok(())
    }

    /// True once every index below `tree_size` is covered by completed batches.
    pub async fn is_exhausted(config: &ManagerConfig, category: &str, log_name: &str, tree_size: u64) -> FleetResult<bool> {
        if tree_size == 0 {
            return Ok(false);
        }
        let last = tree_size - 1;
        let watermark = Self::recompute(config, category, log_name).await?;
        if watermark.is_some_and(|w| w >= last) {
            return Ok(true);
        }
        let next = next_boundary(watermark, config.scheduler().batch_size);
        if next < last {
            return Ok(false);
        }
        // Only the short tail batch, keyed by `last`, can be left.
        let completed = config.database().completed_ends(log_name, watermark).await?;
        Ok(completed.contains(&last))
    }
}

/// First batch boundary after `watermark`.
pub(crate) fn next_boundary(watermark: Option<u64>, batch_size: u64) -> u64 {
    match watermark {
        Some(w) => w + batch_size,
        None => batch_size - 1,
    }
}

/// Moves `watermark` forward while the next aligned boundary is in `completed`.
pub(crate) fn advance_watermark(watermark: Option<u64>, batch_size: u64, completed: &HashSet<u64>) -> Option<u64> {
    let mut watermark = watermark;
    loop {
        let next = next_boundary(watermark, batch_size);
        if !completed.contains(&next) {
            return watermark;
        }
        watermark = Some(next);
    }
}
