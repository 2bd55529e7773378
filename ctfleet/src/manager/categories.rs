use std::collections::BTreeSet;

use tracing::debug;

use crate::core::config::ManagerConfig;
use crate::error::FleetResult;
use crate::types::api::CategoriesResponse;
use crate::types::log::{CategoryWeight, CtLog};

pub struct CategoryService;

impl CategoryService {
    pub async fn categories(config: &ManagerConfig, worker_name: Option<&str>) -> FleetResult<CategoriesResponse> {
        let database = config.database();
        let weights = database.list_categories().await?;
        let logs = database.list_logs().await?;
        let response = build_categories(&weights, &logs);
        debug!(worker = worker_name.unwrap_or("-"), ordered = response.ordered_categories.len(), "Categories listed");
        Ok(response)
    }
}

/// `ordered_categories` repeats each category once per unit of weight,
/// heaviest first. Categories without an unfinished log are left out.
pub(crate) fn build_categories(weights: &[CategoryWeight], logs: &[CtLog]) -> CategoriesResponse {
    let all: BTreeSet<&str> =
        weights.iter().map(|c| c.name.as_str()).chain(logs.iter().map(|l| l.category.as_str())).collect();

    let mut active: Vec<&CategoryWeight> = weights
        .iter()
        .filter(|c| c.weight > 0)
        .filter(|c| logs.iter().any(|l| l.category == c.name && !l.fetch_completed))
        .collect();
    active.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.name.cmp(&b.name)));

    let ordered = active
        .into_iter()
        .flat_map(|c| std::iter::repeat(c.name.clone()).take(c.weight as usize))
        .collect();

    CategoriesResponse { all_categories: all.into_iter().map(str::to_string).collect(), ordered_categories: ordered }
}
