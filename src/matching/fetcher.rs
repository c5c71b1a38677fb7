use std::collections::HashMap;

use crate::vacancies::{Vacancy, VacancyId, VacancyStore};

/// Fetches the records for `ids` with one store lookup and returns them in
/// the order of `ids`. Ids without a record are dropped; a repeated id is
/// returned once, at its first position.
pub fn fetch_in_order(
    store: &dyn VacancyStore,
    ids: &[VacancyId],
) -> anyhow::Result<Vec<Vacancy>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let mut by_idx: HashMap<VacancyId, Vacancy> = store
        .find_by_ids(ids)?
        .into_iter()
        .map(|v| (v.idx, v))
        .collect();

    let ordered: Vec<Vacancy> = ids.iter().filter_map(|id| by_idx.remove(id)).collect();

    if ordered.len() < ids.len() {
        log::debug!(
            "{} of {} candidate ids have no vacancy record",
            ids.len() - ordered.len(),
            ids.len()
        );
    }

    Ok(ordered)
}
