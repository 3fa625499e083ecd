use crate::error::Result;
use crate::repositories::RollupRepository;
use crate::scheduler::{PollDecision, Scheduler};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Background poll decisions for every scheduled entity, using the last
/// successful poll times held by the store.
pub async fn evaluate_polls(
    repository: &dyn RollupRepository,
    scheduler: &Scheduler,
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, PollDecision>> {
    let entities: Vec<String> = scheduler.entities().map(str::to_string).collect();
    let last_polls = repository.fetch_last_polls(&entities).await?;
    Ok(scheduler.evaluate_all(&last_polls, now))
}
