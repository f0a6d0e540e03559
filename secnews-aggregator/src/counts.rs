use crate::store::{NewsStore, RecordFilter};
use crate::types::{Category, StoreError, StoreResult};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub const ALL_KEY: &str = "all";

/// Published-record tallies for `all` and each category
pub struct CountAggregator {
    store: Arc<dyn NewsStore>,
}

impl CountAggregator {
    pub fn new(store: Arc<dyn NewsStore>) -> Self {
        Self { store }
    }

    /// Never fails; a store error yields all zeroes.
    pub async fn counts(&self) -> BTreeMap<String, u64> {
        match self.try_counts().await {
            Ok(counts) => counts,
            Err(e) => {
                warn!("Count query failed, returning zeroes: {}", e);
                Self::zeroed()
            }
        }
    }

    pub async fn try_counts(&self) -> StoreResult<BTreeMap<String, u64>> {
        let published = RecordFilter::published();
        let all = self.store.count(&published);
        let per_category = try_join_all(Category::ALL.iter().map(|category| async move {
            let n = self
                .store
                .count(&RecordFilter::published().with_category(Some(*category)))
                .await?;
            Ok::<_, StoreError>((category.as_str().to_string(), n))
        }));

        let (all, per_category) = futures::try_join!(all, per_category)?;

        let mut counts: BTreeMap<String, u64> = per_category.into_iter().collect();
        counts.insert(ALL_KEY.to_string(), all);
        Ok(counts)
    }

    pub fn zeroed() -> BTreeMap<String, u64> {
        std::iter::once(ALL_KEY)
            .chain(Category::ALL.iter().map(|c| c.as_str()))
            .map(|key| (key.to_string(), 0))
            .collect()
    }
}
