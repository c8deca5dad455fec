use crate::{
    domain::Reward,
    ports::catalog::{CatalogPort, Error},
};
use std::sync::Arc;

/// Reward catalog loaded once at startup
///
/// The catalog is managed outside this service and doesn't change while it runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalog {
    rewards: Arc<Vec<Reward>>,
}

impl MemoryCatalog {
    pub fn new(rewards: Vec<Reward>) -> Self {
        Self {
            rewards: Arc::new(rewards),
        }
    }
}

#[async_trait::async_trait]
impl CatalogPort for MemoryCatalog {
    async fn list_rewards(&self) -> Result<Vec<Reward>, Error> {
        Ok(self.rewards.as_ref().clone())
    }

    async fn find_reward(&self, reward_id: &str) -> Result<Option<Reward>, Error> {
        Ok(self
            .rewards
            .iter()
            .find(|reward| reward.id.eq_ignore_ascii_case(reward_id.trim()))
            .cloned())
    }
}
