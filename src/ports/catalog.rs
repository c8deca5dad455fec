use crate::domain::Reward;

#[mockall::automock]
#[async_trait::async_trait]
pub trait CatalogPort {
    async fn list_rewards(&self) -> Result<Vec<Reward>, Error>;

    /// Look up a reward by id, ignoring ASCII case
    async fn find_reward(&self, reward_id: &str) -> Result<Option<Reward>, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
