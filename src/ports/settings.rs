use crate::domain::{Settings, SettingsError};

#[mockall::automock]
#[async_trait::async_trait]
pub trait SettingsPort {
    /// Fetch and validate today's settings
    async fn fetch(&self) -> Result<Settings, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Invalid(#[from] SettingsError),

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
