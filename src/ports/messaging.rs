#[mockall::automock]
#[async_trait::async_trait]
pub trait MessagingPort {
    /// Send a text reply to a customer
    async fn send(&self, to: &str, text: &str) -> Result<(), Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("message to {to} rejected: {reason}")]
    Rejected { to: String, reason: String },

    /// Concrete adapter errors
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
