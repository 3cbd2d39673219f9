use async_trait::async_trait;
use uuid::Uuid;

/// Out-of-band delivery of one-time account tokens.
#[async_trait]
pub trait AccountNotifier: Send + Sync {
    async fn send_verification(&self, user_id: Uuid, email: &str, token: &str)
        -> Result<(), anyhow::Error>;

    async fn send_password_reset(&self, user_id: Uuid, email: &str, token: &str)
        -> Result<(), anyhow::Error>;
}

/// Records that a message would have been sent. Never logs the token.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl AccountNotifier for LogNotifier {
    async fn send_verification(
        &self,
        user_id: Uuid,
        _email: &str,
        _token: &str,
    ) -> Result<(), anyhow::Error> {
        tracing::info!(user_id = %user_id, "Verification message queued");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        user_id: Uuid,
        _email: &str,
        _token: &str,
    ) -> Result<(), anyhow::Error> {
        tracing::info!(user_id = %user_id, "Password reset message queued");
        Ok(())
    }
}
