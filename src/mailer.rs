// mailer.rs
// Outgoing email seam. The shipped mailer only logs; transports plug in behind the trait.

use anyhow::Result;
use futures::future::BoxFuture;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, Result<()>>;
}

/// Writes every message to the log instead of delivering it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            if email.to.trim().is_empty() {
                anyhow::bail!("recipient address is empty");
            }
            info!(
                to = %email.to,
                subject = %email.subject,
                bytes = email.html.len(),
                "email dispatched"
            );
            Ok(())
        })
    }
}
