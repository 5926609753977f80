use parking_lot::Mutex;

use crate::auth::{AuthError, AuthResult};

/// Outbound email delivery used to hand verification codes to users.
#[rocket::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AuthResult<()>;
}

/// Records deliveries in the log instead of handing them to a relay. The
/// body carries the verification code, so only its size is logged.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl LogMailer {
    fn delivery_line(to: &str, subject: &str, body: &str) -> String {
        format!("mail to {} queued: {} ({} bytes)", to, subject, body.len())
    }
}

#[rocket::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AuthResult<()> {
        log::info!("{}", Self::delivery_line(to, subject, body));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every delivery in memory; can be switched to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: Mutex<bool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent.lock().iter().rev().find(|mail| mail.to == to).cloned()
    }
}

#[rocket::async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AuthResult<()> {
        if *self.failing.lock() {
            return Err(AuthError::Mail(format!("relay refused message to {to}")));
        }
        self.sent.lock().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_line_never_contains_the_body() {
        let body = "Your verification code is 482913. It expires in 20 minutes.";
        let line = LogMailer::delivery_line("a@x.com", "Your verification code", body);

        assert!(line.contains("a@x.com"));
        assert!(!line.contains("482913"));
        assert!(!line.contains(body));
    }

    #[tokio::test]
    async fn memory_mailer_records_and_fails_on_demand() {
        let mailer = MemoryMailer::new();
        mailer.send("a@x.com", "hi", "one").await.expect("send");

        mailer.set_failing(true);
        assert!(matches!(
            mailer.send("a@x.com", "hi", "two").await,
            Err(AuthError::Mail(_))
        ));

        assert_eq!(mailer.sent().len(), 1);
        assert_eq!(mailer.last_to("a@x.com").map(|m| m.body), Some("one".to_string()));
    }
}
