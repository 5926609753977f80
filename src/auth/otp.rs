//! One-time passcodes proving control of an email address.
//!
//! Entries live only in memory and are keyed by normalised email. Each email
//! has at most one live code; issuing again replaces it. Verification is an
//! atomic check-and-remove on the entry's shard, so two concurrent requests
//! for the same email cannot both consume one code.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;

use crate::auth::{AuthConfig, AuthError, AuthResult};

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: DateTime<Utc>,
    failed_attempts: u32,
}

pub struct OtpRegistry {
    entries: DashMap<String, OtpEntry>,
    ttl: Duration,
    digits: u32,
    max_attempts: u32,
}

impl OtpRegistry {
    pub fn new(ttl: Duration, digits: u32, max_attempts: u32) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            digits: digits.clamp(4, 9),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            Duration::seconds(config.otp_ttl_secs),
            config.otp_digits,
            config.otp_max_attempts,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh code for `email`, replacing any pending one.
    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, Utc::now())
    }

    pub fn issue_at(&self, email: &str, now: DateTime<Utc>) -> String {
        let code = self.generate_code();
        self.entries.insert(
            email.to_string(),
            OtpEntry {
                code: code.clone(),
                expires_at: now + self.ttl,
                failed_attempts: 0,
            },
        );
        code
    }

    pub fn verify(&self, email: &str, supplied: &str) -> AuthResult<()> {
        self.verify_at(email, supplied, Utc::now())
    }

    pub fn verify_at(&self, email: &str, supplied: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let mut entry = match self.entries.entry(email.to_string()) {
            Entry::Occupied(entry) => entry,
            Entry::Vacant(_) => return Err(AuthError::OtpNotFound),
        };

        if now >= entry.get().expires_at {
            entry.remove();
            return Err(AuthError::OtpExpired);
        }

        if !constant_time_eq(entry.get().code.as_bytes(), supplied.as_bytes()) {
            let pending = entry.get_mut();
            pending.failed_attempts += 1;
            if pending.failed_attempts >= self.max_attempts {
                entry.remove();
            }
            return Err(AuthError::OtpMismatch);
        }

        entry.remove();
        Ok(())
    }

    /// Drop every entry whose window has closed. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn generate_code(&self) -> String {
        let upper = 10u32.pow(self.digits);
        let value = rand::thread_rng().gen_range(0..upper);
        format!("{:0width$}", value, width = self.digits as usize)
    }
}

/// Periodically evict expired codes. Runs until the task is dropped.
pub async fn run_sweeper(registry: Arc<OtpRegistry>, every: std::time::Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let removed = registry.purge_expired(Utc::now());
        if removed > 0 {
            log::debug!("otp sweeper evicted {} expired entries", removed);
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OtpRegistry {
        OtpRegistry::new(Duration::seconds(1200), 6, 5)
    }

    #[test]
    fn codes_are_numeric_and_fixed_width() {
        let registry = registry();
        for i in 0..50 {
            let code = registry.issue(&format!("user{i}@x.com"));
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn code_verifies_exactly_once() {
        let registry = registry();
        let code = registry.issue("a@x.com");

        assert!(registry.verify("a@x.com", &code).is_ok());
        assert!(matches!(
            registry.verify("a@x.com", &code),
            Err(AuthError::OtpNotFound)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_email_has_no_entry() {
        let registry = registry();
        assert!(matches!(
            registry.verify("ghost@x.com", "123456"),
            Err(AuthError::OtpNotFound)
        ));
    }

    #[test]
    fn correct_code_after_window_is_expired() {
        let registry = registry();
        let issued = Utc::now();
        let code = registry.issue_at("a@x.com", issued);

        let after = issued + Duration::seconds(1200);
        assert!(matches!(
            registry.verify_at("a@x.com", &code, after),
            Err(AuthError::OtpExpired)
        ));
        assert!(matches!(
            registry.verify_at("a@x.com", &code, after),
            Err(AuthError::OtpNotFound)
        ));
    }

    #[test]
    fn code_inside_window_verifies() {
        let registry = registry();
        let issued = Utc::now();
        let code = registry.issue_at("a@x.com", issued);

        let just_before = issued + Duration::seconds(1199);
        assert!(registry.verify_at("a@x.com", &code, just_before).is_ok());
    }

    #[test]
    fn mismatch_keeps_entry_until_attempts_run_out() {
        let registry = OtpRegistry::new(Duration::seconds(1200), 6, 3);
        let code = registry.issue("a@x.com");
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(matches!(
            registry.verify("a@x.com", wrong),
            Err(AuthError::OtpMismatch)
        ));
        assert!(matches!(
            registry.verify("a@x.com", wrong),
            Err(AuthError::OtpMismatch)
        ));
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.verify("a@x.com", wrong),
            Err(AuthError::OtpMismatch)
        ));
        assert!(matches!(
            registry.verify("a@x.com", &code),
            Err(AuthError::OtpNotFound)
        ));
    }

    #[test]
    fn reissue_replaces_previous_code() {
        let registry = registry();
        let issued = Utc::now();
        let first = registry.issue_at("a@x.com", issued);
        let mut second = registry.issue_at("a@x.com", issued);
        while second == first {
            second = registry.issue_at("a@x.com", issued);
        }

        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.verify_at("a@x.com", &first, issued),
            Err(AuthError::OtpMismatch)
        ));
        assert!(registry.verify_at("a@x.com", &second, issued).is_ok());
    }

    #[test]
    fn reissue_starts_a_fresh_attempt_budget() {
        let registry = registry();
        let first = registry.issue("a@x.com");
        let wrong = |code: &str| if code == "000000" { "111111" } else { "000000" };

        for _ in 0..4 {
            assert!(matches!(
                registry.verify("a@x.com", wrong(&first)),
                Err(AuthError::OtpMismatch)
            ));
        }

        let second = registry.issue("a@x.com");
        for _ in 0..4 {
            assert!(matches!(
                registry.verify("a@x.com", wrong(&second)),
                Err(AuthError::OtpMismatch)
            ));
        }
        assert!(registry.verify("a@x.com", &second).is_ok());
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let registry = registry();
        let now = Utc::now();
        registry.issue_at("old@x.com", now - Duration::seconds(1300));
        registry.issue_at("fresh@x.com", now);

        assert_eq!(registry.purge_expired(now), 1);
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.verify_at("old@x.com", "000000", now),
            Err(AuthError::OtpNotFound)
        ));
    }

    #[test]
    fn concurrent_verifications_consume_once() {
        let registry = Arc::new(registry());
        let code = registry.issue("race@x.com");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let code = code.clone();
                std::thread::spawn(move || registry.verify("race@x.com", &code).is_ok())
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
