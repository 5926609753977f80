use std::env;

use crate::auth::account::Role;
use crate::auth::{AuthError, AuthResult};

const MIN_SECRET_LEN: usize = 32;

fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub otp_ttl_secs: i64,
    pub otp_digits: u32,
    pub otp_max_attempts: u32,
    pub otp_sweep_interval_secs: i64,
    pub allowed_email_domains: Vec<String>,
    /// Roles a caller may pick on the public sign-up route.
    pub self_register_roles: Vec<Role>,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = env::var("MARKETPLACE_JWT_SECRET")
            .map_err(|_| AuthError::Config("MARKETPLACE_JWT_SECRET is required".into()))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "MARKETPLACE_JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        Ok(Self {
            issuer: env_string("MARKETPLACE_JWT_ISSUER", "http://localhost"),
            audience: env_string("MARKETPLACE_JWT_AUDIENCE", "marketplace-api"),
            jwt_secret,
            access_token_ttl_secs: env_i64("MARKETPLACE_ACCESS_TOKEN_TTL_SECS", 60 * 60),
            refresh_token_ttl_secs: env_i64(
                "MARKETPLACE_REFRESH_TOKEN_TTL_SECS",
                7 * 24 * 60 * 60,
            ),
            otp_ttl_secs: env_i64("MARKETPLACE_OTP_TTL_SECS", 1200),
            otp_digits: env_u32("MARKETPLACE_OTP_DIGITS", 6).min(9),
            otp_max_attempts: env_u32("MARKETPLACE_OTP_MAX_ATTEMPTS", 5),
            otp_sweep_interval_secs: env_i64("MARKETPLACE_OTP_SWEEP_INTERVAL_SECS", 300),
            allowed_email_domains: parse_domain_list(
                &env::var("MARKETPLACE_ALLOWED_EMAIL_DOMAINS").unwrap_or_default(),
            ),
            self_register_roles: parse_role_list(
                &env::var("MARKETPLACE_SELF_REGISTER_ROLES").unwrap_or_default(),
            )?,
        })
    }

    pub fn registration_policy(&self) -> RegistrationPolicy {
        RegistrationPolicy {
            domains: EmailDomainPolicy::new(self.allowed_email_domains.clone()),
            roles: self.self_register_roles.clone(),
        }
    }
}

/// Unset or blank means every role.
fn parse_role_list(raw: &str) -> AuthResult<Vec<Role>> {
    let mut roles = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let role = name.to_uppercase().parse::<Role>().map_err(|_| {
            AuthError::Config(format!(
                "MARKETPLACE_SELF_REGISTER_ROLES contains unknown role '{name}'"
            ))
        })?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    if roles.is_empty() {
        Ok(Role::ALL.to_vec())
    } else {
        Ok(roles)
    }
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|domain| domain.trim().trim_start_matches('@').to_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// Registration policy restricting which email domains may sign up.
/// An empty allow-list accepts every domain.
#[derive(Debug, Clone, Default)]
pub struct EmailDomainPolicy {
    allowed: Vec<String>,
}

impl EmailDomainPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self {
            allowed: allowed.into_iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    pub fn permits(&self, email: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match email.rsplit_once('@') {
            Some((_, domain)) => {
                let domain = domain.to_lowercase();
                self.allowed.iter().any(|allowed| *allowed == domain)
            }
            None => false,
        }
    }
}

/// Everything the public sign-up route checks beyond input shape.
#[derive(Debug, Clone)]
pub struct RegistrationPolicy {
    pub domains: EmailDomainPolicy,
    pub roles: Vec<Role>,
}

impl RegistrationPolicy {
    pub fn permits_domain(&self, email: &str) -> bool {
        self.domains.permits(email)
    }

    pub fn permits_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            domains: EmailDomainPolicy::default(),
            roles: Role::ALL.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_domains() {
        assert_eq!(
            parse_domain_list(" gmail.com, @Example.org ,,"),
            vec!["gmail.com".to_string(), "example.org".to_string()]
        );
        assert!(parse_domain_list("").is_empty());
    }

    #[test]
    fn empty_policy_accepts_any_domain() {
        let policy = EmailDomainPolicy::default();
        assert!(policy.permits("a@x.com"));
        assert!(policy.permits("b@anything.io"));
    }

    #[test]
    fn restricted_policy_matches_exact_domain() {
        let policy = EmailDomainPolicy::new(vec!["gmail.com".into()]);
        assert!(policy.permits("alex@gmail.com"));
        assert!(policy.permits("alex@GMAIL.com"));
        assert!(!policy.permits("alex@mail.gmail.com.evil"));
        assert!(!policy.permits("alex@x.com"));
        assert!(!policy.permits("no-at-sign"));
    }

    #[test]
    fn self_register_roles_default_to_every_role() {
        assert_eq!(parse_role_list("").expect("parse"), Role::ALL.to_vec());
        assert_eq!(parse_role_list(" , ").expect("parse"), Role::ALL.to_vec());
        assert!(RegistrationPolicy::default().permits_role(Role::SuperAdmin));
    }

    #[test]
    fn self_register_roles_parse_and_reject_unknown_names() {
        assert_eq!(
            parse_role_list("user, USER,admin").expect("parse"),
            vec![Role::User, Role::Admin]
        );
        assert!(matches!(
            parse_role_list("USER,ROOT"),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn restricted_role_set_refuses_privileged_roles() {
        let policy = RegistrationPolicy {
            domains: EmailDomainPolicy::default(),
            roles: vec![Role::User],
        };
        assert!(policy.permits_role(Role::User));
        assert!(!policy.permits_role(Role::Admin));
        assert!(!policy.permits_role(Role::SuperAdmin));
    }
}
