//! Account lifecycle: registration, email verification, login, token refresh
//! and role promotion.

use std::sync::Arc;

use crate::auth::account::{
    Account, AccountStatus, AccountSummary, NewAccount, Role, is_well_formed_email,
    normalize_email,
};
use crate::auth::config::RegistrationPolicy;
use crate::auth::jwt::{AccountClaims, SignedToken, TokenKind, TokenService};
use crate::auth::mailer::Mailer;
use crate::auth::otp::OtpRegistry;
use crate::auth::passwords::PasswordService;
use crate::auth::responses::{RegisterRequest, TokenPair};
use crate::auth::store::CredentialStore;
use crate::auth::{AuthError, AuthResult};

const OTP_SUBJECT: &str = "Your verification code";

pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn Mailer>,
    passwords: Arc<PasswordService>,
    tokens: Arc<TokenService>,
    otp: Arc<OtpRegistry>,
    policy: RegistrationPolicy,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        passwords: Arc<PasswordService>,
        tokens: Arc<TokenService>,
        otp: Arc<OtpRegistry>,
        policy: RegistrationPolicy,
    ) -> Self {
        Self {
            store,
            mailer,
            passwords,
            tokens,
            otp,
            policy,
        }
    }

    /// Create a pending account with the requested role and mail it a code.
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<String> {
        self.register_as(request, None).await
    }

    /// Same as [`AccountService::register`] with the role pinned to `ADMIN`.
    pub async fn register_admin(&self, request: RegisterRequest) -> AuthResult<String> {
        self.register_as(request, Some(Role::Admin)).await
    }

    async fn register_as(
        &self,
        request: RegisterRequest,
        forced_role: Option<Role>,
    ) -> AuthResult<String> {
        let email = normalize_email(&request.email);
        validate_registration(&request, &email)?;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let role = match forced_role {
            Some(role) => role,
            None => {
                let role = request
                    .role
                    .parse::<Role>()
                    .map_err(|_| AuthError::InvalidRole)?;
                if !self.policy.permits_role(role) {
                    return Err(AuthError::RoleNotSelfAssignable);
                }
                role
            }
        };

        if self.store.find_region(request.region_id).await?.is_none() {
            return Err(AuthError::RegionNotFound);
        }

        if !self.policy.permits_domain(&email) {
            return Err(AuthError::InvalidEmailDomain);
        }

        let password_hash = self.passwords.hash(&request.password)?;

        let account = self
            .store
            .create(NewAccount {
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                email,
                password_hash,
                role,
                status: AccountStatus::Pending,
                region_id: request.region_id,
                birth_year: request.year,
                picture: request.picture.trim().to_string(),
            })
            .await?;

        log::info!(
            "account {} registered with role {}, pending verification",
            account.id,
            account.role
        );

        self.send_code(&account).await?;

        Ok(format!(
            "A verification code was sent to {}, welcome {}",
            account.email, account.first_name
        ))
    }

    /// Consume the emailed code and activate the account.
    pub async fn verify(&self, email: &str, code: &str) -> AuthResult<AccountStatus> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        self.otp.verify(&account.email, code.trim())?;

        self.store
            .update_status(&account.email, AccountStatus::Active)
            .await?;
        log::info!("account {} verified", account.id);

        Ok(AccountStatus::Active)
    }

    /// Issue a fresh code for an account still waiting on verification.
    pub async fn resend_code(&self, email: &str) -> AuthResult<()> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if account.is_active() {
            return Err(AuthError::AccountAlreadyActive);
        }

        self.send_code(&account).await
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthResult<TokenPair> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !account.is_active() {
            return Err(AuthError::AccountNotActive);
        }

        self.passwords.verify(password, &account.password_hash)?;

        let claims = AccountClaims::from(&account);
        let access = self.tokens.issue(TokenKind::Access, &claims)?;
        let refresh = self.tokens.issue(TokenKind::Refresh, &claims)?;

        log::info!("account {} logged in", account.id);

        Ok(TokenPair {
            access_token: access.token,
            access_token_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_token_expires_at: refresh.expires_at,
        })
    }

    /// Mint a new access token from a refresh token. The store is not
    /// consulted, so claims stay as they were when the refresh token was issued.
    pub fn refresh(&self, refresh_token: &str) -> AuthResult<SignedToken> {
        let verified = self
            .tokens
            .verify_kind(refresh_token.trim(), TokenKind::Refresh)?;
        self.tokens.issue(TokenKind::Access, &verified.claims)
    }

    /// Raise an account to `ADMIN`. Accounts already at or above it are
    /// returned unchanged.
    pub async fn promote_to_admin(&self, account_id: i64) -> AuthResult<AccountSummary> {
        let account = self
            .store
            .find_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if account.role >= Role::Admin {
            return Ok(account.summary());
        }

        let promoted = self.store.update_role(account.id, Role::Admin).await?;
        log::info!("account {} promoted to {}", promoted.id, promoted.role);
        Ok(promoted.summary())
    }

    pub async fn list_accounts(&self) -> AuthResult<Vec<AccountSummary>> {
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(Account::summary)
            .collect())
    }

    async fn send_code(&self, account: &Account) -> AuthResult<()> {
        let code = self.otp.issue(&account.email);
        let minutes = self.otp.ttl().num_minutes();
        let body = format!(
            "Hello {},\n\nYour verification code is {}. It expires in {} minutes.\n",
            account.first_name, code, minutes
        );

        self.mailer
            .send(&account.email, OTP_SUBJECT, &body)
            .await
            .inspect_err(|err| {
                log::warn!("verification mail for account {} failed: {}", account.id, err)
            })
    }
}

fn validate_registration(request: &RegisterRequest, email: &str) -> AuthResult<()> {
    if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
        return Err(AuthError::InvalidInput("first and last name are required".into()));
    }
    if request.password.is_empty() {
        return Err(AuthError::InvalidInput("password is required".into()));
    }
    if !is_well_formed_email(email) {
        return Err(AuthError::InvalidInput("email address is malformed".into()));
    }
    Ok(())
}
