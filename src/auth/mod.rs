//! Authentication module: account flows, one-time codes, token minting,
//! Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

pub mod account;
pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod mailer;
pub mod otp;
pub mod passwords;
pub mod pg_store;
pub mod responses;
pub mod roles;
pub mod routes;
pub mod service;
pub mod store;

pub use account::{Account, AccountStatus, AccountSummary, Role};
pub use config::{AuthConfig, RegistrationPolicy};
pub use error::{AuthError, AuthResult};
pub use guards::{Caller, RequestContext};
pub use jwt::TokenService;
pub use mailer::{LogMailer, Mailer, MemoryMailer};
pub use otp::OtpRegistry;
pub use passwords::PasswordService;
pub use pg_store::PgCredentialStore;
pub use roles::RoleTable;
pub use service::AccountService;
pub use store::{CredentialStore, MemoryCredentialStore};

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub token_service: Arc<TokenService>,
    pub otp_registry: Arc<OtpRegistry>,
    pub role_table: Arc<RoleTable>,
    pub accounts: Arc<AccountService>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        passwords: PasswordService,
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn Mailer>,
        role_table: RoleTable,
    ) -> AuthResult<Self> {
        let token_service = Arc::new(TokenService::from_config(&config)?);
        let otp_registry = Arc::new(OtpRegistry::from_config(&config));
        let accounts = Arc::new(AccountService::new(
            store,
            mailer,
            Arc::new(passwords),
            token_service.clone(),
            otp_registry.clone(),
            config.registration_policy(),
        ));

        Ok(Self {
            config,
            token_service,
            otp_registry,
            role_table: Arc::new(role_table),
            accounts,
        })
    }
}
