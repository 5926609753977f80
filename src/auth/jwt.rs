use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::account::{Account, AccountStatus, Role};
use crate::auth::{AuthConfig, AuthError, AuthResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Identity snapshot carried inside every token.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountClaims {
    pub account_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email: String,
}

impl From<&Account> for AccountClaims {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            role: account.role,
            status: account.status,
            email: account.email.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenPayload {
    sub: String,
    iss: String,
    aud: String,
    exp: i64,
    iat: i64,
    jti: String,
    kind: TokenKind,
    #[serde(flatten)]
    account: AccountClaims,
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub kind: TokenKind,
    pub claims: AccountClaims,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies HS256 tokens with the shared service secret.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl TokenService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(AuthError::Config("jwt secret must not be empty".into()));
        }
        let secret_bytes = config.jwt_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret_bytes),
            decoding_key: DecodingKey::from_secret(secret_bytes),
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn issue(&self, kind: TokenKind, claims: &AccountClaims) -> AuthResult<SignedToken> {
        self.issue_at(kind, claims, Utc::now())
    }

    pub fn issue_at(
        &self,
        kind: TokenKind,
        claims: &AccountClaims,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let ttl = match kind {
            TokenKind::Access => self.access_token_ttl,
            TokenKind::Refresh => self.refresh_token_ttl,
        };
        let expires_at = now + ttl;

        let payload = TokenPayload {
            sub: claims.account_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
            account: claims.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)?;

        Ok(SignedToken { token, expires_at })
    }

    /// Verify signature, issuer, audience and expiry.
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedToken> {
        let data = decode::<TokenPayload>(token, &self.decoding_key, &self.validation).map_err(
            |err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            },
        )?;
        let payload = data.claims;

        if payload.sub != payload.account.account_id.to_string() {
            return Err(AuthError::InvalidToken);
        }

        let expires_at = Utc
            .timestamp_opt(payload.exp, 0)
            .single()
            .ok_or(AuthError::InvalidToken)?;

        Ok(VerifiedToken {
            kind: payload.kind,
            claims: payload.account,
            expires_at,
        })
    }

    /// Like [`TokenService::verify`], but refuses tokens of the other kind.
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> AuthResult<VerifiedToken> {
        let verified = self.verify(token)?;
        if verified.kind != expected {
            return Err(AuthError::InvalidToken);
        }
        Ok(verified)
    }
}
