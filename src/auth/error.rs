use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("an account with this email already exists")]
    DuplicateAccount,
    #[error("role is not one of USER, ADMIN, SUPER_ADMIN")]
    InvalidRole,
    #[error("this role cannot be chosen at sign-up")]
    RoleNotSelfAssignable,
    #[error("region not found")]
    RegionNotFound,
    #[error("email domain is not accepted")]
    InvalidEmailDomain,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("account not found")]
    AccountNotFound,
    #[error("account is not verified yet")]
    AccountNotActive,
    #[error("account is already verified")]
    AccountAlreadyActive,
    #[error("wrong password")]
    WrongPassword,
    #[error("no pending verification code for this email")]
    OtpNotFound,
    #[error("verification code does not match")]
    OtpMismatch,
    #[error("verification code expired")]
    OtpExpired,
    #[error("token missing")]
    MissingToken,
    #[error("token invalid")]
    InvalidToken,
    #[error("token expired")]
    ExpiredToken,
    #[error("role not allowed")]
    ForbiddenRole,
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("credential store error: {0}")]
    Store(String),
    #[error("database error: {0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::DuplicateAccount | AuthError::AccountAlreadyActive => Status::Conflict,
            AuthError::InvalidRole
            | AuthError::RegionNotFound
            | AuthError::InvalidEmailDomain
            | AuthError::InvalidInput(_)
            | AuthError::OtpNotFound
            | AuthError::OtpMismatch
            | AuthError::OtpExpired => Status::BadRequest,
            AuthError::AccountNotFound => Status::NotFound,
            AuthError::AccountNotActive | AuthError::RoleNotSelfAssignable => Status::Forbidden,
            AuthError::WrongPassword
            | AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::ExpiredToken => Status::Unauthorized,
            AuthError::ForbiddenRole => Status::Forbidden,
            AuthError::Mail(_) => Status::BadGateway,
            AuthError::Config(_)
            | AuthError::Store(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }

    /// Stable machine-readable code. Token failures share one code so clients
    /// cannot tell a forged token from an expired one.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::DuplicateAccount => "DUPLICATE_ACCOUNT",
            AuthError::InvalidRole => "INVALID_ROLE",
            AuthError::RoleNotSelfAssignable => "ROLE_NOT_SELF_ASSIGNABLE",
            AuthError::RegionNotFound => "REGION_NOT_FOUND",
            AuthError::InvalidEmailDomain => "INVALID_EMAIL_DOMAIN",
            AuthError::InvalidInput(_) => "INVALID_INPUT",
            AuthError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            AuthError::AccountNotActive => "ACCOUNT_NOT_ACTIVE",
            AuthError::AccountAlreadyActive => "ACCOUNT_ALREADY_ACTIVE",
            AuthError::WrongPassword => "WRONG_PASSWORD",
            AuthError::OtpNotFound => "OTP_NOT_FOUND",
            AuthError::OtpMismatch => "OTP_MISMATCH",
            AuthError::OtpExpired => "OTP_EXPIRED",
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::ExpiredToken => {
                "UNAUTHORIZED"
            }
            AuthError::ForbiddenRole => "FORBIDDEN",
            AuthError::Mail(_) => "MAIL_DELIVERY_FAILED",
            AuthError::Config(_)
            | AuthError::Store(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::PasswordHash(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::ExpiredToken => {
                "unauthorized".to_string()
            }
            AuthError::ForbiddenRole => "forbidden".to_string(),
            AuthError::Mail(_) => "verification email could not be delivered".to_string(),
            err if err.is_internal() => "internal error".to_string(),
            err => err.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() == Status::InternalServerError
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_indistinguishable_to_clients() {
        let missing = AuthError::MissingToken;
        let invalid = AuthError::InvalidToken;
        let expired = AuthError::ExpiredToken;

        for err in [&missing, &invalid, &expired] {
            assert_eq!(err.status(), Status::Unauthorized);
            assert_eq!(err.code(), "UNAUTHORIZED");
            assert_eq!(err.public_message(), "unauthorized");
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AuthError::Store("connection reset by 10.0.0.4".into());
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn flow_errors_keep_their_message() {
        assert_eq!(
            AuthError::OtpExpired.public_message(),
            "verification code expired"
        );
        assert_eq!(AuthError::DuplicateAccount.status(), Status::Conflict);
    }
}
