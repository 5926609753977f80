//! Request gating: authentication then role authorization, always in that
//! order. Handlers opt in by taking a [`Caller`] argument.

use chrono::{DateTime, Utc};
use rocket::request::{FromRequest, Outcome};
use rocket::{Request, State};
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::account::Role;
use crate::auth::jwt::{AccountClaims, TokenKind, TokenService};
use crate::auth::roles::{EndpointId, RoleTable};
use crate::auth::{AuthError, AuthResult, AuthState};

/// Per-request identity produced by the authentication stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub claims: AccountClaims,
    pub token_expires_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn account_id(&self) -> i64 {
        self.claims.account_id
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }
}

/// Run both gates for one request. The authorization stage only ever sees
/// claims the authentication stage produced.
pub fn admit(
    tokens: &TokenService,
    roles: &RoleTable,
    authorization: Option<&str>,
    endpoint: &EndpointId<'_>,
) -> AuthResult<RequestContext> {
    let context = authenticate(tokens, authorization)?;
    authorize(roles, endpoint, &context)?;
    Ok(context)
}

fn authenticate(tokens: &TokenService, authorization: Option<&str>) -> AuthResult<RequestContext> {
    let token = bearer_token(authorization)?;
    let verified = tokens
        .verify_kind(token, TokenKind::Access)
        .map_err(|err| match err {
            AuthError::ExpiredToken => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        })?;

    Ok(RequestContext {
        claims: verified.claims,
        token_expires_at: verified.expires_at,
    })
}

fn authorize(
    roles: &RoleTable,
    endpoint: &EndpointId<'_>,
    context: &RequestContext,
) -> AuthResult<()> {
    let required = roles.required_roles(endpoint);
    if required.is_empty() || required.contains(&context.role()) {
        Ok(())
    } else {
        Err(AuthError::ForbiddenRole)
    }
}

fn bearer_token(header: Option<&str>) -> AuthResult<&str> {
    let header = header.ok_or(AuthError::MissingToken)?;
    let (scheme, token) = header.trim().split_once(' ').ok_or(AuthError::MissingToken)?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
        Ok(token)
    } else {
        Err(AuthError::MissingToken)
    }
}

/// An authenticated caller that passed the role check for the matched route.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct Caller(pub RequestContext);

impl Caller {
    pub fn context(&self) -> &RequestContext {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Caller {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match admit_request(request).await {
            Ok(context) => {
                request.local_cache(|| Some(context.clone()));
                Outcome::Success(Caller(context))
            }
            Err(err) => {
                log::debug!(
                    "rejected {} {}: {}",
                    request.method(),
                    request.uri(),
                    err
                );
                Outcome::Error((err.status(), err))
            }
        }
    }
}

async fn admit_request(request: &Request<'_>) -> AuthResult<RequestContext> {
    let state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let route = request
        .route()
        .ok_or_else(|| AuthError::Config("gate invoked outside a matched route".into()))?;
    let controller = route.uri.base().to_string();
    let handler = route.name.as_deref().unwrap_or_default();

    admit(
        &state.token_service,
        &state.role_table,
        request.headers().get_one("Authorization"),
        &EndpointId::new(&controller, handler),
    )
}

/// Context attached by [`Caller`], if the request passed the gates.
pub fn attached_context<'r>(request: &'r Request<'_>) -> Option<&'r RequestContext> {
    request
        .local_cache::<Option<RequestContext>, _>(|| None)
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::auth::account::AccountStatus;
    use chrono::Duration;

    const ADMIN_ONLY: EndpointId<'static> = EndpointId {
        controller: "/api/v1/user",
        handler: "add_admin",
    };
    const OPEN: EndpointId<'static> = EndpointId {
        controller: "/api/v1/user",
        handler: "me",
    };

    fn tokens() -> TokenService {
        TokenService::from_config(&AuthConfig {
            issuer: "https://marketplace.test".into(),
            audience: "marketplace-api".into(),
            jwt_secret: "gate-test-secret-0123456789abcdefghij".into(),
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 604800,
            otp_ttl_secs: 1200,
            otp_digits: 6,
            otp_max_attempts: 5,
            otp_sweep_interval_secs: 300,
            allowed_email_domains: Vec::new(),
            self_register_roles: Role::ALL.to_vec(),
        })
        .expect("token service")
    }

    fn table() -> RoleTable {
        RoleTable::builder()
            .handler(ADMIN_ONLY.controller, ADMIN_ONLY.handler, &[Role::Admin])
            .build()
    }

    fn claims(role: Role) -> AccountClaims {
        AccountClaims {
            account_id: 9,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role,
            status: AccountStatus::Active,
            email: "ada@x.com".into(),
        }
    }

    fn bearer(tokens: &TokenService, role: Role) -> String {
        let token = tokens
            .issue(TokenKind::Access, &claims(role))
            .expect("issue");
        format!("Bearer {}", token.token)
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        let tokens = tokens();
        let table = table();

        for header in [None, Some(""), Some("Bearer"), Some("Bearer   "), Some("Basic abc")] {
            assert!(matches!(
                admit(&tokens, &table, header, &OPEN),
                Err(AuthError::MissingToken)
            ));
        }
    }

    #[test]
    fn valid_token_attaches_claims() {
        let tokens = tokens();
        let header = bearer(&tokens, Role::User);

        let context = admit(&tokens, &table(), Some(&header), &OPEN).expect("admitted");
        assert_eq!(context.claims, claims(Role::User));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let tokens = tokens();
        let header = bearer(&tokens, Role::User).replacen("Bearer", "bearer", 1);
        assert!(admit(&tokens, &table(), Some(&header), &OPEN).is_ok());
    }

    #[test]
    fn expired_and_forged_tokens_are_unauthorized() {
        let tokens = tokens();
        let old = tokens
            .issue_at(
                TokenKind::Access,
                &claims(Role::Admin),
                Utc::now() - Duration::hours(3),
            )
            .expect("issue");

        let expired = admit(&tokens, &table(), Some(&format!("Bearer {}", old.token)), &OPEN)
            .expect_err("expired");
        let forged = admit(&tokens, &table(), Some("Bearer a.b.c"), &OPEN).expect_err("forged");

        assert_eq!(expired.status(), forged.status());
        assert_eq!(expired.public_message(), forged.public_message());
    }

    #[test]
    fn token_just_past_expiry_is_rejected() {
        let tokens = tokens();
        let stale = tokens
            .issue_at(
                TokenKind::Access,
                &claims(Role::Admin),
                Utc::now() - Duration::seconds(3600 + 2),
            )
            .expect("issue");

        assert!(matches!(
            admit(
                &tokens,
                &table(),
                Some(&format!("Bearer {}", stale.token)),
                &OPEN
            ),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn refresh_token_cannot_authenticate() {
        let tokens = tokens();
        let refresh = tokens
            .issue(TokenKind::Refresh, &claims(Role::Admin))
            .expect("issue");

        assert!(matches!(
            admit(
                &tokens,
                &table(),
                Some(&format!("Bearer {}", refresh.token)),
                &OPEN
            ),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn role_outside_allow_list_is_forbidden() {
        let tokens = tokens();
        let header = bearer(&tokens, Role::User);

        assert!(matches!(
            admit(&tokens, &table(), Some(&header), &ADMIN_ONLY),
            Err(AuthError::ForbiddenRole)
        ));
    }

    #[test]
    fn role_inside_allow_list_is_admitted() {
        let tokens = tokens();
        let header = bearer(&tokens, Role::Admin);

        let context = admit(&tokens, &table(), Some(&header), &ADMIN_ONLY).expect("admitted");
        assert_eq!(context.role(), Role::Admin);
    }

    #[test]
    fn empty_declaration_admits_any_authenticated_role() {
        let tokens = tokens();
        for role in Role::ALL {
            let header = bearer(&tokens, role);
            assert!(admit(&tokens, &table(), Some(&header), &OPEN).is_ok());
        }
    }

    #[test]
    fn authentication_runs_before_authorization() {
        let tokens = tokens();
        assert!(matches!(
            admit(&tokens, &table(), None, &ADMIN_ONLY),
            Err(AuthError::MissingToken)
        ));
    }
}
