use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Route, State, get, post};
use rocket_okapi::{openapi, openapi_get_routes};

use crate::auth::account::{AccountSummary, Role};
use crate::auth::guards::Caller;
use crate::auth::jwt::AccountClaims;
use crate::auth::responses::{
    AccessTokenResponse, FlowResponse, LoginRequest, PromoteRequest, RefreshRequest,
    RegisterRequest, ResendCodeRequest, TokenPair, VerifyRequest, VerifyResponse,
};
use crate::auth::{AuthError, AuthState, RoleTable};

/// Mount point for the account routes.
pub const USER_BASE: &str = "/api/v1/user";

type FlowResult<T> = Result<Json<FlowResponse<T>>, status::Custom<Json<FlowResponse<T>>>>;

/// Role requirements for the account routes, keyed by handler name.
pub fn role_table() -> RoleTable {
    RoleTable::builder()
        .handler(USER_BASE, "register_admin", &[Role::SuperAdmin])
        .handler(USER_BASE, "add_admin", &[Role::Admin, Role::SuperAdmin])
        .handler(USER_BASE, "all_users", &[Role::Admin, Role::SuperAdmin])
        .build()
}

/// Account routes plus their generated `openapi.json`.
pub fn routes() -> Vec<Route> {
    openapi_get_routes![
        register,
        register_admin,
        verify,
        resend_otp,
        login,
        refresh_token,
        me,
        add_admin,
        all_users,
    ]
}

#[openapi(tag = "User")]
#[post("/register", data = "<payload>")]
pub async fn register(state: &State<AuthState>, payload: Json<RegisterRequest>) -> FlowResult<()> {
    let message = state
        .accounts
        .register(payload.into_inner())
        .await
        .map_err(respond_error)?;
    Ok(Json(FlowResponse::message(message)))
}

#[openapi(tag = "User")]
#[post("/register-admin", data = "<payload>")]
pub async fn register_admin(
    state: &State<AuthState>,
    caller: Caller,
    payload: Json<RegisterRequest>,
) -> FlowResult<()> {
    let message = state
        .accounts
        .register_admin(payload.into_inner())
        .await
        .map_err(respond_error)?;
    log::info!("admin registration by account {}", caller.context().account_id());
    Ok(Json(FlowResponse::message(message)))
}

#[openapi(tag = "User")]
#[post("/verify", data = "<payload>")]
pub async fn verify(
    state: &State<AuthState>,
    payload: Json<VerifyRequest>,
) -> FlowResult<VerifyResponse> {
    let status = state
        .accounts
        .verify(&payload.email, &payload.otp)
        .await
        .map_err(respond_error)?;
    Ok(Json(FlowResponse::ok(
        "Account verified",
        VerifyResponse { status },
    )))
}

#[openapi(tag = "User")]
#[post("/resend-otp", data = "<payload>")]
pub async fn resend_otp(
    state: &State<AuthState>,
    payload: Json<ResendCodeRequest>,
) -> FlowResult<()> {
    state
        .accounts
        .resend_code(&payload.email)
        .await
        .map_err(respond_error)?;
    Ok(Json(FlowResponse::message("A new verification code was sent")))
}

#[openapi(tag = "User")]
#[post("/login", data = "<payload>")]
pub async fn login(state: &State<AuthState>, payload: Json<LoginRequest>) -> FlowResult<TokenPair> {
    let pair = state
        .accounts
        .login(&payload.email, &payload.password)
        .await
        .map_err(respond_error)?;
    Ok(Json(FlowResponse::ok("Logged in", pair)))
}

#[openapi(tag = "User")]
#[post("/refresh-token", data = "<payload>")]
pub async fn refresh_token(
    state: &State<AuthState>,
    payload: Json<RefreshRequest>,
) -> FlowResult<AccessTokenResponse> {
    let access = state
        .accounts
        .refresh(&payload.refresh_token)
        .map_err(respond_error)?;
    Ok(Json(FlowResponse::ok(
        "Access token refreshed",
        AccessTokenResponse {
            access_token: access.token,
            access_token_expires_at: access.expires_at,
        },
    )))
}

#[openapi(tag = "User")]
#[get("/me")]
pub async fn me(caller: Caller) -> FlowResult<AccountClaims> {
    Ok(Json(FlowResponse::ok("Current account", caller.0.claims)))
}

#[openapi(tag = "User")]
#[post("/add-admin", data = "<payload>")]
pub async fn add_admin(
    state: &State<AuthState>,
    caller: Caller,
    payload: Json<PromoteRequest>,
) -> FlowResult<AccountSummary> {
    let promoted = state
        .accounts
        .promote_to_admin(payload.user_id)
        .await
        .map_err(respond_error)?;
    log::info!(
        "account {} granted {} by account {}",
        promoted.id,
        promoted.role,
        caller.context().account_id()
    );
    Ok(Json(FlowResponse::ok("Account promoted", promoted)))
}

#[openapi(tag = "User")]
#[get("/all-users")]
pub async fn all_users(
    state: &State<AuthState>,
    _caller: Caller,
) -> FlowResult<Vec<AccountSummary>> {
    let accounts = state.accounts.list_accounts().await.map_err(respond_error)?;
    Ok(Json(FlowResponse::ok(
        format!("{} accounts", accounts.len()),
        accounts,
    )))
}

fn respond_error<T>(err: AuthError) -> status::Custom<Json<FlowResponse<T>>> {
    if err.is_internal() {
        log::error!("account flow failed: {}", err);
    } else {
        log::debug!("account flow rejected: {}", err);
    }
    status::Custom(err.status(), Json(FlowResponse::failure(&err)))
}
