//! Authentication handlers: login and logout.
//!
//! Sessions are stateless JWTs in an HTTP-only cookie. Login verifies
//! credentials and sets the cookie; logout replaces it with an already-expired
//! one (there is no server-side session store to invalidate).

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};

use crate::{
    AppState,
    api::models::{Envelope, auth::LoginRequest, users::UserResponse},
    auth::{password, session},
    db::handlers::Users,
    errors::Error,
};

/// Build the session cookie carrying `token`.
pub(crate) fn create_session_cookie(token: &str, config: &crate::config::Config) -> String {
    let session_config = &config.auth.session;
    let max_age = config.auth.security.jwt_expiry.as_secs();

    format!(
        "{}={}; Path=/; HttpOnly; Secure={}; SameSite={}; Max-Age={}",
        session_config.cookie_name, token, session_config.cookie_secure, session_config.cookie_same_site, max_age
    )
}

/// Build an already-expired session cookie, clearing any stored session.
pub(crate) fn expired_session_cookie(config: &crate::config::Config) -> String {
    let session_config = &config.auth.session;
    format!(
        "{}=; Path=/; HttpOnly; Secure={}; SameSite={}; Max-Age=0",
        session_config.cookie_name, session_config.cookie_secure, session_config.cookie_same_site
    )
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = Envelope<UserResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not activated"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<impl IntoResponse, Error> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut pool_conn);

    // Find user by email
    let user = user_repo
        .get_user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::Unauthenticated {
            message: Some("Invalid email or password".to_string()),
        })?;

    // Verify password on a blocking thread to avoid blocking async runtime
    let password = request.password.clone();
    let hash = user.password_hash.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid {
        return Err(Error::Unauthenticated {
            message: Some("Invalid email or password".to_string()),
        });
    }

    // Pending email verification blocks login
    if !user.activated && state.config.auth.verify_email {
        return Err(Error::NotActivated);
    }

    let current_user = crate::api::models::users::CurrentUser::from(&user);
    let token = session::create_session_token(&current_user, &state.config)?;
    let cookie = create_session_cookie(&token, &state.config);

    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(Envelope::new(UserResponse::from(user))),
    ))
}

/// Logout (clear session)
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logout successful"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let cookie = expired_session_cookie(&state.config);

    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, cookie)]),
        Json(Envelope::new("Logout successful")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[test]
    fn test_session_cookie_format() {
        let config = create_test_config();
        let cookie = create_session_cookie("tok123", &config);
        assert!(cookie.starts_with(&format!("{}=tok123;", config.auth.session.cookie_name)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age="));
    }

    #[test]
    fn test_expired_cookie_clears_value() {
        let config = create_test_config();
        let cookie = expired_session_cookie(&config);
        assert!(cookie.starts_with(&format!("{}=;", config.auth.session.cookie_name)));
        assert!(cookie.contains("Max-Age=0"));
    }
}
