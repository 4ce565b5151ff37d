use crate::{AppState, api::models::users::CurrentUser, auth::session, errors::Error};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No JWT cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): JWT cookie present but invalid/malformed
#[instrument(skip(parts, config))]
fn try_jwt_session_auth(parts: &Parts, config: &crate::config::Config) -> Option<Result<CurrentUser, Error>> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.session.cookie_name;

    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some((name, value)) = cookie.split_once('=') {
            if name == cookie_name {
                // Try to verify the JWT session token
                match session::verify_session_token(value, config) {
                    Ok(user) => return Some(Ok(user)),
                    Err(_) => {
                        // Invalid/expired token; expected for stale cookies, so keep
                        // scanning instead of failing the whole request
                        continue;
                    }
                }
            }
        }
    }
    None
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Error> {
        match try_jwt_session_auth(parts, &state.config) {
            Some(Ok(user)) => {
                trace!("Found JWT session authenticated user: {}", user.id);
                Ok(user)
            }
            Some(Err(e)) => {
                trace!("JWT session authentication failed: {:?}", e);
                Err(Error::Unauthenticated { message: None })
            }
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::create_session_token;
    use crate::test_utils::{create_test_config, create_test_state};
    use axum::extract::FromRequestParts as _;
    use uuid::Uuid;

    fn parts_with_cookie(cookie: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(axum::http::header::COOKIE, cookie)
            .body(())
            .unwrap();

        let (parts, _body) = request.into_parts();
        parts
    }

    #[test_log::test(tokio::test)]
    async fn test_valid_session_cookie_extracts_user() {
        let config = create_test_config();
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "cookie@example.com".to_string(),
            roles: vec!["user".to_string()],
            is_admin: false,
        };
        let token = create_session_token(&user, &config).unwrap();
        let state = create_test_state(config.clone());

        let cookie = format!("{}={token}", config.auth.session.cookie_name);
        let mut parts = parts_with_cookie(&cookie);

        let extracted = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.id, user.id);
        assert_eq!(extracted.email, user.email);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_cookie_returns_unauthorized() {
        let state = create_test_state(create_test_config());
        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();

        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        let error = result.unwrap_err();
        assert_eq!(error.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_garbage_token_returns_unauthorized() {
        let config = create_test_config();
        let state = create_test_state(config.clone());
        let cookie = format!("{}=garbage.token.value", config.auth.session.cookie_name);
        let mut parts = parts_with_cookie(&cookie);

        let result = CurrentUser::from_request_parts(&mut parts, &state).await;
        assert!(result.is_err());
    }
}
