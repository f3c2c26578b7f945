//! Authentication and admin gate.
//!
//! The session holds only the signed-in user's identity. The admin flag is
//! re-read from `profiles` on every gated request, so revoking admin takes
//! effect immediately. A failed profile lookup is treated as "not admin".

use axum::{
    Json,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

use crate::db::ProfileRepository;
use crate::models::{CurrentUser, session_keys};
use crate::state::AppState;

/// Login page for unauthenticated visitors.
pub const LOGIN_PATH: &str = "/login";

/// Extractor that requires a signed-in user.
///
/// ```rust,ignore
/// async fn orders(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Orders for {}", user.email)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that requires a signed-in administrator.
pub struct RequireAdmin(pub CurrentUser);

/// Extractor that optionally gets the current user.
pub struct OptionalAuth(pub Option<CurrentUser>);

/// Why a gated request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// Not signed in, page request: go to the login page.
    RedirectToLogin,
    /// Signed in but not an administrator, page request: go home.
    RedirectHome,
    /// Not signed in, API request.
    Unauthorized,
    /// Signed in but not an administrator, API request.
    Forbidden,
}

impl AuthRejection {
    fn unauthenticated(path: &str) -> Self {
        if is_api(path) {
            Self::Unauthorized
        } else {
            Self::RedirectToLogin
        }
    }

    fn not_admin(path: &str) -> Self {
        if is_api(path) {
            Self::Forbidden
        } else {
            Self::RedirectHome
        }
    }
}

fn is_api(path: &str) -> bool {
    path.starts_with("/api/")
}

/// Full request path. Nested routers see `uri` with their prefix removed.
fn request_path(parts: &Parts) -> &str {
    parts
        .extensions
        .get::<OriginalUri>()
        .map_or_else(|| parts.uri.path(), |uri| uri.0.path())
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to(LOGIN_PATH).into_response(),
            Self::RedirectHome => Redirect::to("/").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "Unauthorized" })),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Forbidden" })),
            )
                .into_response(),
        }
    }
}

async fn session_user(parts: &Parts) -> Option<CurrentUser> {
    let session = parts.extensions.get::<Session>()?;
    match session.get::<CurrentUser>(session_keys::CURRENT_USER).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read session");
            None
        }
    }
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_user(parts)
            .await
            .map(Self)
            .ok_or_else(|| AuthRejection::unauthenticated(request_path(parts)))
    }
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_user(parts).await))
    }
}

/// Marker left in request extensions by [`admin_gate`].
#[derive(Clone)]
struct VerifiedAdmin(CurrentUser);

/// Whether `user` is an administrator right now.
pub async fn is_admin(state: &AppState, user: &CurrentUser) -> bool {
    match ProfileRepository::new(state.pool()).is_admin(user.id).await {
        Ok(flag) => flag.unwrap_or(false),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Admin check failed, denying");
            false
        }
    }
}

async fn check_admin(parts: &Parts, state: &AppState) -> Result<CurrentUser, AuthRejection> {
    let path = request_path(parts);
    let user = session_user(parts)
        .await
        .ok_or_else(|| AuthRejection::unauthenticated(path))?;
    if is_admin(state, &user).await {
        Ok(user)
    } else {
        tracing::info!(user_id = %user.id, path, "Non-admin denied");
        Err(AuthRejection::not_admin(path))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(VerifiedAdmin(user)) = parts.extensions.get::<VerifiedAdmin>() {
            return Ok(Self(user.clone()));
        }
        check_admin(parts, state).await.map(Self)
    }
}

/// Route layer for the back office: only administrators get through.
pub async fn admin_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    match check_admin(&parts, &state).await {
        Ok(user) => {
            parts.extensions.insert(VerifiedAdmin(user));
            next.run(Request::from_parts(parts, body)).await
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// Store the signed-in user in the session, rotating the session ID.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Clear the whole session (logout).
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_depend_on_path() {
        assert_eq!(
            AuthRejection::unauthenticated("/admin/products"),
            AuthRejection::RedirectToLogin
        );
        assert_eq!(
            AuthRejection::unauthenticated("/api/upload"),
            AuthRejection::Unauthorized
        );
        assert_eq!(AuthRejection::not_admin("/admin"), AuthRejection::RedirectHome);
        assert_eq!(
            AuthRejection::not_admin("/api/admin/contact-messages/mark-read"),
            AuthRejection::Forbidden
        );
    }

    #[test]
    fn test_request_path_prefers_original_uri() {
        let (mut parts, ()) = axum::http::Request::builder()
            .uri("/orders")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(request_path(&parts), "/orders");

        parts
            .extensions
            .insert(OriginalUri("/api/orders?scope=all".parse().unwrap()));
        assert_eq!(request_path(&parts), "/api/orders");
        assert_eq!(
            AuthRejection::unauthenticated(request_path(&parts)),
            AuthRejection::Unauthorized
        );
    }

    #[test]
    fn test_rejection_responses() {
        let response = AuthRejection::RedirectToLogin.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()["location"], "/login");

        let response = AuthRejection::RedirectHome.into_response();
        assert_eq!(response.headers()["location"], "/");

        assert_eq!(
            AuthRejection::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
