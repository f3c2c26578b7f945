//! Authentication route handlers: password login, registration, password
//! reset and logout.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::routes::Nav;
use crate::routes::cart::redirect_with_error;
use crate::services::{AuthError, AuthService};
use crate::services::auth::{RESET_TOKEN_TTL_MINUTES, Registration};
use crate::state::AppState;

/// Where a successful login or registration lands.
const AFTER_LOGIN: &str = "/dashboard";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequestForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetUpdateForm {
    pub token: String,
    pub password: String,
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetUpdateQuery {
    pub token: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub nav: Nav,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/reset.html")]
pub struct ResetTemplate {
    pub nav: Nav,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/reset_update.html")]
pub struct ResetUpdateTemplate {
    pub nav: Nav,
    pub token: String,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// Shown after a reset request whether or not the account exists.
const RESET_SENT: &str = "If an account exists for that email, a reset link is on its way";

/// Display the login page. Signed-in users go straight to their dashboard.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to(AFTER_LOGIN).into_response();
    }
    LoginTemplate {
        nav: Nav::default(),
        error: query.error,
        success: query.success,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => start_session(&session, &user).await,
        Err(e) => {
            tracing::info!(error = %e, "Login failed");
            redirect_with_error("/login", &e.user_message())
        }
    }
}

/// Display the registration page.
pub async fn register_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to(AFTER_LOGIN).into_response();
    }
    RegisterTemplate {
        nav: Nav::default(),
        error: query.error,
        success: query.success,
    }
    .into_response()
}

/// Handle registration form submission and sign the new user in.
#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Response {
    let registration = Registration {
        name: &form.name,
        email: &form.email,
        password: &form.password,
        password_confirmation: &form.password_confirm,
    };

    match AuthService::new(state.pool()).register(&registration).await {
        Ok(profile) => {
            tracing::info!(user_id = %profile.id, "User registered");
            let user = CurrentUser {
                id: profile.id,
                email: profile.email,
            };
            start_session(&session, &user).await
        }
        Err(e) => {
            tracing::info!(error = %e, "Registration rejected");
            redirect_with_error("/register", &e.user_message())
        }
    }
}

async fn start_session(session: &Session, user: &CurrentUser) -> Response {
    if let Err(e) = set_current_user(session, user).await {
        tracing::error!(error = %e, "Failed to set session");
        return AppError::Internal("session".to_owned()).into_response();
    }
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Redirect::to(AFTER_LOGIN).into_response()
}

/// Display the password reset request form.
pub async fn reset_page(Query(query): Query<MessageQuery>) -> Response {
    ResetTemplate {
        nav: Nav::default(),
        error: query.error,
        success: query.success,
    }
    .into_response()
}

/// Issue a reset token and mail the link.
#[instrument(skip(state, form))]
pub async fn request_reset(
    State(state): State<AppState>,
    Form(form): Form<ResetRequestForm>,
) -> Response {
    match AuthService::new(state.pool())
        .request_password_reset(&form.email)
        .await
    {
        Ok(Some(issued)) => {
            let link = reset_link(&state.config().base_url, &issued.token);
            if let Err(e) = state
                .mailer()
                .send_password_reset(issued.email.as_str(), &link, RESET_TOKEN_TTL_MINUTES)
                .await
            {
                tracing::error!(error = %e, user_id = %issued.user_id, "Failed to send reset email");
            } else {
                tracing::info!(user_id = %issued.user_id, "Password reset requested");
            }
        }
        Ok(None) => tracing::info!("Password reset requested for unknown email"),
        Err(e @ AuthError::InvalidEmail(_)) => {
            return redirect_with_error("/reset", &e.user_message());
        }
        Err(e) => {
            tracing::error!(error = %e, "Password reset request failed");
            return redirect_with_error("/reset", &e.user_message());
        }
    }
    Redirect::to(&format!("/reset?success={}", urlencoding::encode(RESET_SENT))).into_response()
}

/// Display the new-password form for a reset link.
pub async fn reset_update_page(Query(query): Query<ResetUpdateQuery>) -> Response {
    let Some(token) = query.token.filter(|t| !t.trim().is_empty()) else {
        return redirect_with_error("/reset", &AuthError::InvalidResetToken.user_message());
    };
    ResetUpdateTemplate {
        nav: Nav::default(),
        token,
        error: query.error,
        success: None,
    }
    .into_response()
}

/// Redeem a reset link and send the user to log in.
#[instrument(skip(state, form))]
pub async fn reset_update(
    State(state): State<AppState>,
    Form(form): Form<ResetUpdateForm>,
) -> Response {
    match AuthService::new(state.pool())
        .reset_password(&form.token, &form.password, &form.password_confirm)
        .await
    {
        Ok(user_id) => {
            tracing::info!(%user_id, "Password reset completed");
            let message = urlencoding::encode("Password updated, please log in");
            Redirect::to(&format!("/login?success={message}")).into_response()
        }
        Err(AuthError::InvalidResetToken) => {
            redirect_with_error("/reset", &AuthError::InvalidResetToken.user_message())
        }
        Err(e) => {
            tracing::info!(error = %e, "Password reset rejected");
            Redirect::to(&format!(
                "/reset/update?token={}&error={}",
                urlencoding::encode(&form.token),
                urlencoding::encode(&e.user_message())
            ))
            .into_response()
        }
    }
}

fn reset_link(base_url: &str, token: &str) -> String {
    format!("{base_url}/reset/update?token={}", urlencoding::encode(token))
}

/// Log out and return to the home page.
///
/// Serves both `POST /logout` and `POST /api/auth/logout`.
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to clear session: {e}")))?;
    clear_sentry_user();
    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link_points_at_update_form() {
        assert_eq!(
            reset_link("https://denim.na", "ab12cd"),
            "https://denim.na/reset/update?token=ab12cd"
        );
    }
}
