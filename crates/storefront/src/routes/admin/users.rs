//! Customer accounts: admin flag and wallet balance.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use tracing::instrument;

use denim_core::{Cents, UserId};

use crate::db::{OrderRepository, ProfileRepository};
use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::Profile;
use crate::routes::Nav;
use crate::routes::admin::{FlashQuery, back_to};
use crate::routes::cart::redirect_with_error;
use crate::routes::orders::OrderSummaryView;
use crate::state::AppState;

#[derive(Clone)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub wallet: String,
    /// Wallet in major units for the edit field.
    pub wallet_major: String,
    pub is_admin: bool,
    pub joined: String,
}

impl From<&Profile> for UserView {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id.to_string(),
            name: profile.display_name().to_owned(),
            email: profile.email.to_string(),
            wallet: profile.wallet.to_string(),
            wallet_major: profile.wallet.to_major().to_string(),
            is_admin: profile.is_admin,
            joined: profile.created_at.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/users.html")]
pub struct UsersTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub users: Vec<UserView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "admin/user.html")]
pub struct UserTemplate {
    pub nav: Nav,
    pub current_path: &'static str,
    pub user: UserView,
    pub orders: Vec<OrderSummaryView>,
    pub error: Option<String>,
    pub success: Option<String>,
}

/// GET /admin/users
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(flash): Query<FlashQuery>,
) -> Result<UsersTemplate> {
    let profiles = ProfileRepository::new(state.pool()).list().await?;
    let (error, success) = flash.into_messages();

    Ok(UsersTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin/users",
        users: profiles.iter().map(UserView::from).collect(),
        error,
        success,
    })
}

/// GET /admin/users/{id}
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Query(flash): Query<FlashQuery>,
) -> Result<UserTemplate> {
    let profile = ProfileRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;
    let orders = OrderRepository::new(state.pool()).list_for_user(id).await?;
    let (error, success) = flash.into_messages();

    Ok(UserTemplate {
        nav: Nav::load(&state, Some(&admin)).await,
        current_path: "/admin/users",
        user: UserView::from(&profile),
        orders: orders.iter().map(OrderSummaryView::from).collect(),
        error,
        success,
    })
}

#[derive(Debug, Deserialize)]
pub struct AdminFlagForm {
    pub is_admin: String,
}

/// POST /admin/users/{id}/admin
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn set_admin(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Form(form): Form<AdminFlagForm>,
) -> Result<Response> {
    let grant = form.is_admin == "true";
    let result = ProfileRepository::new(state.pool())
        .set_admin(id, grant)
        .await;
    if result.is_ok() {
        tracing::info!(user_id = %id, grant, "Admin flag changed");
    }
    back_to("/admin/users", result)
}

#[derive(Debug, Deserialize)]
pub struct WalletForm {
    pub amount: String,
}

/// POST /admin/users/{id}/wallet
#[instrument(skip(state, admin, form), fields(admin = %admin.id))]
pub async fn set_wallet(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<UserId>,
    Form(form): Form<WalletForm>,
) -> Result<Response> {
    let page = format!("/admin/users/{id}");
    let Ok(balance) = Cents::parse_major(&form.amount) else {
        return Ok(redirect_with_error(&page, "Enter a non-negative amount"));
    };

    let result = ProfileRepository::new(state.pool())
        .set_wallet(id, balance)
        .await;
    if result.is_ok() {
        tracing::info!(user_id = %id, balance = %balance, "Wallet balance set");
    }
    back_to(&page, result)
}
