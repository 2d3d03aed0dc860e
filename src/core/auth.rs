//! Users, permissions and bearer tokens.
//!
//! Tokens are `payload.signature`, both URL-safe base64: the payload is the
//! JSON [`Claims`], the signature an HMAC-SHA256 of the encoded payload under
//! the configured secret. Passwords are stored as `salt$hmac_sha256(salt, password)`.

use crate::{
    config::Settings,
    core::invoice::INVOICED_STATES,
    entities::{Order, User, UserPermission, order, user, user_permission},
    errors::{Error, Result},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, instrument};

type HmacSha256 = Hmac<Sha256>;

const MAX_TOKEN_LEN: usize = 1024;

fn salted_mac(salt: &str, password: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).map_err(|e| Error::Config {
        message: format!("Invalid password salt: {e}"),
    })?;
    mac.update(password.as_bytes());
    Ok(mac)
}

/// Salted HMAC-SHA256 digest of `password`, stored as `salt$hex`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    let digest = salted_mac(&salt, password)?.finalize().into_bytes();
    Ok(format!("{salt}${}", hex::encode(digest)))
}

/// Checks `password` against a digest produced by [`hash_password`].
///
/// The digest comparison runs in constant time.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    salted_mac(salt, password).is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Authenticates API requests
    Access,
    /// Obtains a new token pair
    Refresh,
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    /// Token purpose
    pub kind: TokenKind,
    /// Expiry as a Unix timestamp
    pub exp: i64,
}

/// Signs `claims` with `secret`.
pub fn encode_token(claims: &Claims, secret: &[u8]) -> Result<String> {
    let payload = serde_json::to_vec(claims).map_err(|e| Error::Config {
        message: format!("Cannot encode token: {e}"),
    })?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload);
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::Config {
        message: format!("Invalid token secret: {e}"),
    })?;
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload_part}.{sig_part}"))
}

/// Verifies the signature, kind and expiry of `token`.
pub fn decode_token(
    token: &str,
    secret: &[u8],
    kind: TokenKind,
    now: DateTime<Utc>,
) -> Result<Claims> {
    let invalid = || Error::unauthorized("Invalid token");

    if token.len() > MAX_TOKEN_LEN {
        return Err(invalid());
    }
    let (payload_part, sig_part) = token.split_once('.').ok_or_else(invalid)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| Error::Config {
        message: format!("Invalid token secret: {e}"),
    })?;
    mac.update(payload_part.as_bytes());
    let signature = URL_SAFE_NO_PAD.decode(sig_part).map_err(|_| invalid())?;
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let payload = URL_SAFE_NO_PAD.decode(payload_part).map_err(|_| invalid())?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| invalid())?;

    if claims.kind != kind {
        return Err(Error::unauthorized("Wrong token type"));
    }
    if claims.exp <= now.timestamp() {
        return Err(Error::unauthorized("Token expired"));
    }
    Ok(claims)
}

/// Access and refresh token returned to clients
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// Short-lived token for API calls
    pub access: String,
    /// Long-lived token for [`refresh_tokens`]
    pub refresh: String,
    /// Always `Bearer`
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Issues a fresh token pair for `user_id`.
pub fn issue_tokens(settings: &Settings, user_id: i64, now: DateTime<Utc>) -> Result<TokenPair> {
    let secret = settings.token_secret.as_bytes();
    let access = encode_token(
        &Claims {
            sub: user_id,
            kind: TokenKind::Access,
            exp: (now + settings.access_token_ttl).timestamp(),
        },
        secret,
    )?;
    let refresh = encode_token(
        &Claims {
            sub: user_id,
            kind: TokenKind::Refresh,
            exp: (now + settings.refresh_token_ttl).timestamp(),
        },
        secret,
    )?;

    Ok(TokenPair {
        access,
        refresh,
        token_type: "Bearer",
        expires_in: settings.access_token_ttl.num_seconds(),
    })
}

fn ensure_can_authenticate(user: &user::Model) -> Result<()> {
    if !user.is_active || user.password_hash.is_none() {
        return Err(Error::unauthorized("Account disabled"));
    }
    Ok(())
}

/// Checks credentials and returns the user.
#[instrument(skip(db, password))]
pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<user::Model> {
    let bad_credentials = || Error::unauthorized("Invalid username or password");

    let user = User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?
        .ok_or_else(bad_credentials)?;

    let stored = user.password_hash.as_deref().ok_or_else(bad_credentials)?;
    if !verify_password(password, stored) {
        debug!("Password mismatch");
        return Err(bad_credentials());
    }
    ensure_can_authenticate(&user)?;
    Ok(user)
}

/// Resolves the user behind an access token.
pub async fn user_from_access_token(
    db: &DatabaseConnection,
    settings: &Settings,
    token: &str,
    now: DateTime<Utc>,
) -> Result<user::Model> {
    let claims = decode_token(token, settings.token_secret.as_bytes(), TokenKind::Access, now)?;
    let user = User::find_by_id(claims.sub)
        .one(db)
        .await?
        .ok_or_else(|| Error::unauthorized("Unknown user"))?;
    ensure_can_authenticate(&user)?;
    Ok(user)
}

/// Exchanges a refresh token for a new token pair.
pub async fn refresh_tokens(
    db: &DatabaseConnection,
    settings: &Settings,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<TokenPair> {
    let claims = decode_token(
        refresh_token,
        settings.token_secret.as_bytes(),
        TokenKind::Refresh,
        now,
    )?;
    let user = User::find_by_id(claims.sub)
        .one(db)
        .await?
        .ok_or_else(|| Error::unauthorized("Unknown user"))?;
    ensure_can_authenticate(&user)?;
    issue_tokens(settings, user.id, now)
}

/// Fields of a new user
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Login name
    pub username: String,
    /// Clear-text password; `None` creates a user that cannot log in
    #[serde(default)]
    pub password: Option<String>,
    /// Contact address
    #[serde(default)]
    pub email: Option<String>,
    /// Display name
    #[serde(default)]
    pub first_name: String,
    /// Staff flag
    #[serde(default)]
    pub is_staff: bool,
    /// Superuser flag
    #[serde(default)]
    pub is_superuser: bool,
}

/// Partial update of a user; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    /// New contact address
    pub email: Option<String>,
    /// New display name
    pub first_name: Option<String>,
    /// New clear-text password
    pub password: Option<String>,
    /// New staff flag
    pub is_staff: Option<bool>,
    /// New superuser flag
    pub is_superuser: Option<bool>,
    /// New active flag
    pub is_active: Option<bool>,
}

/// Creates a user; usernames are unique.
pub async fn create_user<C: ConnectionTrait>(db: &C, new_user: NewUser) -> Result<user::Model> {
    let username = new_user.username.trim().to_string();
    if username.is_empty() {
        return Err(Error::validation("Username cannot be empty"));
    }
    if let Some(password) = &new_user.password {
        if password.is_empty() {
            return Err(Error::validation("Password cannot be empty"));
        }
    }

    let taken = User::find()
        .filter(user::Column::Username.eq(username.as_str()))
        .one(db)
        .await?
        .is_some();
    if taken {
        return Err(Error::conflict(format!("Username {username} is taken")));
    }

    user::ActiveModel {
        username: Set(username),
        email: Set(new_user.email.filter(|email| !email.trim().is_empty())),
        first_name: Set(new_user.first_name),
        password_hash: Set(new_user.password.as_deref().map(hash_password).transpose()?),
        is_staff: Set(new_user.is_staff),
        is_superuser: Set(new_user.is_superuser),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Lists users by username.
pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<user::Model>> {
    User::find()
        .order_by_asc(user::Column::Username)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Fetches one user.
pub async fn get_user<C: ConnectionTrait>(db: &C, id: i64) -> Result<user::Model> {
    User::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("User", id))
}

/// Applies a partial update.
pub async fn update_user(db: &DatabaseConnection, id: i64, update: UserUpdate) -> Result<user::Model> {
    let existing = get_user(db, id).await?;
    let mut active: user::ActiveModel = existing.into();

    if let Some(email) = update.email {
        active.email = Set(Some(email).filter(|email| !email.trim().is_empty()));
    }
    if let Some(first_name) = update.first_name {
        active.first_name = Set(first_name);
    }
    if let Some(password) = update.password {
        if password.is_empty() {
            return Err(Error::validation("Password cannot be empty"));
        }
        active.password_hash = Set(Some(hash_password(&password)?));
    }
    if let Some(is_staff) = update.is_staff {
        active.is_staff = Set(is_staff);
    }
    if let Some(is_superuser) = update.is_superuser {
        active.is_superuser = Set(is_superuser);
    }
    if let Some(is_active) = update.is_active {
        active.is_active = Set(is_active);
    }

    active.update(db).await.map_err(Into::into)
}

/// Deletes a user with their permissions and unbooked orders.
///
/// Refused with a conflict while the user has validated or delivered orders:
/// those are booked as operations and counted on invoices.
pub async fn delete_user(db: &DatabaseConnection, id: i64) -> Result<()> {
    let txn = db.begin().await?;
    let user = get_user(&txn, id).await?;
    let invoiced = Order::find()
        .filter(order::Column::UserId.eq(id))
        .filter(order::Column::State.is_in(INVOICED_STATES))
        .count(&txn)
        .await?;
    if invoiced > 0 {
        return Err(Error::conflict(format!(
            "User {} has {invoiced} validated order(s); deactivate the account instead",
            user.username
        )));
    }

    User::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    info!("Deleted user {}", user.username);
    Ok(())
}

/// Permission flags for one feature
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PermissionInput {
    /// Feature key, e.g. `canteen_validate_orders`
    pub feature: String,
    /// May read
    #[serde(default)]
    pub can_view: bool,
    /// May create
    #[serde(default)]
    pub can_create: bool,
    /// May modify
    #[serde(default)]
    pub can_update: bool,
    /// May delete
    #[serde(default)]
    pub can_delete: bool,
}

/// Lists the permissions of a user.
pub async fn list_permissions<C: ConnectionTrait>(
    db: &C,
    user_id: i64,
) -> Result<Vec<user_permission::Model>> {
    UserPermission::find()
        .filter(user_permission::Column::UserId.eq(user_id))
        .order_by_asc(user_permission::Column::Feature)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Replaces every permission of a user.
pub async fn set_permissions(
    db: &DatabaseConnection,
    user_id: i64,
    permissions: Vec<PermissionInput>,
) -> Result<Vec<user_permission::Model>> {
    let mut seen = std::collections::HashSet::new();
    for permission in &permissions {
        if permission.feature.trim().is_empty() {
            return Err(Error::validation("Feature cannot be empty"));
        }
        if !seen.insert(permission.feature.as_str()) {
            return Err(Error::validation(format!(
                "Feature {} listed twice",
                permission.feature
            )));
        }
    }

    let txn = db.begin().await?;
    get_user(&txn, user_id).await?;

    UserPermission::delete_many()
        .filter(user_permission::Column::UserId.eq(user_id))
        .exec(&txn)
        .await?;

    let now = Utc::now();
    for permission in permissions {
        user_permission::ActiveModel {
            user_id: Set(user_id),
            feature: Set(permission.feature.trim().to_string()),
            can_view: Set(permission.can_view),
            can_create: Set(permission.can_create),
            can_update: Set(permission.can_update),
            can_delete: Set(permission.can_delete),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    let saved = list_permissions(&txn, user_id).await?;
    txn.commit().await?;
    Ok(saved)
}

/// True for staff, superusers and holders of the order-validation permission.
pub async fn is_privileged<C: ConnectionTrait>(db: &C, user: &user::Model) -> Result<bool> {
    if user.is_staff || user.is_superuser {
        return Ok(true);
    }
    let permission = UserPermission::find()
        .filter(user_permission::Column::UserId.eq(user.id))
        .filter(user_permission::Column::Feature.eq(user_permission::VALIDATE_ORDERS_FEATURE))
        .filter(user_permission::Column::CanUpdate.eq(true))
        .one(db)
        .await?;
    Ok(permission.is_some())
}

/// True for staff and superusers.
pub const fn is_admin(user: &user::Model) -> bool {
    user.is_staff || user.is_superuser
}
