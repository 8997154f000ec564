use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::auth::{clear_session_cookie, password, session, session_cookie};
use crate::db::is_constraint_violation;
use crate::db::models::{AuthType, User};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentUser};
use crate::state::AppState;
use crate::validate;

// --- Requests ---

#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct OauthRequest {
    pub oauth_id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct UserLookup {
    pub username: String,
}

/// Returned by every endpoint that opens a session. The token is also set
/// as a cookie; API clients can send it back as a bearer token instead.
#[derive(Serialize)]
pub struct SessionResponse {
    pub user: User,
    pub token: String,
}

// --- Handlers ---

pub async fn signup(
    State(state): State<AppState>,
    AppJson(req): AppJson<SignupRequest>,
) -> AppResult<Response> {
    let username = validate::username(&req.username)?;
    let plain = validate::password(&req.password)?;
    let email = validate::email(req.email.as_deref())?;
    let display_name = validate::optional_text("display_name", req.display_name.as_deref(), 60)?;

    let hash = password::hash(plain.to_string(), state.config.auth.bcrypt_cost).await?;
    let id = uuid::Uuid::now_v7().to_string();
    {
        let conn = state.db.get()?;
        conn.execute(
            "INSERT INTO users (id, username, email, display_name, auth_type, password_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, username, email, display_name, AuthType::Native, hash],
        )
        .map_err(|e| username_conflict(e, &username))?;
    }

    tracing::info!(user_id = %id, %username, "Created native account");
    open_session(&state, &id, StatusCode::CREATED)
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Response> {
    let stored: Option<(String, Option<String>)> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id, password_hash FROM users
             WHERE username = ?1 AND deleted_at IS NULL AND auth_type = 'native'",
            params![req.username.trim()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
    };

    let (user_id, stored_hash) = stored.map_or((None, None), |(id, hash)| (Some(id), hash));
    let matches = password::verify(
        req.password.clone(),
        stored_hash,
        state.config.auth.bcrypt_cost,
    )
    .await?;

    let user_id = match user_id {
        Some(id) if matches => id,
        _ => {
            tracing::warn!(username = %req.username.trim(), "Failed login");
            return Err(AppError::Unauthorized);
        }
    };

    open_session(&state, &user_id, StatusCode::OK)
}

/// Find-or-create an account keyed by the external identity.
pub async fn oauth_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<OauthRequest>,
) -> AppResult<Response> {
    let oauth_id = validate::text("oauth_id", &req.oauth_id, 1, 255)?;

    let existing: Option<String> = {
        let conn = state.db.get()?;
        conn.query_row(
            "SELECT id FROM users WHERE oauth_id = ?1 AND deleted_at IS NULL",
            params![oauth_id],
            |r| r.get(0),
        )
        .optional()?
    };

    let (user_id, status) = match existing {
        Some(id) => (id, StatusCode::OK),
        None => {
            let username = validate::username(&req.username)?;
            let email = validate::email(req.email.as_deref())?;
            let display_name =
                validate::optional_text("display_name", req.display_name.as_deref(), 60)?;
            let id = uuid::Uuid::now_v7().to_string();
            let conn = state.db.get()?;
            conn.execute(
                "INSERT INTO users (id, username, email, display_name, auth_type, oauth_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, username, email, display_name, AuthType::Oauth, oauth_id],
            )
            .map_err(|e| username_conflict(e, &username))?;
            tracing::info!(user_id = %id, %username, "Created oauth account");
            (id, StatusCode::CREATED)
        }
    };

    open_session(&state, &user_id, status)
}

pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    session::delete_session(&state.db, &user.token)?;
    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    Ok(Json(load_user(&conn, &user.id)?))
}

pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    Ok(Json(load_user(&conn, &id)?))
}

pub async fn find_user(
    State(state): State<AppState>,
    AppQuery(lookup): AppQuery<UserLookup>,
) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let id: String = conn
        .query_row(
            "SELECT id FROM users WHERE username = ?1 AND deleted_at IS NULL",
            params![lookup.username.trim()],
            |r| r.get(0),
        )
        .or_not_found()?;
    Ok(Json(load_user(&conn, &id)?))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    if id != user.id {
        return Err(AppError::Forbidden);
    }

    let conn = state.db.get()?;
    let mut current = load_user(&conn, &id)?;

    // Every field is checked before anything is written.
    if let Some(ref display_name) = req.display_name {
        current.display_name = validate::optional_text("display_name", Some(display_name), 60)?;
    }
    if let Some(ref bio) = req.bio {
        current.bio = validate::optional_text("bio", Some(bio), 500)?;
    }
    if let Some(ref email) = req.email {
        current.email = validate::email(Some(email))?;
    }

    conn.execute(
        "UPDATE users SET display_name = ?1, bio = ?2, email = ?3, updated_at = datetime('now')
         WHERE id = ?4",
        params![current.display_name, current.bio, current.email, id],
    )?;

    Ok(Json(load_user(&conn, &id)?))
}

/// Soft delete: the row stays (pieces keep their creator) but the account
/// is gone for every read and login.
pub async fn delete_user(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<Response> {
    if id != user.id {
        return Err(AppError::Forbidden);
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE users SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
    )?;
    let dropped = session::delete_user_sessions(&tx, &id)?;
    tx.commit()?;
    tracing::info!(user_id = %id, sessions = dropped, "Soft-deleted account");

    Ok((
        StatusCode::NO_CONTENT,
        [(
            header::SET_COOKIE,
            clear_session_cookie(&state.config.auth.cookie_name),
        )],
    )
        .into_response())
}

// --- Helpers ---

fn open_session(state: &AppState, user_id: &str, status: StatusCode) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, user_id, hours)?;
    let user = {
        let conn = state.db.get()?;
        load_user(&conn, user_id)?
    };
    let cookie = session_cookie(&state.config.auth.cookie_name, &token, hours);

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse { user, token }),
    )
        .into_response())
}

fn username_conflict(err: rusqlite::Error, username: &str) -> AppError {
    if is_constraint_violation(&err) {
        AppError::conflict(format!("username '{}' is already taken", username))
    } else {
        err.into()
    }
}

/// Load an active user with the ids of everything they created.
pub fn load_user(conn: &Connection, id: &str) -> AppResult<User> {
    let mut user = conn
        .query_row(
            "SELECT id, username, email, display_name, bio, auth_type, created_at
             FROM users WHERE id = ?1 AND deleted_at IS NULL",
            params![id],
            |r| {
                Ok(User {
                    id: r.get(0)?,
                    username: r.get(1)?,
                    email: r.get(2)?,
                    display_name: r.get(3)?,
                    bio: r.get(4)?,
                    auth_type: r.get(5)?,
                    created_at: r.get(6)?,
                    piece_ids: Vec::new(),
                    outfit_ids: Vec::new(),
                    shelf_ids: Vec::new(),
                })
            },
        )
        .or_not_found()?;

    user.piece_ids = owned_ids(conn, "pieces", id)?;
    user.outfit_ids = owned_ids(conn, "outfits", id)?;
    user.shelf_ids = owned_ids(conn, "shelves", id)?;
    Ok(user)
}

fn owned_ids(conn: &Connection, table: &str, creator_id: &str) -> AppResult<Vec<String>> {
    // table is one of three literals above, never user input
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE creator_id = ?1 ORDER BY created_at, id",
        table
    ))?;
    let ids = stmt
        .query_map(params![creator_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}
