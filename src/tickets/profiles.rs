use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::is_constraint_violation;
use crate::db::models::{CartItem, PurchasedItem, Transaction, UserProfile};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery};
use crate::state::AppState;
use crate::tickets::events::load_event;
use crate::tickets::transactions::sell;
use crate::tickets::{ensure_profile, quantity};
use crate::validate;

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub username: String,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct ProfileLookup {
    pub username: String,
}

#[derive(Deserialize)]
pub struct LineRequest {
    pub event_id: String,
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub profile: UserProfile,
    pub transactions: Vec<Transaction>,
    pub total_cents: i64,
}

pub async fn create_profile(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateProfileRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let username = validate::username(&req.username)?;
    let email = validate::email(req.email.as_deref())?;

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO profiles (id, username, email) VALUES (?1, ?2, ?3)",
        params![id, username, email],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::conflict(format!("username '{}' is already taken", username))
        } else {
            e.into()
        }
    })?;

    Ok((StatusCode::CREATED, Json(load_profile(&conn, &id)?)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    Ok(Json(load_profile(&conn, &id)?))
}

pub async fn find_profile(
    State(state): State<AppState>,
    AppQuery(lookup): AppQuery<ProfileLookup>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    let id: String = conn
        .query_row(
            "SELECT id FROM profiles WHERE username = ?1",
            params![lookup.username.trim()],
            |r| r.get(0),
        )
        .or_not_found()?;
    Ok(Json(load_profile(&conn, &id)?))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    if conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Set one cart line. Quantity 0 removes it.
pub async fn set_cart_line(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<LineRequest>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    ensure_profile(&conn, &id)?;

    if req.quantity == 0 {
        conn.execute(
            "DELETE FROM cart_items WHERE profile_id = ?1 AND event_id = ?2",
            params![id, req.event_id],
        )?;
        return Ok(Json(load_profile(&conn, &id)?));
    }

    let quantity = quantity(req.quantity)?;
    ensure_event(&conn, &req.event_id)?;
    conn.execute(
        "INSERT INTO cart_items (profile_id, event_id, quantity) VALUES (?1, ?2, ?3)
         ON CONFLICT(profile_id, event_id) DO UPDATE SET quantity = excluded.quantity",
        params![id, req.event_id, quantity],
    )?;

    Ok(Json(load_profile(&conn, &id)?))
}

pub async fn remove_cart_line(
    State(state): State<AppState>,
    AppPath((id, event_id)): AppPath<(String, String)>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    ensure_profile(&conn, &id)?;
    let removed = conn.execute(
        "DELETE FROM cart_items WHERE profile_id = ?1 AND event_id = ?2",
        params![id, event_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(load_profile(&conn, &id)?))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<UserProfile>> {
    let conn = state.db.get()?;
    ensure_profile(&conn, &id)?;
    conn.execute("DELETE FROM cart_items WHERE profile_id = ?1", params![id])?;
    Ok(Json(load_profile(&conn, &id)?))
}

/// Append a purchased line without touching tickets or transactions.
pub async fn add_purchase(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<LineRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let quantity = quantity(req.quantity)?;
    let conn = state.db.get()?;
    ensure_profile(&conn, &id)?;
    ensure_event(&conn, &req.event_id)?;
    insert_purchase(&conn, &id, &req.event_id, quantity)?;
    Ok((StatusCode::CREATED, Json(load_profile(&conn, &id)?)))
}

/// Buy everything in the cart or nothing: tickets, transactions, purchased
/// lines and the emptied cart commit together.
pub async fn checkout(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<(StatusCode, Json<CheckoutResponse>)> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_profile(&tx, &id)?;

    let cart = load_cart(&tx, &id)?;
    if cart.is_empty() {
        return Err(AppError::bad_request("cart is empty"));
    }

    let mut transactions = Vec::with_capacity(cart.len());
    for line in &cart {
        let event = load_event(&tx, &line.event_id)?;
        let sale = sell(&tx, &id, &event, line.quantity)?;
        insert_purchase(&tx, &id, &line.event_id, line.quantity)?;
        transactions.push(sale);
    }
    tx.execute("DELETE FROM cart_items WHERE profile_id = ?1", params![id])?;
    tx.commit()?;

    let total_cents: i64 = transactions.iter().map(|t| t.total_cents).sum();
    tracing::info!(profile_id = %id, lines = transactions.len(), total_cents, "Checked out");

    let profile = load_profile(&conn, &id)?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            profile,
            transactions,
            total_cents,
        }),
    ))
}

// --- Query helpers ---

fn ensure_event(conn: &Connection, event_id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM events WHERE id = ?1",
        params![event_id],
        |r| r.get(0),
    )?;
    if !exists {
        return Err(AppError::bad_request(format!(
            "event {} does not exist",
            event_id
        )));
    }
    Ok(())
}

fn insert_purchase(conn: &Connection, profile_id: &str, event_id: &str, quantity: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO purchases (id, profile_id, event_id, quantity) VALUES (?1, ?2, ?3, ?4)",
        params![uuid::Uuid::now_v7().to_string(), profile_id, event_id, quantity],
    )?;
    Ok(())
}

fn load_cart(conn: &Connection, profile_id: &str) -> AppResult<Vec<CartItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT event_id, quantity FROM cart_items WHERE profile_id = ?1 ORDER BY added_at, rowid",
    )?;
    let items = stmt
        .query_map(params![profile_id], |r| {
            Ok(CartItem {
                event_id: r.get(0)?,
                quantity: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub(crate) fn load_profile(conn: &Connection, id: &str) -> AppResult<UserProfile> {
    let mut profile = conn
        .query_row(
            "SELECT id, username, email, created_at FROM profiles WHERE id = ?1",
            params![id],
            |r| {
                Ok(UserProfile {
                    id: r.get(0)?,
                    username: r.get(1)?,
                    email: r.get(2)?,
                    cart: Vec::new(),
                    purchased: Vec::new(),
                    created_at: r.get(3)?,
                })
            },
        )
        .or_not_found()?;

    profile.cart = load_cart(conn, id)?;

    let mut stmt = conn.prepare_cached(
        "SELECT id, event_id, quantity, purchased_at FROM purchases
         WHERE profile_id = ?1 ORDER BY purchased_at, id",
    )?;
    profile.purchased = stmt
        .query_map(params![id], |r| {
            Ok(PurchasedItem {
                id: r.get(0)?,
                event_id: r.get(1)?,
                quantity: r.get(2)?,
                purchased_at: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(profile)
}
