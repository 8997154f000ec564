//! Ticketing service: events, user profiles with carts, transactions and
//! the global chat room.

pub mod chat;
pub mod events;
pub mod profiles;
pub mod transactions;

use axum::routing::{delete, get, post, put};
use axum::Router;
use rusqlite::{params, Connection};

use crate::error::{AppError, AppResult};
use crate::routes;
use crate::state::AppState;

const MAX_QUANTITY: i64 = 20;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/events",
            post(events::create_event).get(events::list_events),
        )
        .route(
            "/api/events/{id}",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/api/profiles",
            post(profiles::create_profile).get(profiles::find_profile),
        )
        .route(
            "/api/profiles/{id}",
            get(profiles::get_profile).delete(profiles::delete_profile),
        )
        .route(
            "/api/profiles/{id}/cart",
            put(profiles::set_cart_line).delete(profiles::clear_cart),
        )
        .route(
            "/api/profiles/{id}/cart/{event_id}",
            delete(profiles::remove_cart_line),
        )
        .route("/api/profiles/{id}/purchases", post(profiles::add_purchase))
        .route("/api/profiles/{id}/checkout", post(profiles::checkout))
        .route(
            "/api/transactions",
            post(transactions::create_transaction).get(transactions::list_transactions),
        )
        .route(
            "/api/transactions/{id}",
            get(transactions::get_transaction),
        )
        .route("/api/chat/history", get(chat::history))
        .route("/chat", get(chat::connect))
}

/// Ticket quantities per line are 1 to 20.
pub(crate) fn quantity(value: i64) -> AppResult<i64> {
    if !(1..=MAX_QUANTITY).contains(&value) {
        return Err(AppError::bad_request(format!(
            "quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }
    Ok(value)
}

pub(crate) fn ensure_profile(conn: &Connection, id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM profiles WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }
    Ok(())
}
