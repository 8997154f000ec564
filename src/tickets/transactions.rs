use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection, Row, TransactionBehavior};
use serde::Deserialize;

use crate::db::models::{Event, Transaction};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery};
use crate::state::AppState;
use crate::tickets::events::load_event;
use crate::tickets::{ensure_profile, quantity};

#[derive(Deserialize)]
pub struct CreateTransactionRequest {
    pub user_id: String,
    pub event_id: String,
    pub quantity: i64,
}

#[derive(Deserialize, Default)]
pub struct TransactionFilter {
    pub user_id: Option<String>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateTransactionRequest>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let quantity = quantity(req.quantity)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ensure_profile(&tx, &req.user_id)?;
    let event = load_event(&tx, &req.event_id).map_err(|e| match e {
        AppError::NotFound => AppError::bad_request(format!("event {} does not exist", req.event_id)),
        other => other,
    })?;
    let sale = sell(&tx, &req.user_id, &event, quantity)?;
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(sale)))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<TransactionFilter>,
) -> AppResult<Json<Vec<Transaction>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY created_at DESC, id DESC",
        TRANSACTION_COLUMNS
    ))?;
    let rows = stmt
        .query_map(params![filter.user_id], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(rows))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<Transaction>> {
    let conn = state.db.get()?;
    let row = conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS),
            params![id],
            transaction_from_row,
        )
        .or_not_found()?;
    Ok(Json(row))
}

/// Take `quantity` tickets off the event and record the sale. Callers run
/// this inside a transaction; an error leaves the caller to roll back.
pub(crate) fn sell(
    conn: &Connection,
    user_id: &str,
    event: &Event,
    quantity: i64,
) -> AppResult<Transaction> {
    let taken = conn.execute(
        "UPDATE events SET tickets_available = tickets_available - ?1, updated_at = datetime('now')
         WHERE id = ?2 AND tickets_available >= ?1",
        params![quantity, event.id],
    )?;
    if taken == 0 {
        let left: i64 = conn.query_row(
            "SELECT tickets_available FROM events WHERE id = ?1",
            params![event.id],
            |r| r.get(0),
        )?;
        return Err(AppError::conflict(format!(
            "only {} tickets left for '{}'",
            left, event.name
        )));
    }

    let total_cents = event
        .price_cents
        .checked_mul(quantity)
        .ok_or_else(|| AppError::bad_request("order total is too large"))?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO transactions (id, user_id, event_id, quantity, total_cents)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, event.id, quantity, total_cents],
    )?;

    tracing::info!(
        transaction_id = %id,
        %user_id,
        event_id = %event.id,
        quantity,
        total_cents,
        "Recorded sale"
    );

    conn.query_row(
        &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS),
        params![id],
        transaction_from_row,
    )
    .map_err(AppError::from)
}

const TRANSACTION_COLUMNS: &str = "id, user_id, event_id, quantity, total_cents, created_at";

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: r.get(0)?,
        user_id: r.get(1)?,
        event_id: r.get(2)?,
        quantity: r.get(3)?,
        total_cents: r.get(4)?,
        created_at: r.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Service;
    use crate::db::tests::test_pool;

    fn seed(conn: &Connection, tickets: i64) -> Event {
        conn.execute(
            "INSERT INTO profiles (id, username) VALUES ('u1', 'ann')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO events (id, name, venue, starts_at, price_cents, tickets_available)
             VALUES ('e1', 'Show', 'Hall', '2030-01-01T20:00:00+00:00', 2500, ?1)",
            params![tickets],
        )
        .unwrap();
        load_event(conn, "e1").unwrap()
    }

    #[test]
    fn sell_decrements_and_records_total() {
        let pool = test_pool(Service::Tickets);
        let conn = pool.get().unwrap();
        let event = seed(&conn, 5);

        let sale = sell(&conn, "u1", &event, 2).unwrap();
        assert_eq!(sale.total_cents, 5000);
        assert_eq!(sale.quantity, 2);
        assert_eq!(load_event(&conn, "e1").unwrap().tickets_available, 3);
    }

    #[test]
    fn sell_refuses_more_than_available() {
        let pool = test_pool(Service::Tickets);
        let conn = pool.get().unwrap();
        let event = seed(&conn, 1);

        match sell(&conn, "u1", &event, 2) {
            Err(AppError::Conflict(msg)) => assert!(msg.contains("only 1 tickets left")),
            other => panic!("unexpected {:?}", other.map(|t| t.id)),
        }
        assert_eq!(load_event(&conn, "e1").unwrap().tickets_available, 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
