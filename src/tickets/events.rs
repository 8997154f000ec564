use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Deserialize;

use crate::db::is_constraint_violation;
use crate::db::models::Event;
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery};
use crate::state::AppState;
use crate::validate;

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub venue: String,
    pub description: Option<String>,
    pub starts_at: String,
    pub price_cents: i64,
    pub tickets_available: i64,
    pub image_url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub venue: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<String>,
    pub price_cents: Option<i64>,
    pub tickets_available: Option<i64>,
    pub image_url: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct EventFilter {
    /// Only events starting at or after now.
    #[serde(default)]
    pub upcoming: bool,
}

/// Normalize to UTC RFC 3339 so string order is time order.
fn starts_at(value: &str) -> AppResult<String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339())
        .map_err(|_| AppError::bad_request("starts_at must be an RFC 3339 timestamp"))
}

fn non_negative(field: &str, value: i64) -> AppResult<i64> {
    if value < 0 {
        return Err(AppError::bad_request(format!("{} cannot be negative", field)));
    }
    Ok(value)
}

pub async fn create_event(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let name = validate::text("name", &req.name, 1, 120)?;
    let venue = validate::text("venue", &req.venue, 1, 120)?;
    let description = validate::optional_text("description", req.description.as_deref(), 2000)?;
    let starts_at = starts_at(&req.starts_at)?;
    let price_cents = non_negative("price_cents", req.price_cents)?;
    let tickets_available = non_negative("tickets_available", req.tickets_available)?;
    let image_url = validate::optional_link("image_url", req.image_url.as_deref())?;

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO events (id, name, venue, description, starts_at, price_cents, tickets_available, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            name,
            venue,
            description,
            starts_at,
            price_cents,
            tickets_available,
            image_url
        ],
    )?;

    tracing::info!(event_id = %id, %name, "Created event");
    Ok((StatusCode::CREATED, Json(load_event(&conn, &id)?)))
}

pub async fn list_events(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<EventFilter>,
) -> AppResult<Json<Vec<Event>>> {
    let conn = state.db.get()?;
    let from = if filter.upcoming {
        Some(Utc::now().to_rfc3339())
    } else {
        None
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM events WHERE ?1 IS NULL OR starts_at >= ?1 ORDER BY starts_at, id",
        EVENT_COLUMNS
    ))?;
    let events = stmt
        .query_map(params![from], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(events))
}

pub async fn get_event(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<Event>> {
    let conn = state.db.get()?;
    Ok(Json(load_event(&conn, &id)?))
}

pub async fn update_event(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<UpdateEventRequest>,
) -> AppResult<Json<Event>> {
    let conn = state.db.get()?;
    let mut event = load_event(&conn, &id)?;

    if let Some(ref name) = req.name {
        event.name = validate::text("name", name, 1, 120)?;
    }
    if let Some(ref venue) = req.venue {
        event.venue = validate::text("venue", venue, 1, 120)?;
    }
    if let Some(ref description) = req.description {
        event.description = validate::optional_text("description", Some(description), 2000)?;
    }
    if let Some(ref value) = req.starts_at {
        event.starts_at = starts_at(value)?;
    }
    if let Some(price) = req.price_cents {
        event.price_cents = non_negative("price_cents", price)?;
    }
    if let Some(tickets) = req.tickets_available {
        event.tickets_available = non_negative("tickets_available", tickets)?;
    }
    if let Some(ref url) = req.image_url {
        event.image_url = validate::optional_link("image_url", Some(url))?;
    }

    conn.execute(
        "UPDATE events SET name = ?1, venue = ?2, description = ?3, starts_at = ?4, price_cents = ?5,
                tickets_available = ?6, image_url = ?7, updated_at = datetime('now')
         WHERE id = ?8",
        params![
            event.name,
            event.venue,
            event.description,
            event.starts_at,
            event.price_cents,
            event.tickets_available,
            event.image_url,
            id
        ],
    )?;

    Ok(Json(load_event(&conn, &id)?))
}

/// Events with sales on record cannot be deleted.
pub async fn delete_event(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let removed = conn
        .execute("DELETE FROM events WHERE id = ?1", params![id])
        .map_err(|e| {
            if is_constraint_violation(&e) {
                AppError::conflict("event has purchases and cannot be deleted")
            } else {
                e.into()
            }
        })?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Query helpers ---

const EVENT_COLUMNS: &str = "id, name, venue, description, starts_at, price_cents, \
     tickets_available, image_url, created_at, updated_at";

fn event_from_row(r: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: r.get(0)?,
        name: r.get(1)?,
        venue: r.get(2)?,
        description: r.get(3)?,
        starts_at: r.get(4)?,
        price_cents: r.get(5)?,
        tickets_available: r.get(6)?,
        image_url: r.get(7)?,
        created_at: r.get(8)?,
        updated_at: r.get(9)?,
    })
}

pub(crate) fn load_event(conn: &Connection, id: &str) -> AppResult<Event> {
    conn.query_row(
        &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
        params![id],
        event_from_row,
    )
    .or_not_found()
}
