use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::db::is_constraint_violation;
use crate::db::models::{Shelf, ShelfItem, ShelfItemKind};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentUser};
use crate::state::AppState;
use crate::validate;
use crate::wardrobe::ensure_owner;

#[derive(Deserialize)]
pub struct CreateShelfRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateShelfRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub kind: String,
    pub item_id: String,
}

#[derive(Deserialize, Default)]
pub struct ShelfFilter {
    pub creator_id: Option<String>,
}

pub async fn create_shelf(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateShelfRequest>,
) -> AppResult<(StatusCode, Json<Shelf>)> {
    let name = validate::text("name", &req.name, 1, 100)?;
    let description = validate::optional_text("description", req.description.as_deref(), 500)?;

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO shelves (id, name, description, creator_id, creator_username)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, description, user.id, user.username],
    )?;

    Ok((StatusCode::CREATED, Json(load_shelf(&conn, &id)?)))
}

pub async fn list_shelves(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<ShelfFilter>,
) -> AppResult<Json<Vec<Shelf>>> {
    let conn = state.db.get()?;
    let ids: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT id FROM shelves WHERE ?1 IS NULL OR creator_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT 200",
        )?;
        let rows = stmt.query_map(params![filter.creator_id], |r| r.get(0))?;
        rows.collect::<Result<_, _>>()?
    };

    let shelves = ids
        .iter()
        .map(|id| load_shelf(&conn, id))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(shelves))
}

pub async fn get_shelf(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<Shelf>> {
    let conn = state.db.get()?;
    Ok(Json(load_shelf(&conn, &id)?))
}

pub async fn update_shelf(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<UpdateShelfRequest>,
) -> AppResult<Json<Shelf>> {
    let conn = state.db.get()?;
    ensure_owner(&conn, "shelves", &id, &user.id)?;

    let mut current = load_shelf(&conn, &id)?;
    if let Some(ref name) = req.name {
        current.name = validate::text("name", name, 1, 100)?;
    }
    if let Some(ref description) = req.description {
        current.description = validate::optional_text("description", Some(description), 500)?;
    }

    conn.execute(
        "UPDATE shelves SET name = ?1, description = ?2, updated_at = datetime('now')
         WHERE id = ?3",
        params![current.name, current.description, id],
    )?;

    Ok(Json(load_shelf(&conn, &id)?))
}

pub async fn delete_shelf(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    ensure_owner(&conn, "shelves", &id, &user.id)?;
    conn.execute("DELETE FROM shelves WHERE id = ?1", params![id])?;
    Ok(StatusCode::NO_CONTENT)
}

/// Append a piece or outfit to the end of the shelf.
pub async fn add_item(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<AddItemRequest>,
) -> AppResult<(StatusCode, Json<Shelf>)> {
    let kind: ShelfItemKind = validate::choice("kind", &req.kind)?;
    let conn = state.db.get()?;
    ensure_owner(&conn, "shelves", &id, &user.id)?;

    if !item_exists(&conn, kind, &req.item_id)? {
        return Err(AppError::bad_request(format!(
            "{} {} does not exist",
            kind, req.item_id
        )));
    }

    conn.execute(
        "INSERT INTO shelf_items (shelf_id, kind, item_id, position)
         VALUES (?1, ?2, ?3, COALESCE((SELECT MAX(position) + 1 FROM shelf_items WHERE shelf_id = ?1), 0))",
        params![id, kind, req.item_id],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::conflict(format!("{} is already on this shelf", kind))
        } else {
            e.into()
        }
    })?;
    conn.execute(
        "UPDATE shelves SET updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;

    Ok((StatusCode::CREATED, Json(load_shelf(&conn, &id)?)))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath((id, kind, item_id)): AppPath<(String, String, String)>,
) -> AppResult<Json<Shelf>> {
    let kind: ShelfItemKind = validate::choice("kind", &kind)?;
    let conn = state.db.get()?;
    ensure_owner(&conn, "shelves", &id, &user.id)?;

    let removed = conn.execute(
        "DELETE FROM shelf_items WHERE shelf_id = ?1 AND kind = ?2 AND item_id = ?3",
        params![id, kind, item_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    conn.execute(
        "UPDATE shelves SET updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;

    Ok(Json(load_shelf(&conn, &id)?))
}

// --- Query helpers ---

fn item_exists(conn: &Connection, kind: ShelfItemKind, item_id: &str) -> AppResult<bool> {
    let sql = match kind {
        ShelfItemKind::Piece => "SELECT COUNT(*) > 0 FROM pieces WHERE id = ?1",
        ShelfItemKind::Outfit => "SELECT COUNT(*) > 0 FROM outfits WHERE id = ?1",
    };
    Ok(conn.query_row(sql, params![item_id], |r| r.get(0))?)
}

pub(crate) fn load_shelf(conn: &Connection, id: &str) -> AppResult<Shelf> {
    let mut shelf = conn
        .query_row(
            "SELECT id, name, description, creator_id, creator_username, created_at, updated_at
             FROM shelves WHERE id = ?1",
            params![id],
            |r| {
                Ok(Shelf {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    description: r.get(2)?,
                    creator_id: r.get(3)?,
                    creator_username: r.get(4)?,
                    items: Vec::new(),
                    created_at: r.get(5)?,
                    updated_at: r.get(6)?,
                })
            },
        )
        .or_not_found()?;

    let mut stmt = conn.prepare_cached(
        "SELECT kind, item_id, added_at FROM shelf_items WHERE shelf_id = ?1 ORDER BY position",
    )?;
    shelf.items = stmt
        .query_map(params![id], |r| {
            Ok(ShelfItem {
                kind: r.get(0)?,
                item_id: r.get(1)?,
                added_at: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(shelf)
}
