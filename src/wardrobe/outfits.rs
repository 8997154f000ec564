use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, Connection};
use serde::Deserialize;
use std::collections::HashSet;

use crate::db::models::{Outfit, OutfitTag, ShelfItemKind};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentUser};
use crate::state::AppState;
use crate::validate;
use crate::wardrobe::ensure_owner;
use crate::wardrobe::pieces::{load_images, piece_from_row, PIECE_COLUMNS};

const MAX_PIECES: usize = 20;

#[derive(Deserialize)]
pub struct CreateOutfitRequest {
    pub name: String,
    #[serde(default)]
    pub piece_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateOutfitRequest {
    pub name: Option<String>,
    pub piece_ids: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct AddPieceRequest {
    pub piece_id: String,
}

#[derive(Deserialize, Default)]
pub struct OutfitFilter {
    pub creator_id: Option<String>,
}

fn validate_tags(tags: &[String]) -> AppResult<Vec<OutfitTag>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in tags {
        let tag: OutfitTag = validate::choice("tags", raw)?;
        if seen.insert(tag) {
            out.push(tag);
        }
    }
    Ok(out)
}

/// Piece list must be duplicate-free, bounded, and point at real pieces.
fn validate_piece_ids(conn: &Connection, ids: &[String]) -> AppResult<()> {
    if ids.len() > MAX_PIECES {
        return Err(AppError::bad_request(format!(
            "an outfit can have at most {} pieces",
            MAX_PIECES
        )));
    }
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(AppError::bad_request(format!(
                "piece {} is listed more than once",
                id
            )));
        }
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pieces WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        if !exists {
            return Err(AppError::bad_request(format!("piece {} does not exist", id)));
        }
    }
    Ok(())
}

// --- Handlers ---

pub async fn create_outfit(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreateOutfitRequest>,
) -> AppResult<(StatusCode, Json<Outfit>)> {
    let name = validate::text("name", &req.name, 1, 100)?;
    let tags = validate_tags(&req.tags)?;

    let mut conn = state.db.get()?;
    validate_piece_ids(&conn, &req.piece_ids)?;

    let id = uuid::Uuid::now_v7().to_string();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO outfits (id, name, creator_id, creator_username) VALUES (?1, ?2, ?3, ?4)",
        params![id, name, user.id, user.username],
    )?;
    replace_pieces(&tx, &id, &req.piece_ids)?;
    replace_tags(&tx, &id, &tags)?;
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(load_outfit(&conn, &id)?)))
}

pub async fn list_outfits(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<OutfitFilter>,
) -> AppResult<Json<Vec<Outfit>>> {
    let conn = state.db.get()?;
    let ids: Vec<String> = match filter.creator_id {
        Some(creator_id) => {
            let mut stmt = conn.prepare(
                "SELECT id FROM outfits WHERE creator_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 200",
            )?;
            let rows = stmt.query_map(params![creator_id], |r| r.get(0))?;
            rows.collect::<Result<_, _>>()?
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT id FROM outfits ORDER BY created_at DESC, id DESC LIMIT 200")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect::<Result<_, _>>()?
        }
    };

    let outfits = ids
        .iter()
        .map(|id| load_outfit(&conn, id))
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(outfits))
}

pub async fn get_outfit(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<Outfit>> {
    let conn = state.db.get()?;
    Ok(Json(load_outfit(&conn, &id)?))
}

pub async fn update_outfit(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<UpdateOutfitRequest>,
) -> AppResult<Json<Outfit>> {
    let mut conn = state.db.get()?;
    ensure_owner(&conn, "outfits", &id, &user.id)?;

    let name = req
        .name
        .as_deref()
        .map(|n| validate::text("name", n, 1, 100))
        .transpose()?;
    let tags = req.tags.as_deref().map(validate_tags).transpose()?;
    if let Some(ref piece_ids) = req.piece_ids {
        validate_piece_ids(&conn, piece_ids)?;
    }

    let tx = conn.transaction()?;
    if let Some(name) = name {
        tx.execute(
            "UPDATE outfits SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
    }
    if let Some(ref piece_ids) = req.piece_ids {
        replace_pieces(&tx, &id, piece_ids)?;
    }
    if let Some(tags) = tags {
        replace_tags(&tx, &id, &tags)?;
    }
    touch(&tx, &id)?;
    tx.commit()?;

    Ok(Json(load_outfit(&conn, &id)?))
}

pub async fn add_piece(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<AddPieceRequest>,
) -> AppResult<Json<Outfit>> {
    let conn = state.db.get()?;
    ensure_owner(&conn, "outfits", &id, &user.id)?;

    let mut piece_ids = piece_ids(&conn, &id)?;
    if piece_ids.contains(&req.piece_id) {
        return Err(AppError::conflict("piece is already in this outfit"));
    }
    piece_ids.push(req.piece_id.clone());
    validate_piece_ids(&conn, &piece_ids)?;

    conn.execute(
        "INSERT INTO outfit_pieces (outfit_id, piece_id, position)
         VALUES (?1, ?2, COALESCE((SELECT MAX(position) + 1 FROM outfit_pieces WHERE outfit_id = ?1), 0))",
        params![id, req.piece_id],
    )?;
    touch(&conn, &id)?;

    Ok(Json(load_outfit(&conn, &id)?))
}

pub async fn remove_piece(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath((id, piece_id)): AppPath<(String, String)>,
) -> AppResult<Json<Outfit>> {
    let conn = state.db.get()?;
    ensure_owner(&conn, "outfits", &id, &user.id)?;

    let removed = conn.execute(
        "DELETE FROM outfit_pieces WHERE outfit_id = ?1 AND piece_id = ?2",
        params![id, piece_id],
    )?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    touch(&conn, &id)?;

    Ok(Json(load_outfit(&conn, &id)?))
}

pub async fn delete_outfit(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<StatusCode> {
    let mut conn = state.db.get()?;
    ensure_owner(&conn, "outfits", &id, &user.id)?;

    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM shelf_items WHERE kind = ?1 AND item_id = ?2",
        params![ShelfItemKind::Outfit, id],
    )?;
    tx.execute("DELETE FROM outfits WHERE id = ?1", params![id])?;
    tx.commit()?;

    Ok(StatusCode::NO_CONTENT)
}

// --- Query helpers ---

fn touch(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE outfits SET updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

fn piece_ids(conn: &Connection, outfit_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT piece_id FROM outfit_pieces WHERE outfit_id = ?1 ORDER BY position")?;
    let ids = stmt
        .query_map(params![outfit_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

fn replace_pieces(conn: &Connection, outfit_id: &str, piece_ids: &[String]) -> AppResult<()> {
    conn.execute(
        "DELETE FROM outfit_pieces WHERE outfit_id = ?1",
        params![outfit_id],
    )?;
    for (position, piece_id) in piece_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO outfit_pieces (outfit_id, piece_id, position) VALUES (?1, ?2, ?3)",
            params![outfit_id, piece_id, position as i64],
        )?;
    }
    Ok(())
}

fn replace_tags(conn: &Connection, outfit_id: &str, tags: &[OutfitTag]) -> AppResult<()> {
    conn.execute("DELETE FROM outfit_tags WHERE outfit_id = ?1", params![outfit_id])?;
    for tag in tags {
        conn.execute(
            "INSERT INTO outfit_tags (outfit_id, tag) VALUES (?1, ?2)",
            params![outfit_id, tag],
        )?;
    }
    Ok(())
}

/// Load an outfit with its pieces resolved in outfit order.
pub(crate) fn load_outfit(conn: &Connection, id: &str) -> AppResult<Outfit> {
    let mut outfit = conn
        .query_row(
            "SELECT id, name, creator_id, creator_username, created_at, updated_at
             FROM outfits WHERE id = ?1",
            params![id],
            |r| {
                Ok(Outfit {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    creator_id: r.get(2)?,
                    creator_username: r.get(3)?,
                    tags: Vec::new(),
                    pieces: Vec::new(),
                    created_at: r.get(4)?,
                    updated_at: r.get(5)?,
                })
            },
        )
        .or_not_found()?;

    let mut stmt = conn.prepare_cached("SELECT tag FROM outfit_tags WHERE outfit_id = ?1")?;
    let mut tags = stmt
        .query_map(params![id], |r| r.get::<_, OutfitTag>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    // Stable output order regardless of insertion.
    tags.sort_by_key(|t| OutfitTag::ALL.iter().position(|x| x == t));
    outfit.tags = tags;

    let columns = PIECE_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM outfit_pieces op JOIN pieces p ON p.id = op.piece_id
         WHERE op.outfit_id = ?1 ORDER BY op.position",
        columns
    ))?;
    let mut pieces = stmt
        .query_map(params![id], piece_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for piece in &mut pieces {
        piece.images = load_images(conn, &piece.id)?;
    }
    outfit.pieces = pieces;

    Ok(outfit)
}
