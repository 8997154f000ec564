use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::Deserialize;

use crate::db::models::{Color, Piece, PieceKind, ShelfItemKind};
use crate::error::{AppError, AppResult, OptionalRow};
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentUser};
use crate::state::AppState;
use crate::validate;
use crate::wardrobe::ensure_owner;

const MAX_IMAGES: usize = 10;
const LIST_LIMIT: usize = 200;

#[derive(Deserialize)]
pub struct CreatePieceRequest {
    pub name: String,
    pub kind: String,
    pub color: String,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
    pub purchase_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdatePieceRequest {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub color: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub notes: Option<String>,
    pub purchase_url: Option<String>,
    /// Replaces the whole image list when present.
    pub images: Option<Vec<String>>,
}

#[derive(Deserialize, Default)]
pub struct PieceFilter {
    pub creator_id: Option<String>,
    pub kind: Option<String>,
    pub color: Option<String>,
}

/// A create request after validation.
struct NewPiece {
    name: String,
    kind: PieceKind,
    color: Color,
    brand: Option<String>,
    size: Option<String>,
    notes: Option<String>,
    purchase_url: Option<String>,
    images: Vec<String>,
}

impl CreatePieceRequest {
    fn validate(&self) -> AppResult<NewPiece> {
        Ok(NewPiece {
            name: validate::text("name", &self.name, 1, 100)?,
            kind: validate::choice("kind", &self.kind)?,
            color: validate::choice("color", &self.color)?,
            brand: validate::optional_text("brand", self.brand.as_deref(), 60)?,
            size: validate::optional_text("size", self.size.as_deref(), 20)?,
            notes: validate::optional_text("notes", self.notes.as_deref(), 500)?,
            purchase_url: validate::optional_link("purchase_url", self.purchase_url.as_deref())?,
            images: validate_images(&self.images)?,
        })
    }
}

fn validate_images(images: &[String]) -> AppResult<Vec<String>> {
    if images.len() > MAX_IMAGES {
        return Err(AppError::bad_request(format!(
            "a piece can have at most {} images",
            MAX_IMAGES
        )));
    }
    images.iter().map(|url| validate::link("images", url)).collect()
}

// --- Handlers ---

pub async fn create_piece(
    State(state): State<AppState>,
    user: CurrentUser,
    AppJson(req): AppJson<CreatePieceRequest>,
) -> AppResult<(StatusCode, Json<Piece>)> {
    let new = req.validate()?;
    let id = uuid::Uuid::now_v7().to_string();

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO pieces (id, name, kind, color, brand, size, notes, purchase_url, creator_id, creator_username)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            new.name,
            new.kind,
            new.color,
            new.brand,
            new.size,
            new.notes,
            new.purchase_url,
            user.id,
            user.username,
        ],
    )?;
    replace_images(&tx, &id, &new.images)?;
    tx.commit()?;

    tracing::debug!(piece_id = %id, creator = %user.username, "Created piece");
    Ok((StatusCode::CREATED, Json(load_piece(&conn, &id)?)))
}

pub async fn list_pieces(
    State(state): State<AppState>,
    AppQuery(filter): AppQuery<PieceFilter>,
) -> AppResult<Json<Vec<Piece>>> {
    let mut clauses = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(creator_id) = filter.creator_id {
        values.push(creator_id);
        clauses.push(format!("creator_id = ?{}", values.len()));
    }
    if let Some(kind) = filter.kind {
        let kind: PieceKind = validate::choice("kind", &kind)?;
        values.push(kind.as_str().to_string());
        clauses.push(format!("kind = ?{}", values.len()));
    }
    if let Some(color) = filter.color {
        let color: Color = validate::choice("color", &color)?;
        values.push(color.as_str().to_string());
        clauses.push(format!("color = ?{}", values.len()));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM pieces {} ORDER BY created_at DESC, id DESC LIMIT {}",
        PIECE_COLUMNS, where_clause, LIST_LIMIT
    );

    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let mut pieces = stmt
        .query_map(params_from_iter(values.iter()), piece_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for piece in &mut pieces {
        piece.images = load_images(&conn, &piece.id)?;
    }

    Ok(Json(pieces))
}

pub async fn get_piece(
    State(state): State<AppState>,
    AppPath(id): AppPath<String>,
) -> AppResult<Json<Piece>> {
    let conn = state.db.get()?;
    Ok(Json(load_piece(&conn, &id)?))
}

pub async fn update_piece(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
    AppJson(req): AppJson<UpdatePieceRequest>,
) -> AppResult<Json<Piece>> {
    let mut conn = state.db.get()?;
    ensure_owner(&conn, "pieces", &id, &user.id)?;
    let mut current = load_piece(&conn, &id)?;

    if let Some(ref name) = req.name {
        current.name = validate::text("name", name, 1, 100)?;
    }
    if let Some(ref kind) = req.kind {
        current.kind = validate::choice("kind", kind)?;
    }
    if let Some(ref color) = req.color {
        current.color = validate::choice("color", color)?;
    }
    if let Some(ref brand) = req.brand {
        current.brand = validate::optional_text("brand", Some(brand), 60)?;
    }
    if let Some(ref size) = req.size {
        current.size = validate::optional_text("size", Some(size), 20)?;
    }
    if let Some(ref notes) = req.notes {
        current.notes = validate::optional_text("notes", Some(notes), 500)?;
    }
    if let Some(ref url) = req.purchase_url {
        current.purchase_url = validate::optional_link("purchase_url", Some(url))?;
    }
    let images = req.images.as_deref().map(validate_images).transpose()?;

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE pieces SET name = ?1, kind = ?2, color = ?3, brand = ?4, size = ?5, notes = ?6,
                purchase_url = ?7, updated_at = datetime('now')
         WHERE id = ?8",
        params![
            current.name,
            current.kind,
            current.color,
            current.brand,
            current.size,
            current.notes,
            current.purchase_url,
            id,
        ],
    )?;
    if let Some(images) = images {
        replace_images(&tx, &id, &images)?;
    }
    tx.commit()?;

    Ok(Json(load_piece(&conn, &id)?))
}

/// Deleting a piece also pulls it out of every outfit and shelf.
pub async fn delete_piece(
    State(state): State<AppState>,
    user: CurrentUser,
    AppPath(id): AppPath<String>,
) -> AppResult<StatusCode> {
    let mut conn = state.db.get()?;
    ensure_owner(&conn, "pieces", &id, &user.id)?;

    let tx = conn.transaction()?;
    let shelf_refs = tx.execute(
        "DELETE FROM shelf_items WHERE kind = ?1 AND item_id = ?2",
        params![ShelfItemKind::Piece, id],
    )?;
    tx.execute("DELETE FROM pieces WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::debug!(piece_id = %id, shelf_refs, "Deleted piece");
    Ok(StatusCode::NO_CONTENT)
}

// --- Query helpers ---

pub(crate) const PIECE_COLUMNS: &str = "id, name, kind, color, brand, size, notes, purchase_url, \
     creator_id, creator_username, created_at, updated_at";

/// Map a row selected with [`PIECE_COLUMNS`]. Images are filled in separately.
pub(crate) fn piece_from_row(r: &Row<'_>) -> rusqlite::Result<Piece> {
    Ok(Piece {
        id: r.get(0)?,
        name: r.get(1)?,
        kind: r.get(2)?,
        color: r.get(3)?,
        brand: r.get(4)?,
        size: r.get(5)?,
        notes: r.get(6)?,
        purchase_url: r.get(7)?,
        images: Vec::new(),
        creator_id: r.get(8)?,
        creator_username: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

pub(crate) fn load_piece(conn: &Connection, id: &str) -> AppResult<Piece> {
    let mut piece = conn
        .query_row(
            &format!("SELECT {} FROM pieces WHERE id = ?1", PIECE_COLUMNS),
            params![id],
            piece_from_row,
        )
        .or_not_found()?;
    piece.images = load_images(conn, id)?;
    Ok(piece)
}

pub(crate) fn load_images(conn: &Connection, piece_id: &str) -> AppResult<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT url FROM piece_images WHERE piece_id = ?1 ORDER BY position")?;
    let urls = stmt
        .query_map(params![piece_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(urls)
}

fn replace_images(conn: &Connection, piece_id: &str, images: &[String]) -> AppResult<()> {
    conn.execute("DELETE FROM piece_images WHERE piece_id = ?1", params![piece_id])?;
    for (position, url) in images.iter().enumerate() {
        conn.execute(
            "INSERT INTO piece_images (piece_id, position, url) VALUES (?1, ?2, ?3)",
            params![piece_id, position as i64, url],
        )?;
    }
    Ok(())
}
