//! Wardrobe service: accounts, pieces, outfits, shelves and image uploads.

pub mod images;
pub mod outfits;
pub mod pieces;
pub mod shelves;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use rusqlite::{params, Connection};

use crate::config::Config;
use crate::error::{AppError, AppResult, OptionalRow};
use crate::routes;
use crate::state::AppState;

pub fn router(config: &Config) -> Router<AppState> {
    // Multipart framing needs headroom above the file itself.
    let upload_limit = config.storage.max_upload_bytes + 64 * 1024;

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/users", post(users::signup).get(users::find_user))
        .route("/api/users/login", post(users::login))
        .route("/api/users/oauth", post(users::oauth_login))
        .route("/api/users/logout", post(users::logout))
        .route("/api/users/me", get(users::me))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/api/pieces",
            post(pieces::create_piece).get(pieces::list_pieces),
        )
        .route(
            "/api/pieces/{id}",
            get(pieces::get_piece)
                .patch(pieces::update_piece)
                .delete(pieces::delete_piece),
        )
        .route(
            "/api/outfits",
            post(outfits::create_outfit).get(outfits::list_outfits),
        )
        .route(
            "/api/outfits/{id}",
            get(outfits::get_outfit)
                .patch(outfits::update_outfit)
                .delete(outfits::delete_outfit),
        )
        .route("/api/outfits/{id}/pieces", post(outfits::add_piece))
        .route(
            "/api/outfits/{id}/pieces/{piece_id}",
            delete(outfits::remove_piece),
        )
        .route(
            "/api/shelves",
            post(shelves::create_shelf).get(shelves::list_shelves),
        )
        .route(
            "/api/shelves/{id}",
            get(shelves::get_shelf)
                .patch(shelves::update_shelf)
                .delete(shelves::delete_shelf),
        )
        .route("/api/shelves/{id}/items", post(shelves::add_item))
        .route(
            "/api/shelves/{id}/items/{kind}/{item_id}",
            delete(shelves::remove_item),
        )
        .route(
            "/api/images",
            post(images::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/uploads/{file}", get(images::serve_upload))
}

/// 404 when the document is missing, 403 when someone else created it.
pub(crate) fn ensure_owner(
    conn: &Connection,
    table: &str,
    id: &str,
    user_id: &str,
) -> AppResult<()> {
    // table is always a literal from this module's handlers
    let creator_id: String = conn
        .query_row(
            &format!("SELECT creator_id FROM {} WHERE id = ?1", table),
            params![id],
            |r| r.get(0),
        )
        .or_not_found()?;

    if creator_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}
