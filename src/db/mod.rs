pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::config::Service;
use crate::state::DbPool;

pub type Migration = (&'static str, &'static str);

pub const WARDROBE_MIGRATIONS: &[Migration] = &[
    (
        "001_initial",
        include_str!("../../migrations/wardrobe/001_initial.sql"),
    ),
    (
        "002_wardrobe",
        include_str!("../../migrations/wardrobe/002_wardrobe.sql"),
    ),
];

pub const TICKETS_MIGRATIONS: &[Migration] = &[(
    "001_initial",
    include_str!("../../migrations/tickets/001_initial.sql"),
)];

pub fn migrations_for(service: Service) -> &'static [Migration] {
    match service {
        Service::Wardrobe => WARDROBE_MIGRATIONS,
        Service::Tickets => TICKETS_MIGRATIONS,
    }
}

/// Per-connection settings. Foreign keys are off by default in SQLite and
/// the pragma only applies to the connection it runs on.
fn init_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool, service: Service) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in migrations_for(service) {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!(%service, "Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!(%service, "Database migrations complete");
    Ok(())
}

/// True when the error is a SQLite constraint violation (unique, foreign
/// key, check).
pub fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_pool(service: Service) -> DbPool {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder().max_size(1).build(manager).unwrap();
        run_migrations(&pool, service).unwrap();
        pool
    }

    fn table_names(pool: &DbPool) -> Vec<String> {
        let conn = pool.get().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn create_pool_creates_db_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.db");
        let pool = create_pool(&db_path).unwrap();
        assert!(db_path.exists());
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn wardrobe_migrations_create_tables() {
        let tables = table_names(&test_pool(Service::Wardrobe));
        for t in [
            "users",
            "sessions",
            "pieces",
            "piece_images",
            "outfits",
            "outfit_pieces",
            "outfit_tags",
            "shelves",
            "shelf_items",
        ] {
            assert!(tables.contains(&t.to_string()), "missing table {}", t);
        }
        assert!(!tables.contains(&"events".to_string()));
    }

    #[test]
    fn tickets_migrations_create_tables() {
        let tables = table_names(&test_pool(Service::Tickets));
        for t in ["events", "profiles", "cart_items", "purchases", "transactions"] {
            assert!(tables.contains(&t.to_string()), "missing table {}", t);
        }
        assert!(!tables.contains(&"pieces".to_string()));
    }

    #[test]
    fn migrations_are_idempotent() {
        let pool = test_pool(Service::Wardrobe);
        run_migrations(&pool, Service::Wardrobe).unwrap();

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, WARDROBE_MIGRATIONS.len() as i64);
    }

    #[test]
    fn foreign_keys_enforced() {
        let pool = test_pool(Service::Wardrobe);
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO pieces (id, name, kind, color, creator_id, creator_username)
             VALUES ('p1', 'Tee', 'top', 'white', 'nobody', 'nobody')",
            [],
        );
        let err = result.unwrap_err();
        assert!(is_constraint_violation(&err));
    }

    #[test]
    fn usernames_unique_only_among_active_users() {
        let pool = test_pool(Service::Wardrobe);
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, auth_type, password_hash, deleted_at)
             VALUES ('u1', 'alice', 'native', 'x', datetime('now'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO users (id, username, auth_type, password_hash)
             VALUES ('u2', 'alice', 'native', 'x')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO users (id, username, auth_type, password_hash)
             VALUES ('u3', 'alice', 'native', 'x')",
            [],
        );
        assert!(dup.is_err());
    }

    #[test]
    fn native_users_require_password_hash() {
        let pool = test_pool(Service::Wardrobe);
        let conn = pool.get().unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, username, auth_type) VALUES ('u1', 'bob', 'native')",
            [],
        );
        assert!(result.is_err());
    }
}
