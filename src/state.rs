use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::chat::ChatRoom;
use crate::config::{Config, Service};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub service: Service,
    pub db: DbPool,
    pub config: Config,
    /// Only the tickets service mounts the chat routes.
    pub chat: Arc<ChatRoom>,
}

impl AppState {
    pub fn new(service: Service, db: DbPool, config: Config) -> Self {
        let chat = Arc::new(ChatRoom::new(&config.chat));
        Self {
            service,
            db,
            config,
            chat,
        }
    }
}
