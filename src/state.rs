use std::sync::Arc;

use crate::{config::AppConfig, db::OrmConn};

#[derive(Clone)]
pub struct AppState {
    pub orm: OrmConn,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(orm: OrmConn, config: AppConfig) -> Self {
        Self {
            orm,
            config: Arc::new(config),
        }
    }

    /// Raw sqlx pool behind the ORM connection, for hand-written queries.
    pub fn pool(&self) -> &sqlx::PgPool {
        self.orm.get_postgres_connection_pool()
    }
}
