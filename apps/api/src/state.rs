//! Shared application state, cloned into every handler.

use std::sync::Arc;

use tally_core::PermissionTable;
use tally_db::Database;

use crate::auth::JwtManager;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub jwt: Arc<JwtManager>,
    /// Built once at startup from the defaults and the config overrides.
    pub permissions: Arc<PermissionTable>,
}

impl AppState {
    pub fn new(db: Database, jwt: JwtManager, permissions: PermissionTable) -> Self {
        AppState {
            db,
            jwt: Arc::new(jwt),
            permissions: Arc::new(permissions),
        }
    }
}
