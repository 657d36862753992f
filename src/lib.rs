pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod storage;
pub mod token;

pub use db::DbPool;

use config::Config;
use storage::ObjectStorage;
use token::TokenService;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub tokens: TokenService,
    pub storage: ObjectStorage,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let tokens = TokenService::new(&config.auth);
        let storage = ObjectStorage::new(&config.storage);
        Self {
            config,
            db,
            tokens,
            storage,
        }
    }
}
