use std::{panic::resume_unwind, sync::Arc};

use rusqlite::Connection;
use tokio::{sync::Mutex, task::spawn_blocking};
use tracing::{info, warn};

use super::{config::Config, database::open, error::AppError};

pub struct State {
    pub config: Config,
    pub db: Mutex<Connection>,
}

impl State {
    pub fn new() -> Result<Arc<Self>, AppError> {
        let config = Config::load();
        let connection = open(&config.database_path)?;

        Ok(Self::with_connection(config, connection))
    }

    pub fn with_connection(config: Config, connection: Connection) -> Arc<Self> {
        Arc::new(Self {
            config,
            db: Mutex::new(connection),
        })
    }

    /// Runs `work` against the connection on the blocking pool, keeping SQLite off the async
    /// workers. A panic inside `work` resumes on the calling task.
    pub async fn run<T, F>(self: &Arc<Self>, work: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);

        match spawn_blocking(move || work(&mut state.db.blocking_lock())).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => resume_unwind(e.into_panic()),
            Err(e) => Err(AppError::Task(e)),
        }
    }

    /// Closes the database once no request holds the state anymore.
    pub fn close(self: Arc<Self>) -> Result<(), AppError> {
        match Arc::try_unwrap(self) {
            Ok(state) => {
                state
                    .db
                    .into_inner()
                    .close()
                    .map_err(|(_, e)| AppError::Database(e))?;
                info!("Database closed");
            }
            Err(_) => warn!("State still shared, leaving database to close on drop"),
        }

        Ok(())
    }
}
