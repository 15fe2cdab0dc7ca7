//! # SQLite
//!
//! Single file database holding every restaurant and its lookups.
//!
//! ## Schema
//! - `restaurants`: one row per restaurant, scalar fields only
//! - `cuisines`, `types`, `neighborhoods`, `tags`: unique names, tags also carry a color
//! - `restaurant_cuisines`, `restaurant_types`, `restaurant_neighborhoods`, `restaurant_tags`:
//!   pure pairs keyed by `(restaurant_id, lookup_id)` so a link can never be stored twice
//! - `scratchpad`: a single note under the `main` key
//!
//! ## Upgrades
//! Older databases predate the structured happy hour and map columns. Opening one adds the
//! missing columns in place, nothing is rewritten. Reshaping the legacy text lives in the
//! `migrate` crate.
use std::{path::Path, time::Duration};

use rusqlite::{Connection, params};
use tracing::info;

use crate::{
    error::AppError,
    models::{Category, DEFAULT_TAG_COLOR},
};

pub const SCRATCHPAD_ID: &str = "main";

const RESTAURANTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS restaurants (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        neighborhood TEXT,
        borough TEXT,
        status TEXT DEFAULT 'Unvisited',
        liked INTEGER NOT NULL DEFAULT 0,
        happy_hour TEXT,
        happy_hour_start_time TEXT,
        happy_hour_end_time TEXT,
        happy_hour_data TEXT,
        has_happy_hour INTEGER NOT NULL DEFAULT 0,
        notes TEXT,
        what_to_order TEXT,
        website_link TEXT,
        latitude REAL,
        longitude REAL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_restaurants_name ON restaurants(name);
";

const SCRATCHPAD_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS scratchpad (
        id TEXT PRIMARY KEY,
        content TEXT NOT NULL DEFAULT '',
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
";

/// Columns introduced after the first release, added to older files on open.
const ADDED_COLUMNS: [(&str, &str); 7] = [
    ("happy_hour_data", "TEXT"),
    ("has_happy_hour", "INTEGER NOT NULL DEFAULT 0"),
    ("what_to_order", "TEXT"),
    ("website_link", "TEXT"),
    ("latitude", "REAL"),
    ("longitude", "REAL"),
    ("updated_at", "TEXT"),
];

pub fn open(path: impl AsRef<Path>) -> Result<Connection, AppError> {
    let path = path.as_ref();
    info!("Opening database at {}", path.display());

    let connection = Connection::open(path)?;
    prepare(connection)
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(connection: Connection) -> Result<Connection, AppError> {
    connection.busy_timeout(Duration::from_secs(5))?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    init_schema(&connection)?;

    Ok(connection)
}

pub fn init_schema(connection: &Connection) -> Result<(), AppError> {
    connection.execute_batch(RESTAURANTS_TABLE)?;

    for (column, definition) in ADDED_COLUMNS {
        ensure_column(connection, "restaurants", column, definition)?;
    }

    for category in Category::ALL {
        connection.execute_batch(&lookup_table_sql(category))?;
        connection.execute_batch(&join_table_sql(category))?;
    }

    connection.execute_batch(SCRATCHPAD_TABLE)?;
    connection.execute(
        "INSERT OR IGNORE INTO scratchpad (id, content) VALUES (?1, '')",
        params![SCRATCHPAD_ID],
    )?;

    Ok(())
}

fn lookup_table_sql(category: Category) -> String {
    let color = match category {
        Category::Tags => format!(", color TEXT DEFAULT '{DEFAULT_TAG_COLOR}'"),
        _ => String::new(),
    };

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE{color}
        );",
        table = category.lookup_table(),
    )
}

fn join_table_sql(category: Category) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {join} (
            restaurant_id INTEGER NOT NULL REFERENCES restaurants(id),
            {fk} INTEGER NOT NULL REFERENCES {table}(id),
            PRIMARY KEY (restaurant_id, {fk})
        );
        CREATE INDEX IF NOT EXISTS idx_{join}_{fk} ON {join}({fk});",
        join = category.join_table(),
        fk = category.foreign_key(),
        table = category.lookup_table(),
    )
}

fn ensure_column(
    connection: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), AppError> {
    let mut statement = connection.prepare(&format!("PRAGMA table_info({table})"))?;
    let exists = statement
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .any(|name| name == column);

    if !exists {
        info!("Adding column {table}.{column}");
        connection.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {column} {definition};"
        ))?;
    }

    Ok(())
}

/// Returns the id for `name`, creating the lookup row when it does not exist yet.
pub fn ensure_lookup(
    connection: &Connection,
    category: Category,
    name: &str,
) -> Result<i64, AppError> {
    let table = category.lookup_table();

    connection
        .prepare_cached(&format!("INSERT OR IGNORE INTO {table} (name) VALUES (?1)"))?
        .execute(params![name])?;

    let id = connection
        .prepare_cached(&format!("SELECT id FROM {table} WHERE name = ?1"))?
        .query_row(params![name], |row| row.get(0))?;

    Ok(id)
}

/// Links a restaurant to a lookup row, ignoring a link that already exists.
pub fn link(
    connection: &Connection,
    category: Category,
    restaurant_id: i64,
    lookup_id: i64,
) -> Result<(), AppError> {
    connection
        .prepare_cached(&format!(
            "INSERT OR IGNORE INTO {} (restaurant_id, {}) VALUES (?1, ?2)",
            category.join_table(),
            category.foreign_key()
        ))?
        .execute(params![restaurant_id, lookup_id])?;

    Ok(())
}

pub fn count_rows(connection: &Connection, table: &str) -> Result<i64, AppError> {
    Ok(connection.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?)
}
