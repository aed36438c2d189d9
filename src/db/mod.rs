pub mod tables;

use redb::{Database, Error as RedbError, ReadableTable, Table};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Database handle type (Arc-wrapped for sharing across handlers)
pub type Db = Arc<Database>;

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// Open or create the redb database at the given path
///
/// Creates all required tables on first run.
#[allow(clippy::result_large_err)]
pub fn open_database(path: impl AsRef<Path>) -> std::result::Result<Db, RedbError> {
    tracing::info!("Opening database at: {:?}", path.as_ref());

    // Create parent directory if it doesn't exist
    if let Some(parent) = path.as_ref().parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            tracing::error!("Failed to create database directory: {}", e);
            RedbError::Io(e)
        })?;
    }

    let db = Database::create(path)?;
    create_tables(&db)?;

    tracing::info!("Database initialized successfully");

    Ok(Arc::new(db))
}

/// Open every table once so later read transactions never hit a missing table
#[allow(clippy::result_large_err)]
pub fn create_tables(db: &Database) -> std::result::Result<(), RedbError> {
    let write_txn = db.begin_write()?;
    {
        let _ = write_txn.open_table(tables::PROFILES)?;
        let _ = write_txn.open_table(tables::IDENTITIES)?;
        let _ = write_txn.open_table(tables::ENTRIES)?;
        let _ = write_txn.open_table(tables::PUBLISHED)?;
        let _ = write_txn.open_table(tables::MOODS)?;
        let _ = write_txn.open_table(tables::TAGS)?;
        let _ = write_txn.open_table(tables::RATE_LIMITS)?;
    }
    write_txn.commit()?;
    Ok(())
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(value, BINCODE_CONFIG)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
    Ok(value)
}

/// Key of a record in a per-user sub-collection
pub fn child_key(user_id: &str, id: &str) -> String {
    format!("{}/{}", user_id, id)
}

/// Fetch and decode a single record
pub fn get_record<T, Tbl>(table: &Tbl, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(bytes) => Ok(Some(decode(bytes.value())?)),
        None => Ok(None),
    }
}

/// Encode and upsert a single record
pub fn put_record<T: Serialize>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = encode(value)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

/// All records of one user's sub-collection, in key order
pub fn list_children<T, Tbl>(table: &Tbl, user_id: &str) -> Result<Vec<(String, T)>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    // '0' sorts right after '/', so this range covers exactly "{user_id}/*"
    let start = format!("{}/", user_id);
    let end = format!("{}0", user_id);

    let mut records = Vec::new();
    for item in table.range(start.as_str()..end.as_str())? {
        let (key, value) = item?;
        records.push((key.value().to_string(), decode(value.value())?));
    }
    Ok(records)
}

/// Remove every record of one user's sub-collection, returning how many went
pub fn remove_children(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    user_id: &str,
) -> Result<usize> {
    let start = format!("{}/", user_id);
    let end = format!("{}0", user_id);

    let mut keys = Vec::new();
    for item in table.range(start.as_str()..end.as_str())? {
        let (key, _) = item?;
        keys.push(key.value().to_string());
    }
    for key in &keys {
        table.remove(key.as_str())?;
    }
    Ok(keys.len())
}
