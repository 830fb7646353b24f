use rusqlite::Connection;

/// WAL journaling plus a busy timeout so the projection and the record store
/// can share one database file.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    log::debug!("SQLite journal mode: {}", mode);
    Ok(())
}
