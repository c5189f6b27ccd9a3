//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const NAMESPACED_TABLES: [&str; 3] = ["notes", "note_groups", "global_facts"];

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(
        schema_version = version,
        target = CURRENT_SCHEMA_VERSION,
        "checking migrations"
    );

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: namespaces written with an explicit `:0` dimension
/// segment are rewritten to the two-segment form.
///
/// A row whose rewrite would collide with an existing two-segment row
/// (same group key or global key) keeps its old namespace; the existing row
/// wins.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    for table in NAMESPACED_TABLES {
        let changed = conn.execute(
            &format!(
                "UPDATE OR IGNORE {table}
                 SET namespace = substr(namespace, 1, length(namespace) - 2)
                 WHERE namespace LIKE '%:%:0'"
            ),
            [],
        )?;
        if changed > 0 {
            tracing::info!(table, rows = changed, "normalized zero-dimension namespaces");
        }
        let skipped: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE namespace LIKE '%:%:0'"),
            [],
            |row| row.get(0),
        )?;
        if skipped > 0 {
            tracing::warn!(
                table,
                rows = skipped,
                "zero-dimension rows left in place after key collision"
            );
        }
    }
    Ok(())
}
