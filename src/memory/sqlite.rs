//! SQLite-backed store.
//!
//! One connection behind a mutex; every call hops onto the blocking pool.
//! Project and group filters run in SQL; tag and time filters plus cosine
//! scoring run in Rust over the narrowed rows (see [`super::search`]).

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::search;
use super::{
    bytes_to_embedding, embedding_to_bytes, GlobalFact, Group, ListOptions, Note, ScoredNote,
    SearchOptions, Store, StoreError, StoreResult,
};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::from_connection(crate::db::open_database(path)?))
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::from_connection(crate::db::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await?
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────────

const NOTE_COLUMNS: &str =
    "seq, id, project_id, group_id, title, text, tags, source, created_at, metadata, embedding";

/// Raw `notes` row; JSON and BLOB columns are decoded in [`NoteRow::decode`].
struct NoteRow {
    seq: i64,
    id: String,
    project_id: String,
    group_id: String,
    title: Option<String>,
    text: String,
    tags: String,
    source: Option<String>,
    created_at: String,
    metadata: String,
    embedding: Vec<u8>,
}

impl NoteRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            project_id: row.get(2)?,
            group_id: row.get(3)?,
            title: row.get(4)?,
            text: row.get(5)?,
            tags: row.get(6)?,
            source: row.get(7)?,
            created_at: row.get(8)?,
            metadata: row.get(9)?,
            embedding: row.get(10)?,
        })
    }

    fn decode(self) -> StoreResult<(Note, Vec<f32>, u64)> {
        let tags: Vec<String> = serde_json::from_str(&self.tags).map_err(|e| StoreError::Corrupt {
            field: "tags",
            message: e.to_string(),
        })?;
        let metadata: Map<String, Value> =
            serde_json::from_str(&self.metadata).map_err(|e| StoreError::Corrupt {
                field: "metadata",
                message: e.to_string(),
            })?;
        let embedding = bytes_to_embedding(&self.embedding)?;
        let note = Note {
            id: self.id,
            project_id: self.project_id,
            group_id: self.group_id,
            title: self.title,
            text: self.text,
            tags,
            source: self.source,
            created_at: self.created_at,
            metadata,
        };
        Ok((note, embedding, self.seq.max(0) as u64))
    }
}

const GROUP_COLUMNS: &str = "id, project_id, group_key, title, description, created_at, updated_at";

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        project_id: row.get(1)?,
        group_key: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const GLOBAL_COLUMNS: &str = "id, project_id, key, value, updated_at";

fn global_from_row(row: &Row<'_>) -> rusqlite::Result<(GlobalFact, String)> {
    let fact = GlobalFact {
        id: row.get(0)?,
        project_id: row.get(1)?,
        key: row.get(2)?,
        value: Value::Null,
        updated_at: row.get(4)?,
    };
    Ok((fact, row.get(3)?))
}

fn decode_global((mut fact, raw): (GlobalFact, String)) -> StoreResult<GlobalFact> {
    fact.value = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
        field: "value",
        message: e.to_string(),
    })?;
    Ok(fact)
}

fn to_json<T: serde::Serialize>(field: &'static str, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        field,
        message: e.to_string(),
    })
}

/// Fetch notes in scope, ordered by insertion.
fn select_scoped_notes(
    conn: &Connection,
    ns: &str,
    project_id: &str,
    group_id: Option<&str>,
) -> StoreResult<Vec<(Note, Vec<f32>, u64)>> {
    let sql = format!(
        "SELECT {NOTE_COLUMNS} FROM notes
         WHERE namespace = ?1 AND project_id = ?2 AND (?3 IS NULL OR group_id = ?3)
         ORDER BY seq"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![ns, project_id, group_id], NoteRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(NoteRow::decode).collect()
}

// ── Store impl ───────────────────────────────────────────────────────────────

#[async_trait]
impl Store for SqliteStore {
    async fn add_note(&self, ns: &str, note: &Note, embedding: &[f32]) -> StoreResult<()> {
        let ns = ns.to_string();
        let note = note.clone();
        let tags = to_json("tags", &note.tags)?;
        let metadata = to_json("metadata", &note.metadata)?;
        let blob = embedding_to_bytes(embedding);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM notes WHERE id = ?1)",
                [&note.id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(StoreError::DuplicateId(note.id));
            }
            tx.execute(
                "INSERT INTO notes (id, namespace, project_id, group_id, title, text, tags, source, created_at, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    note.id,
                    ns,
                    note.project_id,
                    note.group_id,
                    note.title,
                    note.text,
                    tags,
                    note.source,
                    note.created_at,
                    metadata,
                    blob,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_note(&self, ns: &str, id: &str) -> StoreResult<Note> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1 AND namespace = ?2"),
                    params![id, ns],
                    NoteRow::from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            Ok(row.decode()?.0)
        })
        .await
    }

    async fn update_note(
        &self,
        ns: &str,
        note: &Note,
        embedding: Option<&[f32]>,
    ) -> StoreResult<()> {
        let ns = ns.to_string();
        let note = note.clone();
        let tags = to_json("tags", &note.tags)?;
        let metadata = to_json("metadata", &note.metadata)?;
        let blob = embedding.map(embedding_to_bytes);

        self.with_conn(move |conn| {
            // Single statement: text and embedding land together.
            let changed = conn.execute(
                "UPDATE notes SET group_id = ?3, title = ?4, text = ?5, tags = ?6, source = ?7,
                        metadata = ?8, embedding = COALESCE(?9, embedding)
                 WHERE id = ?1 AND namespace = ?2",
                params![
                    note.id,
                    ns,
                    note.group_id,
                    note.title,
                    note.text,
                    tags,
                    note.source,
                    metadata,
                    blob,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete_note(&self, ns: &str, id: &str) -> StoreResult<()> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND namespace = ?2",
                params![id, ns],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        ns: &str,
        query: &[f32],
        opts: &SearchOptions,
    ) -> StoreResult<Vec<ScoredNote>> {
        if opts.top_k == 0 {
            return Ok(Vec::new());
        }
        let ns = ns.to_string();
        let query = query.to_vec();
        let opts = opts.clone();
        self.with_conn(move |conn| {
            let group_id = opts.group_id.as_deref();
            let candidates = select_scoped_notes(conn, &ns, &opts.project_id, group_id)?
                .into_iter()
                .filter(|(note, _, _)| search::matches_search(note, &opts))
                .map(|(note, embedding, _)| (note, embedding));
            Ok(search::rank(candidates, &query, opts.top_k))
        })
        .await
    }

    async fn list_recent(&self, ns: &str, opts: &ListOptions) -> StoreResult<Vec<Note>> {
        if opts.limit == 0 {
            return Ok(Vec::new());
        }
        let ns = ns.to_string();
        let opts = opts.clone();
        self.with_conn(move |conn| {
            let notes = select_scoped_notes(conn, &ns, &opts.project_id, opts.group_id.as_deref())?
                .into_iter()
                .filter(|(note, _, _)| search::matches_list(note, &opts))
                .map(|(note, _, seq)| (note, seq));
            Ok(search::most_recent(notes, opts.limit))
        })
        .await
    }

    async fn add_group(&self, ns: &str, group: &Group) -> StoreResult<()> {
        let ns = ns.to_string();
        let group = group.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let id_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM note_groups WHERE id = ?1)",
                [&group.id],
                |row| row.get(0),
            )?;
            if id_taken {
                return Err(StoreError::DuplicateId(group.id));
            }
            let key_taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM note_groups WHERE namespace = ?1 AND project_id = ?2 AND group_key = ?3)",
                params![ns, group.project_id, group.group_key],
                |row| row.get(0),
            )?;
            if key_taken {
                return Err(StoreError::DuplicateGroupKey {
                    project_id: group.project_id,
                    group_key: group.group_key,
                });
            }
            tx.execute(
                "INSERT INTO note_groups (id, namespace, project_id, group_key, title, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    group.id,
                    ns,
                    group.project_id,
                    group.group_key,
                    group.title,
                    group.description,
                    group.created_at,
                    group.updated_at,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_group(&self, ns: &str, id: &str) -> StoreResult<Group> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM note_groups WHERE id = ?1 AND namespace = ?2"),
                params![id, ns],
                group_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_group_by_key(
        &self,
        ns: &str,
        project_id: &str,
        group_key: &str,
    ) -> StoreResult<Group> {
        let (ns, project_id, group_key) =
            (ns.to_string(), project_id.to_string(), group_key.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {GROUP_COLUMNS} FROM note_groups
                     WHERE namespace = ?1 AND project_id = ?2 AND group_key = ?3"
                ),
                params![ns, project_id, group_key],
                group_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn update_group(&self, ns: &str, group: &Group) -> StoreResult<()> {
        let ns = ns.to_string();
        let group = group.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE note_groups SET title = ?3, description = ?4, updated_at = ?5
                 WHERE id = ?1 AND namespace = ?2",
                params![group.id, ns, group.title, group.description, group.updated_at],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn delete_group(&self, ns: &str, id: &str) -> StoreResult<()> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM note_groups WHERE id = ?1 AND namespace = ?2",
                params![id, ns],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn list_groups(&self, ns: &str, project_id: &str) -> StoreResult<Vec<Group>> {
        let (ns, project_id) = (ns.to_string(), project_id.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GROUP_COLUMNS} FROM note_groups
                 WHERE namespace = ?1 AND project_id = ?2 ORDER BY seq"
            ))?;
            let groups = stmt
                .query_map(params![ns, project_id], group_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(groups)
        })
        .await
    }

    async fn upsert_global(&self, ns: &str, fact: &GlobalFact) -> StoreResult<GlobalFact> {
        let ns = ns.to_string();
        let fact = fact.clone();
        let value = to_json("value", &fact.value)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM global_facts WHERE namespace = ?1 AND project_id = ?2 AND key = ?3",
                    params![ns, fact.project_id, fact.key],
                    |row| row.get(0),
                )
                .optional()?;

            let stored = match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE global_facts SET value = ?2, updated_at = ?3 WHERE id = ?1",
                        params![id, value, fact.updated_at],
                    )?;
                    GlobalFact { id, ..fact }
                }
                None => {
                    let id_taken: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM global_facts WHERE id = ?1)",
                        [&fact.id],
                        |row| row.get(0),
                    )?;
                    if id_taken {
                        return Err(StoreError::DuplicateId(fact.id));
                    }
                    tx.execute(
                        "INSERT INTO global_facts (id, namespace, project_id, key, value, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![fact.id, ns, fact.project_id, fact.key, value, fact.updated_at],
                    )?;
                    fact
                }
            };
            tx.commit()?;
            Ok(stored)
        })
        .await
    }

    async fn get_global(
        &self,
        ns: &str,
        project_id: &str,
        key: &str,
    ) -> StoreResult<Option<GlobalFact>> {
        let (ns, project_id, key) = (ns.to_string(), project_id.to_string(), key.to_string());
        self.with_conn(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {GLOBAL_COLUMNS} FROM global_facts
                     WHERE namespace = ?1 AND project_id = ?2 AND key = ?3"
                ),
                params![ns, project_id, key],
                global_from_row,
            )
            .optional()?
            .map(decode_global)
            .transpose()
        })
        .await
    }

    async fn get_global_by_id(&self, ns: &str, id: &str) -> StoreResult<GlobalFact> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {GLOBAL_COLUMNS} FROM global_facts WHERE id = ?1 AND namespace = ?2"),
                    params![id, ns],
                    global_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            decode_global(raw)
        })
        .await
    }

    async fn delete_global(&self, ns: &str, id: &str) -> StoreResult<()> {
        let (ns, id) = (ns.to_string(), id.to_string());
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM global_facts WHERE id = ?1 AND namespace = ?2",
                params![id, ns],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}
