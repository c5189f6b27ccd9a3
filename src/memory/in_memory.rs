//! In-process store backed by hash maps behind a single `RwLock`.
//!
//! Used for `store.type = "memory"` and in tests. Every record remembers the
//! namespace it was written under plus a monotonically increasing sequence
//! number that stands in for insertion order.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::search;
use super::{
    GlobalFact, Group, ListOptions, Note, ScoredNote, SearchOptions, Store, StoreError, StoreResult,
};

struct NoteEntry {
    namespace: String,
    seq: u64,
    note: Note,
    embedding: Vec<f32>,
}

struct GroupEntry {
    namespace: String,
    seq: u64,
    group: Group,
}

struct GlobalEntry {
    namespace: String,
    fact: GlobalFact,
}

#[derive(Default)]
struct Collections {
    notes: HashMap<String, NoteEntry>,
    groups: HashMap<String, GroupEntry>,
    globals: HashMap<String, GlobalEntry>,
    next_seq: u64,
}

impl Collections {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Collections> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collections> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_note(&self, ns: &str, note: &Note, embedding: &[f32]) -> StoreResult<()> {
        let mut c = self.write();
        if c.notes.contains_key(&note.id) {
            return Err(StoreError::DuplicateId(note.id.clone()));
        }
        let seq = c.next_seq();
        c.notes.insert(
            note.id.clone(),
            NoteEntry {
                namespace: ns.to_string(),
                seq,
                note: note.clone(),
                embedding: embedding.to_vec(),
            },
        );
        Ok(())
    }

    async fn get_note(&self, ns: &str, id: &str) -> StoreResult<Note> {
        self.read()
            .notes
            .get(id)
            .filter(|e| e.namespace == ns)
            .map(|e| e.note.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update_note(
        &self,
        ns: &str,
        note: &Note,
        embedding: Option<&[f32]>,
    ) -> StoreResult<()> {
        let mut c = self.write();
        let entry = c
            .notes
            .get_mut(&note.id)
            .filter(|e| e.namespace == ns)
            .ok_or(StoreError::NotFound)?;
        entry.note = note.clone();
        if let Some(embedding) = embedding {
            entry.embedding = embedding.to_vec();
        }
        Ok(())
    }

    async fn delete_note(&self, ns: &str, id: &str) -> StoreResult<()> {
        let mut c = self.write();
        if !c.notes.get(id).is_some_and(|e| e.namespace == ns) {
            return Err(StoreError::NotFound);
        }
        c.notes.remove(id);
        Ok(())
    }

    async fn search(
        &self,
        ns: &str,
        query: &[f32],
        opts: &SearchOptions,
    ) -> StoreResult<Vec<ScoredNote>> {
        let c = self.read();
        let mut candidates: Vec<&NoteEntry> = c
            .notes
            .values()
            .filter(|e| e.namespace == ns && search::matches_search(&e.note, opts))
            .collect();
        candidates.sort_by_key(|e| e.seq);
        Ok(search::rank(
            candidates.into_iter().map(|e| (e.note.clone(), e.embedding.clone())),
            query,
            opts.top_k,
        ))
    }

    async fn list_recent(&self, ns: &str, opts: &ListOptions) -> StoreResult<Vec<Note>> {
        let c = self.read();
        Ok(search::most_recent(
            c.notes
                .values()
                .filter(|e| e.namespace == ns && search::matches_list(&e.note, opts))
                .map(|e| (e.note.clone(), e.seq)),
            opts.limit,
        ))
    }

    async fn add_group(&self, ns: &str, group: &Group) -> StoreResult<()> {
        let mut c = self.write();
        if c.groups.contains_key(&group.id) {
            return Err(StoreError::DuplicateId(group.id.clone()));
        }
        let key_taken = c.groups.values().any(|e| {
            e.namespace == ns
                && e.group.project_id == group.project_id
                && e.group.group_key == group.group_key
        });
        if key_taken {
            return Err(StoreError::DuplicateGroupKey {
                project_id: group.project_id.clone(),
                group_key: group.group_key.clone(),
            });
        }
        let seq = c.next_seq();
        c.groups.insert(
            group.id.clone(),
            GroupEntry {
                namespace: ns.to_string(),
                seq,
                group: group.clone(),
            },
        );
        Ok(())
    }

    async fn get_group(&self, ns: &str, id: &str) -> StoreResult<Group> {
        self.read()
            .groups
            .get(id)
            .filter(|e| e.namespace == ns)
            .map(|e| e.group.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_group_by_key(
        &self,
        ns: &str,
        project_id: &str,
        group_key: &str,
    ) -> StoreResult<Group> {
        self.read()
            .groups
            .values()
            .find(|e| {
                e.namespace == ns
                    && e.group.project_id == project_id
                    && e.group.group_key == group_key
            })
            .map(|e| e.group.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update_group(&self, ns: &str, group: &Group) -> StoreResult<()> {
        let mut c = self.write();
        let entry = c
            .groups
            .get_mut(&group.id)
            .filter(|e| e.namespace == ns)
            .ok_or(StoreError::NotFound)?;
        entry.group = group.clone();
        Ok(())
    }

    async fn delete_group(&self, ns: &str, id: &str) -> StoreResult<()> {
        let mut c = self.write();
        if !c.groups.get(id).is_some_and(|e| e.namespace == ns) {
            return Err(StoreError::NotFound);
        }
        c.groups.remove(id);
        Ok(())
    }

    async fn list_groups(&self, ns: &str, project_id: &str) -> StoreResult<Vec<Group>> {
        let c = self.read();
        let mut entries: Vec<&GroupEntry> = c
            .groups
            .values()
            .filter(|e| e.namespace == ns && e.group.project_id == project_id)
            .collect();
        entries.sort_by_key(|e| e.seq);
        Ok(entries.into_iter().map(|e| e.group.clone()).collect())
    }

    async fn upsert_global(&self, ns: &str, fact: &GlobalFact) -> StoreResult<GlobalFact> {
        let mut c = self.write();
        let existing = c
            .globals
            .values()
            .find(|e| {
                e.namespace == ns && e.fact.project_id == fact.project_id && e.fact.key == fact.key
            })
            .map(|e| e.fact.id.clone());

        let stored = match existing {
            Some(id) => GlobalFact { id, ..fact.clone() },
            None => {
                if c.globals.contains_key(&fact.id) {
                    return Err(StoreError::DuplicateId(fact.id.clone()));
                }
                fact.clone()
            }
        };
        c.globals.insert(
            stored.id.clone(),
            GlobalEntry {
                namespace: ns.to_string(),
                fact: stored.clone(),
            },
        );
        Ok(stored)
    }

    async fn get_global(
        &self,
        ns: &str,
        project_id: &str,
        key: &str,
    ) -> StoreResult<Option<GlobalFact>> {
        Ok(self
            .read()
            .globals
            .values()
            .find(|e| e.namespace == ns && e.fact.project_id == project_id && e.fact.key == key)
            .map(|e| e.fact.clone()))
    }

    async fn get_global_by_id(&self, ns: &str, id: &str) -> StoreResult<GlobalFact> {
        self.read()
            .globals
            .get(id)
            .filter(|e| e.namespace == ns)
            .map(|e| e.fact.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_global(&self, ns: &str, id: &str) -> StoreResult<()> {
        let mut c = self.write();
        if !c.globals.get(id).is_some_and(|e| e.namespace == ns) {
            return Err(StoreError::NotFound);
        }
        c.globals.remove(id);
        Ok(())
    }
}
