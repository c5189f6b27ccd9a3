//! Filtering and ranking shared by every backend.
//!
//! Backends narrow candidates by namespace and project however they like,
//! then hand them here in insertion order. Ranking is a stable sort, so
//! equal scores keep insertion order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::{ListOptions, Note, ScoredNote, SearchOptions};

/// Cosine similarity, or `None` when lengths differ, either norm is zero or
/// a component is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let cos = dot / (norm_a.sqrt() * norm_b.sqrt());
    cos.is_finite().then_some(cos)
}

/// Similarity rescaled from `[-1, 1]` to `[0, 1]`. Incomparable vectors score `0`.
pub fn score(query: &[f32], candidate: &[f32]) -> f64 {
    cosine_similarity(query, candidate)
        .map(|cos| ((cos + 1.0) / 2.0).clamp(0.0, 1.0))
        .unwrap_or(0.0)
}

/// True when `tags` contains every entry of `required`.
pub fn has_all_tags(tags: &[String], required: &[String]) -> bool {
    required.iter().all(|r| tags.contains(r))
}

/// Inclusive time-window check. Unparseable `created_at` values never match
/// a bounded window.
pub fn within_window(
    created_at: &str,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> bool {
    if since.is_none() && until.is_none() {
        return true;
    }
    let Some(ts) = parse_timestamp(created_at) else {
        return false;
    };
    since.map_or(true, |s| ts >= s) && until.map_or(true, |u| ts <= u)
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn in_scope(note: &Note, project_id: &str, group_id: Option<&str>) -> bool {
    note.project_id == project_id && group_id.map_or(true, |g| note.group_id == g)
}

pub fn matches_search(note: &Note, opts: &SearchOptions) -> bool {
    in_scope(note, &opts.project_id, opts.group_id.as_deref())
        && has_all_tags(&note.tags, &opts.tags)
        && within_window(&note.created_at, opts.since, opts.until)
}

pub fn matches_list(note: &Note, opts: &ListOptions) -> bool {
    in_scope(note, &opts.project_id, opts.group_id.as_deref())
        && has_all_tags(&note.tags, &opts.tags)
}

/// Score candidates (given in insertion order) and keep the best `top_k`.
pub fn rank<I>(candidates: I, query: &[f32], top_k: usize) -> Vec<ScoredNote>
where
    I: IntoIterator<Item = (Note, Vec<f32>)>,
{
    if top_k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<ScoredNote> = candidates
        .into_iter()
        .map(|(note, embedding)| ScoredNote {
            score: score(query, &embedding),
            note,
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}

/// Order `(note, insertion_seq)` pairs newest first and keep `limit`.
///
/// Parseable timestamps sort before unparseable ones; ties go to the most
/// recently inserted note.
pub fn most_recent<I>(notes: I, limit: usize) -> Vec<Note>
where
    I: IntoIterator<Item = (Note, u64)>,
{
    if limit == 0 {
        return Vec::new();
    }
    let mut keyed: Vec<(Option<DateTime<Utc>>, u64, Note)> = notes
        .into_iter()
        .map(|(note, seq)| (parse_timestamp(&note.created_at), seq, note))
        .collect();
    // Option orders None < Some, so a descending sort puts unparseable last.
    keyed.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    keyed.into_iter().take(limit).map(|(_, _, note)| note).collect()
}
