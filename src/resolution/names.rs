//! Name-based reference resolution.
//!
//! Raw dependency keys are dot-delimited (`products.inventory.InventoryService`,
//! `..pkg.Helper`, `net.http`). Resolution only ever looks at the last
//! segment (the short name) and, to break ties, at the segments before it.
//! This is a heuristic: it picks a plausible target, not a provably correct
//! one.

use std::collections::HashMap;
use std::path::Path;

use crate::types::Item;

// ---------------------------------------------------------------------------
// Name index
// ---------------------------------------------------------------------------

/// One item that answers to a short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub item_id: String,
    pub source_file: String,
}

/// `short name -> candidates`, in the order items were indexed.
#[derive(Debug, Default)]
pub struct NameIndex {
    by_name: HashMap<String, Vec<Candidate>>,
}

impl NameIndex {
    /// Index `items` in the order given. Callers pass items sorted by id so
    /// "first candidate" is stable across runs.
    pub fn build(items: &[Item]) -> Self {
        let mut by_name: HashMap<String, Vec<Candidate>> = HashMap::new();
        for item in items {
            let Some(name) = item.name() else { continue };
            let short = short_name(name);
            if short.is_empty() {
                continue;
            }
            by_name.entry(short.to_string()).or_default().push(Candidate {
                item_id: item.id.clone(),
                source_file: item.source_file.clone(),
            });
        }
        Self { by_name }
    }

    pub fn candidates(&self, short_name: &str) -> &[Candidate] {
        self.by_name.get(short_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

/// Last dot-delimited segment.
pub fn short_name(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

/// Non-empty dot segments; leading relative dots are dropped.
fn segments(key: &str) -> Vec<&str> {
    key.split('.').filter(|s| !s.is_empty()).collect()
}

/// Second-to-last segment, if the key has one.
pub fn path_hint(key: &str) -> Option<&str> {
    let segs = segments(key);
    (segs.len() >= 2).then(|| segs[segs.len() - 2])
}

// ---------------------------------------------------------------------------
// Candidate selection
// ---------------------------------------------------------------------------

/// Why a particular candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionReason {
    /// Exactly one item other than the source carries the short name.
    Unique,
    /// Several did; the source path contained the key's path hint.
    PathHint,
    /// Several did and the hint matched none; the first indexed one wins.
    FirstCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub item_id: String,
    pub reason: ResolutionReason,
}

/// Pick a target among `candidates` for the raw `key` held by `source_id`.
///
/// The referencing item itself is never eligible, so a name that only the
/// source carries stays unresolved. With several eligible candidates, those
/// whose source path contains the path hint (case-insensitive) are
/// preferred. When more than one contains it, the one whose path components
/// match the most further key segments, walking backwards, wins; remaining
/// ties go to the earliest candidate.
pub fn resolve_candidates(candidates: &[Candidate], key: &str, source_id: &str) -> Option<Resolution> {
    let eligible: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.item_id != source_id)
        .collect();
    match eligible.as_slice() {
        [] => None,
        [only] => Some(Resolution {
            item_id: only.item_id.clone(),
            reason: ResolutionReason::Unique,
        }),
        _ => {
            let chosen = path_hint(key)
                .and_then(|hint| best_hint_match(&eligible, key, hint))
                .map(|c| (c, ResolutionReason::PathHint))
                .unwrap_or((eligible[0], ResolutionReason::FirstCandidate));
            Some(Resolution {
                item_id: chosen.0.item_id.clone(),
                reason: chosen.1,
            })
        }
    }
}

fn best_hint_match<'c>(candidates: &[&'c Candidate], key: &str, hint: &str) -> Option<&'c Candidate> {
    let hint = hint.to_lowercase();
    let segs = segments(key);
    // Segments before the hint, nearest first.
    let outer: Vec<String> = segs
        .iter()
        .rev()
        .skip(2)
        .map(|s| s.to_lowercase())
        .collect();

    let mut best: Option<(&'c Candidate, usize)> = None;
    for &candidate in candidates {
        let path = candidate.source_file.to_lowercase();
        if !path.contains(&hint) {
            continue;
        }
        let components = path_components(&path);
        let depth = outer
            .iter()
            .take_while(|seg| components.iter().any(|c| c == *seg))
            .count();
        if best.map_or(true, |(_, d)| depth > d) {
            best = Some((candidate, depth));
        }
    }
    best.map(|(c, _)| c)
}

fn path_components(path: &str) -> Vec<String> {
    Path::new(path)
        .iter()
        .map(|c| {
            let c = c.to_string_lossy();
            match c.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem.to_string(),
                _ => c.into_owned(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Classification of unmatched references
// ---------------------------------------------------------------------------

/// What an unmatched reference most likely is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceClass {
    /// Standard library or third-party package.
    External,
    /// Looks internal but nothing in the graph answers to it.
    Unresolved,
}

/// Roots of Python, Node.js and Go standard libraries.
const STDLIB_ROOTS: &[&str] = &[
    // python
    "abc", "argparse", "asyncio", "base64", "bisect", "collections", "contextlib", "copy",
    "csv", "dataclasses", "datetime", "decimal", "enum", "functools", "glob", "hashlib",
    "heapq", "inspect", "io", "itertools", "json", "logging", "math", "operator", "os",
    "pathlib", "pickle", "queue", "random", "re", "secrets", "shutil", "socket", "sqlite3",
    "statistics", "string", "struct", "subprocess", "sys", "tempfile", "textwrap",
    "threading", "time", "traceback", "types", "typing", "unittest", "urllib", "uuid",
    "warnings", "weakref", "zipfile", "__future__",
    // node
    "assert", "buffer", "child_process", "crypto", "events", "fs", "http", "https", "net",
    "path", "stream", "url", "util", "zlib",
    // go
    "bufio", "bytes", "container", "context", "database", "encoding", "errors", "flag",
    "fmt", "hash", "html", "log", "mime", "reflect", "regexp", "runtime", "sort",
    "strconv", "strings", "sync", "testing", "text", "unicode",
];

pub fn is_stdlib_root(root: &str) -> bool {
    STDLIB_ROOTS.contains(&root)
}

/// External if the root segment is a standard-library name or the key has
/// no path structure at all (no separator, no relative prefix).
pub fn classify_reference(key: &str) -> ReferenceClass {
    let root = segments(key).first().copied().unwrap_or("");
    let path_like = key.contains('.') || key.contains('/');
    if is_stdlib_root(root) || !path_like {
        ReferenceClass::External
    } else {
        ReferenceClass::Unresolved
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
