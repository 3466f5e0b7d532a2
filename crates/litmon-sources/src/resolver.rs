use std::collections::HashSet;

use tracing::debug;

use litmon_core::{Paper, PaperStore};

use crate::error::Result;

/// Split a discovery batch into papers genuinely new to the store and a
/// count of duplicates dropped.
///
/// Identity is two-level: the record id (PMID, `doi:` or `zotero:` key) and,
/// for records that carry one, the normalized DOI. Within the batch the first
/// occurrence wins and order is preserved, matching the store's own
/// first-writer-wins insert. A preprint already stored under its DOI is a
/// duplicate even when it resurfaces from another source.
pub fn partition_new(store: &PaperStore, batch: &[Paper]) -> Result<(Vec<Paper>, usize)> {
    let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
    let known_ids = store.existing_ids_among(&ids)?;

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_dois: HashSet<String> = HashSet::new();
    let mut fresh = Vec::new();
    let mut duplicates = 0usize;

    for paper in batch {
        if known_ids.contains(&paper.id) || !seen_ids.insert(&paper.id) {
            duplicates += 1;
            continue;
        }

        if let Some(doi) = &paper.doi {
            if seen_dois.contains(doi) || store.doi_exists(doi)? {
                duplicates += 1;
                continue;
            }
            seen_dois.insert(doi.clone());
        }

        fresh.push(paper.clone());
    }

    debug!(
        batch = batch.len(),
        new = fresh.len(),
        duplicates,
        "resolved discovery batch against the store"
    );
    Ok((fresh, duplicates))
}
