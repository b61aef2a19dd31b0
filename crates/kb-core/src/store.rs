//! Flat-file knowledge store.
//!
//! One pretty-printed JSON array on disk. Saves are serialized through a mutex
//! held across load-merge-write and land via temp file + rename, so concurrent
//! extractions cannot drop each other's items.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use tokio::sync::Mutex;

use crate::{
    config::StoreConfig,
    domain::{Category, ContributorCount, KnowledgeItem, KnowledgeStats},
    Result,
};

pub const TOP_CONTRIBUTORS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub added: usize,
    pub total: usize,
}

pub struct KnowledgeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(cfg: &StoreConfig) -> Self {
        Self::at(cfg.knowledge_file())
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored items; an unreadable or missing file reads as empty.
    pub async fn load(&self) -> Vec<KnowledgeItem> {
        match self.try_load().await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to load knowledge, treating as empty");
                Vec::new()
            }
        }
    }

    /// Strict variant of [`Self::load`]: a missing file is empty, a corrupt one is an error.
    pub async fn try_load(&self) -> Result<Vec<KnowledgeItem>> {
        let txt = match tokio::fs::read_to_string(&self.path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if txt.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&txt)?)
    }

    /// Merge `items` into the stored list. Items whose id is already stored are dropped.
    pub async fn save(&self, items: Vec<KnowledgeItem>) -> Result<SaveOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.try_load().await?;
        let before = all.len();
        merge_by_id(&mut all, items);
        let outcome = SaveOutcome {
            added: all.len() - before,
            total: all.len(),
        };

        self.write_atomic(&all).await?;
        tracing::info!(
            added = outcome.added,
            total = outcome.total,
            "saved {} knowledge items",
            outcome.total
        );
        Ok(outcome)
    }

    pub async fn search(&self, query: &str, category: Option<Category>) -> Vec<KnowledgeItem> {
        search_items(self.load().await, query, category)
    }

    pub async fn stats(&self) -> KnowledgeStats {
        compute_stats(&self.load().await)
    }

    async fn write_atomic(&self, items: &[KnowledgeItem]) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let body = serde_json::to_vec_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Append items with unseen ids. The first occurrence of an id wins.
pub fn merge_by_id(existing: &mut Vec<KnowledgeItem>, incoming: Vec<KnowledgeItem>) {
    let mut seen: HashSet<String> = existing.iter().map(|k| k.id.clone()).collect();
    for item in incoming {
        if seen.insert(item.id.clone()) {
            existing.push(item);
        }
    }
}

/// Case-insensitive substring match over summary, key points and original text,
/// AND an exact category match when one is given.
pub fn search_items(
    items: Vec<KnowledgeItem>,
    query: &str,
    category: Option<Category>,
) -> Vec<KnowledgeItem> {
    let needle = query.to_lowercase();
    items
        .into_iter()
        .filter(|item| category.map_or(true, |c| item.category == c))
        .filter(|item| {
            item.summary.to_lowercase().contains(&needle)
                || item
                    .key_points
                    .iter()
                    .any(|p| p.to_lowercase().contains(&needle))
                || item.original_message.text.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn compute_stats(items: &[KnowledgeItem]) -> KnowledgeStats {
    let mut stats = KnowledgeStats {
        total_messages: items.len(),
        total_knowledge_items: items.len(),
        ..KnowledgeStats::default()
    };

    // Insertion-ordered so ties keep first-seen order after the stable sort.
    let mut contributors: Vec<ContributorCount> = Vec::new();
    let mut contributor_idx: HashMap<String, usize> = HashMap::new();

    for item in items {
        *stats
            .category_counts
            .entry(item.category.as_str().to_string())
            .or_insert(0) += 1;

        let user = item.original_message.author();
        match contributor_idx.get(user) {
            Some(&i) => contributors[i].count += 1,
            None => {
                contributor_idx.insert(user.to_string(), contributors.len());
                contributors.push(ContributorCount {
                    user: user.to_string(),
                    count: 1,
                });
            }
        }

        *stats
            .channel_stats
            .entry(item.original_message.channel_label().to_string())
            .or_insert(0) += 1;
    }

    contributors.sort_by(|a, b| b.count.cmp(&a.count));
    contributors.truncate(TOP_CONTRIBUTORS);
    stats.top_contributors = contributors;
    stats
}
