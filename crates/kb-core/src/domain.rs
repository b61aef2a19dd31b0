use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// A workspace channel as returned by the chat source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<u32>,
}

/// A message pulled from channel history, enriched with display names.
///
/// Never persisted on its own; it only lives inside a [`KnowledgeItem`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMessage {
    pub id: String,
    pub text: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    pub timestamp: String,
    #[serde(
        rename = "thread_ts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<String>>,
}

impl ExtractedMessage {
    /// Display name of the author, falling back to the raw user id.
    pub fn author(&self) -> &str {
        self.username
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.user)
    }

    /// Channel name, falling back to the raw channel id.
    pub fn channel_label(&self) -> &str {
        self.channel_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.channel)
    }
}

/// The five fixed knowledge categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Decisions,
    Discussions,
    Resources,
    Processes,
    Announcements,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Decisions,
        Category::Discussions,
        Category::Resources,
        Category::Processes,
        Category::Announcements,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Decisions => "decisions",
            Category::Discussions => "discussions",
            Category::Resources => "resources",
            Category::Processes => "processes",
            Category::Announcements => "announcements",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::validation("category", format!("unknown category: {s}")))
    }
}

/// A classified, summarized record derived from one source message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeItem {
    pub id: String,
    pub original_message: ExtractedMessage,
    pub category: Category,
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub relevant_context: String,
    pub confidence: f64,
    pub extracted_at: String,
}

impl KnowledgeItem {
    /// Knowledge ids are derived from the source message id.
    pub fn id_for(message: &ExtractedMessage) -> String {
        format!("knowledge_{}", message.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorCount {
    pub user: String,
    pub count: usize,
}

/// Aggregates over the stored knowledge list. Recomputed on every request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeStats {
    pub total_messages: usize,
    pub total_knowledge_items: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub top_contributors: Vec<ContributorCount>,
    pub channel_stats: BTreeMap<String, usize>,
}

/// Result of one extraction run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    pub success: bool,
    pub total_messages: usize,
    pub knowledge_items: usize,
    pub channels: Vec<String>,
}
