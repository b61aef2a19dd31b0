//! Message classification.
//!
//! Every message is first screened (length + low-value patterns). Survivors are
//! sent to the remote model once; any failure there (transport, non-JSON reply,
//! wrong shape) drops to the rule-based classifier, which is total.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;

use crate::{
    domain::{Category, ExtractedMessage, KnowledgeItem},
    errors::Error,
    ports::CompletionClient,
    utils::{char_len, iso_timestamp_utc, take_chars},
    Result,
};

/// Messages shorter than this (in characters) never carry knowledge.
pub const MIN_MESSAGE_CHARS: usize = 20;

const SUMMARY_MAX_CHARS: usize = 100;
const KEY_POINT_FALLBACK_CHARS: usize = 50;
const MAX_KEY_POINTS: usize = 3;

const ACTION_WORDS: &[&str] = &[
    "todo",
    "action item",
    "need to",
    "should",
    "must",
    "will do",
    "task",
    "assign",
    "deadline",
    "due",
    "schedule",
    "plan",
];

/// Ordered keyword rules; first match wins.
const CATEGORY_RULES: &[(Category, f64, &[&str])] = &[
    (
        Category::Decisions,
        0.8,
        &["decided", "decision", "approved", "final", "policy", "change"],
    ),
    (
        Category::Resources,
        0.7,
        &["http", "document", "link", "resource", "tool", "guide"],
    ),
    (
        Category::Processes,
        0.7,
        &["process", "how to", "steps", "workflow", "procedure", "guide"],
    ),
    (
        Category::Announcements,
        0.8,
        &["announce", "important", "everyone", "update", "news", "notice"],
    ),
];

const DEFAULT_CATEGORY: (Category, f64) = (Category::Discussions, 0.5);

fn low_value_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)^thanks",
            r"(?i)^thank you",
            r"^\+1$",
            r"(?i)^lgtm$",
            r"(?i)^ok$",
            r"(?i)^yes$",
            r"(?i)^no$",
            r"^👍$",
            r"^👎$",
            r"^🙏$",
            r"^🙌$",
            r"^🎉$",
            r"^🎊$",
            r"^🎯$",
            r"^✅$",
            r"^❌$",
        ]
        .into_iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
    })
}

/// Acknowledgements and single-emoji reactions.
pub fn is_low_value(text: &str) -> bool {
    let trimmed = text.trim();
    low_value_patterns().iter().any(|re| re.is_match(trimmed))
}

/// Screening applied before any classification work.
pub fn should_classify(text: &str) -> bool {
    char_len(text) >= MIN_MESSAGE_CHARS && !is_low_value(text)
}

/// Fields the remote model is asked to return.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteClassification {
    pub category: Category,
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub relevant_context: String,
    pub confidence: f64,
}

/// Parse and validate the model's reply.
///
/// The reply must be a JSON object whose fields all have the requested types,
/// with `category` one of the five labels and `confidence` within [0, 1].
pub fn parse_remote_classification(reply: &str) -> Result<RemoteClassification> {
    let body = strip_code_fence(reply.trim());
    let parsed: RemoteClassification = serde_json::from_str(body)?;
    if !parsed.confidence.is_finite() || !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(Error::validation(
            "confidence",
            format!("expected a number in [0, 1], got {}", parsed.confidence),
        ));
    }
    Ok(parsed)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Prompt sent to the remote model for one message.
pub fn build_prompt(message: &ExtractedMessage) -> String {
    format!(
        r#"Analyze this Slack message for organizational knowledge. Extract key information and categorize it.

Message: "{text}"
Channel: #{channel}
Author: {author}
Date: {date}

Please analyze and respond with a JSON object containing:
- category: one of "decisions", "discussions", "resources", "processes", "announcements"
- summary: brief summary of the main point (max 100 chars)
- keyPoints: array of 2-4 key points extracted from the message
- actionItems: array of any action items or tasks mentioned
- relevantContext: why this might be important organizationally
- confidence: number 0-1 indicating how confident you are this contains valuable knowledge

Guidelines for categorization:
- "decisions": Final decisions, approvals, or policy changes
- "discussions": Ongoing debates, considerations, or brainstorming
- "resources": Links, documents, tools, or helpful information
- "processes": How-to information, workflows, or procedures
- "announcements": Important updates, news, or notifications

Only respond with the JSON object, no other text."#,
        text = message.text,
        channel = message.channel_label(),
        author = message.author(),
        date = message.timestamp,
    )
}

/// Rule-based classification. Total for any input.
pub fn fallback_classify(message: &ExtractedMessage) -> KnowledgeItem {
    let lower = message.text.to_lowercase();
    let (category, confidence) = CATEGORY_RULES
        .iter()
        .find(|(_, _, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(c, conf, _)| (*c, *conf))
        .unwrap_or(DEFAULT_CATEGORY);

    let sentences = split_sentences(&message.text);

    let action_items = sentences
        .iter()
        .filter(|s| {
            let s = s.to_lowercase();
            ACTION_WORDS.iter().any(|w| s.contains(w))
        })
        .map(|s| s.trim().to_string())
        .collect();

    let mut key_points: Vec<String> = sentences
        .iter()
        .filter(|s| {
            let n = char_len(s);
            n > 20 && n < 200
        })
        .take(MAX_KEY_POINTS)
        .map(|s| s.trim().to_string())
        .collect();
    if key_points.is_empty() {
        key_points.push(format!(
            "{}...",
            take_chars(&message.text, KEY_POINT_FALLBACK_CHARS)
        ));
    }

    KnowledgeItem {
        id: KnowledgeItem::id_for(message),
        original_message: message.clone(),
        category,
        summary: summarize(&message.text),
        key_points,
        action_items,
        relevant_context: format!(
            "Discussion in #{} by {}",
            message.channel_label(),
            message.author()
        ),
        confidence,
        extracted_at: iso_timestamp_utc(),
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?']).collect()
}

fn summarize(text: &str) -> String {
    let mut summary = take_chars(text, SUMMARY_MAX_CHARS);
    if char_len(text) > SUMMARY_MAX_CHARS {
        summary.push_str("...");
    }
    summary
}

/// Keep items whose confidence reaches `min_confidence`.
pub fn filter_high_confidence(items: Vec<KnowledgeItem>, min_confidence: f64) -> Vec<KnowledgeItem> {
    items
        .into_iter()
        .filter(|item| item.confidence >= min_confidence)
        .collect()
}

/// Turns messages into knowledge items.
#[derive(Clone, Default)]
pub struct KnowledgeProcessor {
    remote: Option<Arc<dyn CompletionClient>>,
}

impl KnowledgeProcessor {
    pub fn new(remote: Option<Arc<dyn CompletionClient>>) -> Self {
        Self { remote }
    }

    /// Rule-based classification only.
    pub fn offline() -> Self {
        Self::default()
    }

    /// `None` for messages screened out as too short or low value.
    pub async fn process_message(&self, message: &ExtractedMessage) -> Option<KnowledgeItem> {
        if !should_classify(&message.text) {
            return None;
        }

        let Some(remote) = &self.remote else {
            return Some(fallback_classify(message));
        };

        match self.classify_remote(remote.as_ref(), message).await {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %e,
                    "remote classification failed, using rule-based fallback"
                );
                Some(fallback_classify(message))
            }
        }
    }

    async fn classify_remote(
        &self,
        remote: &dyn CompletionClient,
        message: &ExtractedMessage,
    ) -> Result<KnowledgeItem> {
        let reply = remote.complete(&build_prompt(message)).await?;
        let parsed = parse_remote_classification(&reply)?;
        Ok(KnowledgeItem {
            id: KnowledgeItem::id_for(message),
            original_message: message.clone(),
            category: parsed.category,
            summary: parsed.summary,
            key_points: parsed.key_points,
            action_items: parsed.action_items,
            relevant_context: parsed.relevant_context,
            confidence: parsed.confidence,
            extracted_at: iso_timestamp_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn msg(text: &str) -> ExtractedMessage {
        ExtractedMessage {
            id: "1700000000.000100".to_string(),
            text: text.to_string(),
            user: "U1".to_string(),
            username: Some("Ada Lovelace".to_string()),
            channel: "C1".to_string(),
            channel_name: Some("engineering".to_string()),
            timestamp: "2023-11-14T22:13:20.000100+00:00".to_string(),
            thread_ts: None,
            reactions: None,
        }
    }

    struct FakeRemote {
        reply: Result<String>,
        calls: AtomicUsize,
    }

    impl FakeRemote {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(Error::External("connection refused".to_string())),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for FakeRemote {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(Error::External(e.to_string())),
            }
        }
    }

    const VALID_REPLY: &str = r#"{
        "category": "resources",
        "summary": "Runbook link for on-call",
        "keyPoints": ["Runbook lives in the wiki", "Covers paging"],
        "actionItems": [],
        "relevantContext": "Helps new on-call engineers",
        "confidence": 0.9
    }"#;

    #[test]
    fn low_value_patterns_match_acks_and_emoji() {
        assert!(is_low_value("Thanks for the help everyone, really appreciated"));
        assert!(is_low_value("  thank you so much for looking at this  "));
        assert!(is_low_value("+1"));
        assert!(is_low_value("LGTM"));
        assert!(is_low_value("👍"));
        assert!(is_low_value(" ✅ "));
        assert!(!is_low_value("ok, so the plan is to migrate next sprint"));
        assert!(!is_low_value("👍 looks good to me"));
    }

    #[tokio::test]
    async fn short_and_low_value_messages_produce_nothing() {
        let processor = KnowledgeProcessor::offline();
        assert!(processor.process_message(&msg("too short")).await.is_none());
        assert!(processor
            .process_message(&msg("thanks a lot for sorting the deploy out!"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn screened_messages_never_reach_the_remote() {
        let remote = FakeRemote::replying(VALID_REPLY);
        let processor = KnowledgeProcessor::new(Some(remote.clone()));
        assert!(processor.process_message(&msg("lgtm")).await.is_none());
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn decision_message_classifies_without_action_items() {
        let item = fallback_classify(&msg(
            "We decided to switch to the new deployment process, effective Monday.",
        ));
        assert_eq!(item.category, Category::Decisions);
        assert_eq!(item.confidence, 0.8);
        assert!(item.action_items.is_empty());
        assert_eq!(item.id, "knowledge_1700000000.000100");
        assert_eq!(
            item.key_points,
            vec!["We decided to switch to the new deployment process, effective Monday"]
        );
        assert_eq!(item.relevant_context, "Discussion in #engineering by Ada Lovelace");
    }

    #[test]
    fn fallback_rule_order_and_defaults() {
        let cases = [
            ("Here is the onboarding guide: https://wiki/x", Category::Resources, 0.7),
            ("The workflow for releases has three steps", Category::Processes, 0.7),
            ("Hey everyone, the office is closed tomorrow", Category::Announcements, 0.8),
            ("What do people think about tabs versus spaces", Category::Discussions, 0.5),
        ];
        for (text, category, confidence) in cases {
            let item = fallback_classify(&msg(text));
            assert_eq!(item.category, category, "{text}");
            assert_eq!(item.confidence, confidence, "{text}");
        }
    }

    #[test]
    fn fallback_is_total_over_arbitrary_text() {
        let long = "long ".repeat(500);
        for text in ["x", "???", "🎉🎉🎉", "a. b! c?", long.as_str()] {
            let item = fallback_classify(&msg(text));
            assert!(Category::ALL.contains(&item.category));
            assert!((0.0..=1.0).contains(&item.confidence));
            assert!(!item.key_points.is_empty());
        }
    }

    #[test]
    fn fallback_extracts_action_items_and_truncates_summary() {
        let text = format!(
            "We need to rotate the staging credentials. Bob will review. {}",
            "Padding sentence that is long enough to matter ".repeat(3)
        );
        let item = fallback_classify(&msg(&text));
        assert_eq!(item.action_items, vec!["We need to rotate the staging credentials"]);
        assert!(item.summary.ends_with("..."));
        assert_eq!(char_len(&item.summary), SUMMARY_MAX_CHARS + 3);
    }

    #[test]
    fn fallback_key_points_default_to_prefix() {
        let item = fallback_classify(&msg("short. bits. only. here. ok. yes."));
        assert_eq!(item.key_points, vec!["short. bits. only. here. ok. yes....".to_string()]);
    }

    #[tokio::test]
    async fn valid_remote_reply_is_used() {
        let remote = FakeRemote::replying(VALID_REPLY);
        let processor = KnowledgeProcessor::new(Some(remote.clone()));
        let item = processor
            .process_message(&msg("Runbook for on-call is at https://wiki/oncall"))
            .await
            .expect("item");
        assert_eq!(item.category, Category::Resources);
        assert_eq!(item.summary, "Runbook link for on-call");
        assert_eq!(item.confidence, 0.9);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_remote_replies_fall_back_without_retry() {
        let replies = [
            "not json at all",
            r#"{"category":"gossip","summary":"s","keyPoints":[],"actionItems":[],"relevantContext":"c","confidence":0.5}"#,
            r#"{"category":"decisions","summary":"s","keyPoints":[1],"actionItems":[],"relevantContext":"c","confidence":0.5}"#,
            r#"{"category":"decisions","summary":"s","keyPoints":[],"actionItems":[],"relevantContext":"c","confidence":1.5}"#,
            r#"{"category":"decisions","summary":"s","keyPoints":[],"actionItems":[]}"#,
        ];
        for reply in replies {
            let remote = FakeRemote::replying(reply);
            let processor = KnowledgeProcessor::new(Some(remote.clone()));
            let item = processor
                .process_message(&msg("We decided to adopt the new on-call policy today."))
                .await
                .expect("fallback item");
            assert_eq!(item.category, Category::Decisions, "{reply}");
            assert_eq!(item.confidence, 0.8, "{reply}");
            assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn remote_transport_error_falls_back() {
        let processor = KnowledgeProcessor::new(Some(FakeRemote::failing()));
        let item = processor
            .process_message(&msg("Important update: everyone please read the notice"))
            .await
            .expect("fallback item");
        assert_eq!(item.category, Category::Announcements);
    }

    #[test]
    fn parse_accepts_fenced_json() {
        let fenced = format!("```json\n{VALID_REPLY}\n```");
        let parsed = parse_remote_classification(&fenced).expect("parsed");
        assert_eq!(parsed.key_points.len(), 2);
    }

    #[test]
    fn prompt_carries_message_context() {
        let prompt = build_prompt(&msg("Ship the release on Friday"));
        assert!(prompt.contains("Message: \"Ship the release on Friday\""));
        assert!(prompt.contains("Channel: #engineering"));
        assert!(prompt.contains("Author: Ada Lovelace"));
        assert!(prompt.contains("Only respond with the JSON object"));
    }

    #[test]
    fn confidence_filter_keeps_threshold() {
        let mut low = fallback_classify(&msg("What do people think about tabs versus spaces"));
        low.confidence = 0.59;
        let mut edge = low.clone();
        edge.id = "knowledge_2".to_string();
        edge.confidence = 0.6;
        let kept = filter_high_confidence(vec![low, edge], 0.6);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "knowledge_2");
    }
}
