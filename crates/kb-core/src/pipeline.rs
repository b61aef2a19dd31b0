//! Extraction pipeline: channels -> messages -> classify -> filter -> save.
//!
//! Every step is awaited in sequence. Failures of the chat source degrade to
//! empty results for the affected step and are logged; nothing here is fatal.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    classifier::{filter_high_confidence, KnowledgeProcessor},
    config::ExtractionConfig,
    domain::{Channel, ExtractionSummary},
    ports::{ChatSource, UserDirectory},
    store::KnowledgeStore,
};

pub struct ExtractionService {
    source: Arc<dyn ChatSource>,
    processor: KnowledgeProcessor,
    store: Arc<KnowledgeStore>,
    cfg: ExtractionConfig,
}

impl ExtractionService {
    pub fn new(
        source: Arc<dyn ChatSource>,
        processor: KnowledgeProcessor,
        store: Arc<KnowledgeStore>,
        cfg: ExtractionConfig,
    ) -> Self {
        Self {
            source,
            processor,
            store,
            cfg,
        }
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Live channel list. There is no channel cache, so `refresh` changes nothing.
    pub async fn list_channels(&self, refresh: bool) -> Vec<Channel> {
        if refresh {
            tracing::debug!("channel refresh requested; channels are always fetched live");
        }
        match self.source.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch channels");
                Vec::new()
            }
        }
    }

    async fn list_users(&self) -> UserDirectory {
        match self.source.list_users().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch users");
                UserDirectory::new()
            }
        }
    }

    /// Run one extraction over `channel_ids` for the last `days_back` days.
    ///
    /// Ids that do not name a known channel are ignored.
    pub async fn extract(&self, channel_ids: &[String], days_back: Option<u32>) -> ExtractionSummary {
        let days_back = days_back.unwrap_or(self.cfg.default_days_back);
        tracing::info!(channels = channel_ids.len(), days_back, "starting extraction");

        let channels = self.list_channels(false).await;
        let users = self.list_users().await;
        let oldest = Utc::now() - Duration::days(i64::from(days_back));

        let selected: Vec<Channel> = channels
            .into_iter()
            .filter(|c| channel_ids.iter().any(|id| id == &c.id))
            .collect();

        let mut classified = Vec::new();
        for channel in &selected {
            tracing::info!(channel = %channel.name, "processing channel");

            let messages = match self.source.channel_messages(channel, oldest, &users).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!(channel = %channel.name, error = %e, "failed to extract messages");
                    Vec::new()
                }
            };
            tracing::info!(
                channel = %channel.name,
                messages = messages.len(),
                "classifying messages"
            );

            for message in &messages {
                if let Some(item) = self.processor.process_message(message).await {
                    classified.push(item);
                }
            }
        }

        let total_messages = classified.len();
        let retained = filter_high_confidence(classified, self.cfg.min_confidence);
        let knowledge_items = retained.len();

        if let Err(e) = self.store.save(retained).await {
            tracing::error!(path = %self.store.path().display(), error = %e, "failed to save knowledge");
        }

        tracing::info!(total_messages, knowledge_items, "extraction finished");
        ExtractionSummary {
            success: true,
            total_messages,
            knowledge_items,
            channels: selected.into_iter().map(|c| c.name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{Category, ExtractedMessage},
        errors::Error,
        Result,
    };
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeSource {
        channels: Vec<Channel>,
        messages: HashMap<String, Vec<ExtractedMessage>>,
        failing_channels: Vec<String>,
        fail_users: bool,
        fail_channels: bool,
    }

    #[async_trait]
    impl ChatSource for FakeSource {
        async fn list_channels(&self) -> Result<Vec<Channel>> {
            if self.fail_channels {
                return Err(Error::External("invalid_auth".to_string()));
            }
            Ok(self.channels.clone())
        }

        async fn list_users(&self) -> Result<UserDirectory> {
            if self.fail_users {
                return Err(Error::External("missing_scope".to_string()));
            }
            Ok(HashMap::from([("U1".to_string(), "Ada".to_string())]))
        }

        async fn channel_messages(
            &self,
            channel: &Channel,
            _oldest: DateTime<Utc>,
            _users: &UserDirectory,
        ) -> Result<Vec<ExtractedMessage>> {
            if self.failing_channels.contains(&channel.id) {
                return Err(Error::External("channel_not_found".to_string()));
            }
            Ok(self.messages.get(&channel.id).cloned().unwrap_or_default())
        }
    }

    fn channel(id: &str, name: &str) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            member_count: Some(10),
        }
    }

    fn message(id: &str, channel: &str, text: &str) -> ExtractedMessage {
        ExtractedMessage {
            id: id.to_string(),
            text: text.to_string(),
            user: "U1".to_string(),
            username: Some("Ada".to_string()),
            channel: channel.to_string(),
            channel_name: Some("eng".to_string()),
            timestamp: "2024-01-01T00:00:00+00:00".to_string(),
            thread_ts: None,
            reactions: None,
        }
    }

    fn service(source: FakeSource, dir: &std::path::Path) -> ExtractionService {
        ExtractionService::new(
            Arc::new(source),
            KnowledgeProcessor::offline(),
            Arc::new(KnowledgeStore::at(dir.join("knowledge.json"))),
            ExtractionConfig::default(),
        )
    }

    #[tokio::test]
    async fn empty_channel_reports_zero_counts() {
        let dir = tempdir().expect("tempdir");
        let svc = service(
            FakeSource {
                channels: vec![channel("C123", "general")],
                ..FakeSource::default()
            },
            dir.path(),
        );

        let summary = svc.extract(&["C123".to_string()], Some(7)).await;
        assert_eq!(
            summary,
            ExtractionSummary {
                success: true,
                total_messages: 0,
                knowledge_items: 0,
                channels: vec!["general".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn classifies_filters_and_persists() {
        let dir = tempdir().expect("tempdir");
        let svc = service(
            FakeSource {
                channels: vec![channel("C1", "eng"), channel("C2", "random")],
                messages: HashMap::from([(
                    "C1".to_string(),
                    vec![
                        message("1", "C1", "We decided to switch to the new deployment process, effective Monday."),
                        message("2", "C1", "What do people think about tabs versus spaces"),
                        message("3", "C1", "thanks everyone for the quick turnaround"),
                        message("4", "C1", "too short"),
                    ],
                )]),
                ..FakeSource::default()
            },
            dir.path(),
        );

        let summary = svc.extract(&["C1".to_string()], None).await;
        assert_eq!(summary.total_messages, 2);
        assert_eq!(summary.knowledge_items, 1);
        assert_eq!(summary.channels, vec!["eng".to_string()]);

        let stored = svc.store().load().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "knowledge_1");
        assert_eq!(stored[0].category, Category::Decisions);
    }

    #[tokio::test]
    async fn failing_sources_degrade_to_empty() {
        let dir = tempdir().expect("tempdir");
        let source = FakeSource {
            channels: vec![channel("C1", "broken"), channel("C2", "ok")],
            messages: HashMap::from([(
                "C2".to_string(),
                vec![message("9", "C2", "Important update for everyone: new VPN policy")],
            )]),
            failing_channels: vec!["C1".to_string()],
            fail_users: true,
            ..FakeSource::default()
        };
        let svc = service(source, dir.path());

        let summary = svc
            .extract(&["C1".to_string(), "C2".to_string(), "C404".to_string()], Some(1))
            .await;
        assert!(summary.success);
        assert_eq!(summary.channels, vec!["broken".to_string(), "ok".to_string()]);
        assert_eq!(summary.knowledge_items, 1);
    }

    #[tokio::test]
    async fn channel_list_failure_yields_empty_run() {
        let dir = tempdir().expect("tempdir");
        let svc = service(
            FakeSource {
                fail_channels: true,
                ..FakeSource::default()
            },
            dir.path(),
        );
        assert!(svc.list_channels(true).await.is_empty());
        let summary = svc.extract(&["C1".to_string()], None).await;
        assert!(summary.channels.is_empty());
        assert_eq!(summary.total_messages, 0);
    }

    #[tokio::test]
    async fn repeated_extraction_does_not_duplicate_items() {
        let dir = tempdir().expect("tempdir");
        let svc = service(
            FakeSource {
                channels: vec![channel("C1", "eng")],
                messages: HashMap::from([(
                    "C1".to_string(),
                    vec![message("1", "C1", "Final decision: we approved the budget change")],
                )]),
                ..FakeSource::default()
            },
            dir.path(),
        );
        svc.extract(&["C1".to_string()], None).await;
        svc.extract(&["C1".to_string()], None).await;
        assert_eq!(svc.store().load().await.len(), 1);
    }
}
