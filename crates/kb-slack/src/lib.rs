//! Slack adapter (Web API over reqwest).
//!
//! This crate implements the `kb-core` ChatSource port over `conversations.list`,
//! `conversations.history` and `users.list`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::time::sleep;

use kb_core::{
    channels::{retain_min_members, sort_by_member_count},
    classifier::MIN_MESSAGE_CHARS,
    config::SlackConfig,
    domain::{Channel, ExtractedMessage},
    errors::Error,
    ports::{ChatSource, UserDirectory},
    utils::{char_len, slack_ts_to_rfc3339, unix_seconds},
    Result,
};

const PAGE_LIMIT: &str = "100";
const USERS_PAGE_LIMIT: &str = "1000";

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
    #[serde(flatten)]
    body: T,
}

impl<T> Envelope<T> {
    fn next_cursor(&self) -> Option<String> {
        self.response_metadata
            .as_ref()
            .and_then(|m| m.next_cursor.clone())
            .filter(|c| !c.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<SlackChannel>,
}

#[derive(Debug, Deserialize)]
struct SlackChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    num_members: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct UsersPage {
    #[serde(default)]
    members: Vec<SlackUser>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    id: String,
    #[serde(default)]
    real_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reactions: Option<Vec<SlackReaction>>,
}

#[derive(Debug, Deserialize)]
struct SlackReaction {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SlackClient {
    http: reqwest::Client,
    cfg: SlackConfig,
}

impl SlackClient {
    pub fn new(cfg: SlackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .user_agent("kb-slack/0.1")
            .build()
            .map_err(|e| Error::External(format!("slack client build error: {e}")))?;
        Ok(Self { http, cfg })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.cfg.api_base.trim_end_matches('/'))
    }

    /// One Web API call. Rate limits surface as [`Error::RateLimited`].
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
        attempt: u32,
    ) -> Result<Envelope<T>> {
        let resp = self
            .http
            .get(self.url(method))
            .bearer_auth(&self.cfg.bot_token)
            .header("x-kb-retry-attempt", attempt.to_string())
            .query(query)
            .send()
            .await
            .map_err(|e| Error::External(format!("slack {method} request error: {e}")))?;

        let status = resp.status();
        let retry_after =
            parse_retry_after(resp.headers()).unwrap_or(self.cfg.default_retry_after);
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "slack {method} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let env: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("slack {method} json error: {e}")))?;
        if !env.ok {
            let error = env.error.unwrap_or_else(|| "unknown error".to_string());
            if error == "ratelimited" {
                return Err(Error::RateLimited { retry_after });
            }
            return Err(Error::External(format!("slack {method} failed: {error}")));
        }
        Ok(env)
    }

    /// [`Self::call`], retrying rate-limited responses after the server-supplied delay.
    async fn call_with_retry<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>> {
        let mut attempts = 0u32;
        loop {
            match self.call(method, query, attempts).await {
                Err(Error::RateLimited { retry_after })
                    if attempts < self.cfg.max_rate_limit_retries =>
                {
                    attempts += 1;
                    tracing::warn!(
                        method,
                        attempt = attempts,
                        retry_after_secs = retry_after.as_secs(),
                        "rate limited, waiting before retrying"
                    );
                    sleep(retry_after).await;
                }
                other => return other,
            }
        }
    }

    async fn pace(&self) {
        if !self.cfg.page_delay.is_zero() {
            sleep(self.cfg.page_delay).await;
        }
    }

    async fn fetch_channels(&self) -> Vec<Channel> {
        let started = Instant::now();
        let mut all: Vec<Channel> = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0u32;

        loop {
            page += 1;
            tracing::info!(
                page,
                elapsed_minutes = started.elapsed().as_secs() / 60,
                "fetching channel page"
            );
            self.pace().await;

            let mut query = vec![
                ("types", "public_channel,private_channel".to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            query.push(("cursor", cursor.clone().unwrap_or_default()));

            let env = match self
                .call_with_retry::<ChannelsPage>("conversations.list", &query)
                .await
            {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(page, error = %e, "channel fetch stopped, keeping partial list");
                    break;
                }
            };

            let next = env.next_cursor();
            let fetched: Vec<Channel> = env
                .body
                .channels
                .into_iter()
                .map(|c| Channel {
                    name: c.name.unwrap_or_else(|| c.id.clone()),
                    id: c.id,
                    member_count: c.num_members,
                })
                .collect();
            let fetched_count = fetched.len();
            let active = retain_min_members(fetched, self.cfg.min_channel_members);
            tracing::info!(
                page,
                active = active.len(),
                skipped = fetched_count - active.len(),
                "found active channels"
            );
            all.extend(active);

            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        tracing::info!(
            channels = all.len(),
            pages = page,
            elapsed_minutes = started.elapsed().as_secs() / 60,
            "channel fetch complete"
        );
        sort_by_member_count(&mut all);
        all
    }

    async fn fetch_history(
        &self,
        channel: &Channel,
        oldest: DateTime<Utc>,
        users: &UserDirectory,
    ) -> Vec<ExtractedMessage> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            self.pace().await;

            let mut query = vec![
                ("channel", channel.id.clone()),
                ("oldest", unix_seconds(oldest)),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            query.push(("cursor", cursor.clone().unwrap_or_default()));

            let env = match self
                .call_with_retry::<HistoryPage>("conversations.history", &query)
                .await
            {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(channel = %channel.name, error = %e, "message fetch stopped, keeping partial list");
                    break;
                }
            };

            let next = env.next_cursor();
            let page = env.body;
            out.extend(
                page.messages
                    .into_iter()
                    .filter_map(|m| to_extracted(m, channel, users)),
            );

            match next {
                Some(c) if page.has_more => cursor = Some(c),
                _ => break,
            }
        }

        tracing::info!(channel = %channel.name, messages = out.len(), "extracted messages");
        out
    }
}

/// Human, non-system messages with enough text to be worth classifying.
fn to_extracted(
    m: SlackMessage,
    channel: &Channel,
    users: &UserDirectory,
) -> Option<ExtractedMessage> {
    if m.bot_id.is_some() || m.subtype.is_some() {
        return None;
    }
    let text = m.text.filter(|t| !t.is_empty())?;
    let user = m.user.filter(|u| !u.is_empty())?;
    let ts = m.ts?;
    if char_len(&text) < MIN_MESSAGE_CHARS {
        return None;
    }

    let username = users.get(&user).cloned().unwrap_or_else(|| user.clone());
    Some(ExtractedMessage {
        timestamp: slack_ts_to_rfc3339(&ts).unwrap_or_else(|| ts.clone()),
        id: ts,
        text,
        username: Some(username),
        user,
        channel: channel.id.clone(),
        channel_name: Some(channel.name.clone()),
        thread_ts: m.thread_ts,
        reactions: m.reactions.map(|rs| {
            rs.into_iter()
                .filter_map(|r| r.name.filter(|n| !n.is_empty()))
                .collect()
        }),
    })
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

#[async_trait]
impl ChatSource for SlackClient {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.fetch_channels().await)
    }

    async fn list_users(&self) -> Result<UserDirectory> {
        let mut users = UserDirectory::new();
        let mut cursor: Option<String> = None;
        loop {
            let query = [
                ("limit", USERS_PAGE_LIMIT.to_string()),
                ("cursor", cursor.clone().unwrap_or_default()),
            ];
            let env = self.call_with_retry::<UsersPage>("users.list", &query).await?;
            let next = env.next_cursor();
            for member in env.body.members {
                if let Some(name) = member.real_name.filter(|n| !n.is_empty()) {
                    users.insert(member.id, name);
                }
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(users)
    }

    async fn channel_messages(
        &self,
        channel: &Channel,
        oldest: DateTime<Utc>,
        users: &UserDirectory,
    ) -> Result<Vec<ExtractedMessage>> {
        Ok(self.fetch_history(channel, oldest, users).await)
    }
}
