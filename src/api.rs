use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::error::ApiError;
use crate::model::{Author, Comment, Counts, FeedPage, FeedType, VideoId, VideoItem};

pub const DEFAULT_BASE_URL: &str = "https://tiktok.fullstack.edu.vn/api/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MEDIA_URL_FIELDS: &[&str] = &[
    "file_url",
    "video_url",
    "url",
    "src",
    "video.file_url",
    "video.url",
];
const THUMBNAIL_FIELDS: &[&str] = &[
    "thumb_url",
    "thumbnail_url",
    "thumbnail",
    "poster",
    "video.thumb_url",
    "video.thumbnail",
];
const MAX_UNWRAP_DEPTH: usize = 3;

pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub http_client: Option<HttpClient>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: String::new(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            http_client: None,
        }
    }
}

pub struct Client {
    token_provider: Arc<dyn TokenProvider>,
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    timeout: Duration,
}

impl Client {
    pub fn new(token_provider: Arc<dyn TokenProvider>, config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let mut base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder().timeout(config.timeout).build()?,
        };

        Ok(Client {
            token_provider,
            http,
            user_agent: config.user_agent,
            base_url,
            timeout: config.timeout,
        })
    }

    pub fn videos(
        &self,
        feed_type: FeedType,
        page: u32,
        exclude: &[String],
    ) -> Result<FeedPage, ApiError> {
        let mut params = vec![
            ("type".to_string(), feed_type.as_str().to_string()),
            ("page".to_string(), page.to_string()),
        ];
        if !exclude.is_empty() {
            params.push(("except".to_string(), exclude.join(",")));
        }
        let payload = self.request(Method::GET, "videos", &params, None)?;
        Ok(feed_page_from_payload(&payload, page))
    }

    pub fn user_videos(&self, user: &str) -> Result<Vec<VideoItem>, ApiError> {
        let nickname = user.trim().trim_start_matches('@');
        if nickname.is_empty() {
            return Err(ApiError::Validation("user nickname is required".into()));
        }
        let payload = self.request(Method::GET, &format!("users/@{nickname}"), &[], None)?;
        Ok(profile_videos_from_payload(&payload))
    }

    pub fn like_video(&self, video: &str) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("videos/{video}/like"), &[], None)?;
        Ok(())
    }

    pub fn unlike_video(&self, video: &str) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("videos/{video}/unlike"), &[], None)?;
        Ok(())
    }

    pub fn follow_user(&self, user_id: u64) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("users/{user_id}/follow"), &[], None)?;
        Ok(())
    }

    pub fn unfollow_user(&self, user_id: u64) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("users/{user_id}/unfollow"), &[], None)?;
        Ok(())
    }

    pub fn comments(&self, video: &str) -> Result<Vec<Comment>, ApiError> {
        let payload = self.request(Method::GET, &format!("videos/{video}/comments"), &[], None)?;
        Ok(comments_from_payload(&payload))
    }

    pub fn create_comment(&self, video: &str, text: &str) -> Result<Comment, ApiError> {
        if text.trim().is_empty() {
            return Err(ApiError::Validation("comment text is required".into()));
        }
        let body = json!({ "comment": text });
        let payload = self.request(
            Method::POST,
            &format!("videos/{video}/comments"),
            &[],
            Some(body),
        )?;
        comments_from_payload(&payload)
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::Decode("comment response empty".into()))
    }

    pub fn like_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("comments/{comment_id}/like"), &[], None)?;
        Ok(())
    }

    pub fn unlike_comment(&self, comment_id: u64) -> Result<(), ApiError> {
        self.request(Method::POST, &format!("comments/{comment_id}/unlike"), &[], None)?;
        Ok(())
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|err| ApiError::Validation(format!("bad request path {path}: {err}")))?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        tracing::debug!(%method, %url, "api request started");
        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = self.token_provider.token() {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req
            .send()
            .map_err(|err| ApiError::from_reqwest(err, self.timeout))?;
        let status = resp.status();
        let text = resp
            .text()
            .map_err(|err| ApiError::from_reqwest(err, self.timeout))?;
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))?
        };

        if status.is_success() {
            return Ok(payload);
        }
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        tracing::warn!(status = status.as_u16(), %message, path, "api request failed");
        match status.as_u16() {
            401 => Err(ApiError::AuthExpired),
            404 => Err(ApiError::NotFound(message)),
            422 => Err(ApiError::Validation(message)),
            code => Err(ApiError::Status { code, message }),
        }
    }
}

/// Normalise a listing response into one page. The API answers with
/// `{data: [...], meta}`, a bare array, or a single wrapped object depending
/// on the endpoint; callers only ever see `Vec<VideoItem>`.
pub fn feed_page_from_payload(payload: &Value, page: u32) -> FeedPage {
    let items = videos_from_payload(payload);
    let has_more = match pagination(payload) {
        Some((current, total)) => current < total && !items.is_empty(),
        None => !items.is_empty(),
    };
    FeedPage {
        items,
        page,
        has_more,
    }
}

pub fn videos_from_payload(payload: &Value) -> Vec<VideoItem> {
    unwrap_listing(payload, 0)
        .into_iter()
        .filter_map(|value| {
            let item = video_from_value(value);
            if item.is_none() {
                tracing::warn!("dropping video without id or uuid");
            }
            item
        })
        .collect()
}

pub fn profile_videos_from_payload(payload: &Value) -> Vec<VideoItem> {
    let profile = payload.get("data").unwrap_or(payload);
    match profile.get("videos") {
        Some(videos) => videos_from_payload(videos),
        None => Vec::new(),
    }
}

pub fn comments_from_payload(payload: &Value) -> Vec<Comment> {
    unwrap_listing(payload, 0)
        .into_iter()
        .filter_map(comment_from_value)
        .collect()
}

fn unwrap_listing(value: &Value, depth: usize) -> Vec<&Value> {
    match value {
        Value::Array(values) => values.iter().collect(),
        Value::Object(map) if depth < MAX_UNWRAP_DEPTH && map.contains_key("data") => {
            unwrap_listing(&map["data"], depth + 1)
        }
        Value::Object(map) if !map.is_empty() => vec![value],
        _ => Vec::new(),
    }
}

fn pagination(payload: &Value) -> Option<(u64, u64)> {
    let meta = payload
        .get("meta")
        .or_else(|| payload.get("data").and_then(|data| data.get("meta")))?;
    let pagination = meta.get("pagination")?;
    let current = u64_field(pagination, "current_page")?;
    let total = u64_field(pagination, "total_pages")?;
    Some((current, total))
}

fn video_from_value(value: &Value) -> Option<VideoItem> {
    let id = VideoId::new(u64_field(value, "id"), str_field(value, "uuid"));
    if id.is_empty() {
        return None;
    }
    Some(VideoItem {
        id,
        media_url: first_str(value, MEDIA_URL_FIELDS),
        thumbnail_url: first_str(value, THUMBNAIL_FIELDS),
        author: value.get("user").map(author_from_value).unwrap_or_default(),
        description: str_field(value, "description").unwrap_or_default(),
        music: str_field(value, "music"),
        counts: Counts {
            likes: u64_field(value, "likes_count").unwrap_or(0),
            comments: u64_field(value, "comments_count").unwrap_or(0),
            views: u64_field(value, "views_count").unwrap_or(0),
        },
        is_liked: bool_field(value, "is_liked"),
    })
}

fn author_from_value(value: &Value) -> Author {
    let first = str_field(value, "first_name").unwrap_or_default();
    let last = str_field(value, "last_name").unwrap_or_default();
    let display_name = str_field(value, "full_name")
        .unwrap_or_else(|| format!("{first} {last}").trim().to_string());
    Author {
        id: u64_field(value, "id"),
        nickname: str_field(value, "nickname").unwrap_or_default(),
        display_name,
        avatar: str_field(value, "avatar"),
        is_followed: bool_field(value, "is_followed"),
    }
}

fn comment_from_value(value: &Value) -> Option<Comment> {
    let id = u64_field(value, "id")?;
    Some(Comment {
        id,
        text: str_field(value, "comment").unwrap_or_default(),
        author: value.get("user").map(author_from_value).unwrap_or_default(),
        created_at: str_field(value, "created_at").and_then(|raw| parse_timestamp(&raw)),
        likes_count: u64_field(value, "likes_count").unwrap_or(0),
        is_liked: bool_field(value, "is_liked"),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn str_field(value: &Value, path: &str) -> Option<String> {
    lookup(value, path)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| str_field(value, path))
}

fn u64_field(value: &Value, path: &str) -> Option<u64> {
    match lookup(value, path)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_field(value: &Value, path: &str) -> bool {
    match lookup(value, path) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
        _ => false,
    }
}
