use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a video. The API hands out a numeric `id`, a `uuid`, or both,
/// and either one addresses the same item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VideoId {
    pub id: Option<u64>,
    pub uuid: Option<String>,
}

impl VideoId {
    pub fn new(id: Option<u64>, uuid: Option<String>) -> Self {
        let uuid = uuid.filter(|value| !value.trim().is_empty());
        Self { id, uuid }
    }

    pub fn from_id(id: u64) -> Self {
        Self::new(Some(id), None)
    }

    pub fn from_uuid(uuid: impl Into<String>) -> Self {
        Self::new(None, Some(uuid.into()))
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.uuid.is_none()
    }

    /// Every key this item can be looked up by.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(id) = self.id {
            keys.push(id.to_string());
        }
        if let Some(uuid) = &self.uuid {
            keys.push(uuid.clone());
        }
        keys
    }

    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        self.id.map(|id| id.to_string() == key).unwrap_or(false)
            || self.uuid.as_deref() == Some(key)
    }

    pub fn same_item(&self, other: &VideoId) -> bool {
        other.keys().iter().any(|key| self.matches(key))
    }

    /// Key used in API paths: the numeric id when known, otherwise the uuid.
    pub fn primary(&self) -> String {
        match (&self.id, &self.uuid) {
            (Some(id), _) => id.to_string(),
            (None, Some(uuid)) => uuid.clone(),
            (None, None) => String::new(),
        }
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.primary())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Author {
    pub id: Option<u64>,
    pub nickname: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub is_followed: bool,
}

impl Author {
    pub fn label(&self) -> &str {
        if !self.nickname.is_empty() {
            &self.nickname
        } else if !self.display_name.is_empty() {
            &self.display_name
        } else {
            "unknown"
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub likes: u64,
    pub comments: u64,
    pub views: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoItem {
    pub id: VideoId,
    pub media_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author: Author,
    pub description: String,
    pub music: Option<String>,
    pub counts: Counts,
    pub is_liked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub text: String,
    pub author: Author,
    pub created_at: Option<DateTime<Utc>>,
    pub likes_count: u64,
    pub is_liked: bool,
}

impl Comment {
    pub fn age_label(&self, now: DateTime<Utc>) -> String {
        match self.created_at {
            Some(created) => format_age(now.signed_duration_since(created)),
            None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
pub enum FeedType {
    #[default]
    #[serde(rename = "for-you")]
    ForYou,
    #[serde(rename = "following")]
    Following,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::ForYou => "for-you",
            FeedType::Following => "following",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FeedType::ForYou => "For You",
            FeedType::Following => "Following",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            FeedType::ForYou => FeedType::Following,
            FeedType::Following => FeedType::ForYou,
        }
    }
}

impl FromStr for FeedType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "for-you" | "foryou" | "for_you" => Ok(FeedType::ForYou),
            "following" => Ok(FeedType::Following),
            other => bail!("unknown feed type {other:?} (expected for-you or following)"),
        }
    }
}

/// Where a feed's items come from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedSource {
    Feed(FeedType),
    Profile(String),
}

impl FeedSource {
    pub fn label(&self) -> String {
        match self {
            FeedSource::Feed(kind) => kind.display_name().to_string(),
            FeedSource::Profile(user) => format!("@{}", user.trim_start_matches('@')),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedQuery {
    pub source: FeedSource,
    pub exclude: Vec<String>,
}

impl FeedQuery {
    pub fn feed(kind: FeedType) -> Self {
        Self {
            source: FeedSource::Feed(kind),
            exclude: Vec::new(),
        }
    }

    pub fn profile(user: impl Into<String>) -> Self {
        Self {
            source: FeedSource::Profile(user.into()),
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.exclude.extend(ids);
        self
    }
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self::feed(FeedType::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    pub items: Vec<VideoItem>,
    pub page: u32,
    pub has_more: bool,
}

/// Compact display form used for like/comment/view counters.
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

fn format_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3_600)
    } else {
        format!("{}d", secs / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_uuid_address_the_same_item() {
        let id = VideoId::new(Some(42), Some("abc-123".into()));
        assert!(id.matches("42"));
        assert!(id.matches("abc-123"));
        assert!(!id.matches("43"));
        assert!(id.same_item(&VideoId::from_uuid("abc-123")));
        assert!(id.same_item(&VideoId::from_id(42)));
        assert!(!id.same_item(&VideoId::from_id(7)));
        assert_eq!(id.primary(), "42");
        assert_eq!(VideoId::from_uuid("u-1").primary(), "u-1");
    }

    #[test]
    fn blank_uuid_is_dropped() {
        let id = VideoId::new(None, Some("  ".into()));
        assert!(id.is_empty());
        assert!(id.keys().is_empty());
    }

    #[test]
    fn counts_are_compacted() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_200), "1.2K");
        assert_eq!(format_count(3_460_000), "3.5M");
    }

    #[test]
    fn comment_age_labels() {
        let now = Utc::now();
        let comment = Comment {
            created_at: Some(now - chrono::Duration::seconds(150)),
            ..Comment::default()
        };
        assert_eq!(comment.age_label(now), "2m");
        let old = Comment {
            created_at: Some(now - chrono::Duration::days(3)),
            ..Comment::default()
        };
        assert_eq!(old.age_label(now), "3d");
        assert_eq!(Comment::default().age_label(now), "");
    }

    #[test]
    fn feed_type_parses_cli_values() {
        assert_eq!("for-you".parse::<FeedType>().unwrap(), FeedType::ForYou);
        assert_eq!("Following".parse::<FeedType>().unwrap(), FeedType::Following);
        assert!("trending".parse::<FeedType>().is_err());
    }
}
