use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Category assigned when a bookmark is saved without one.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// A saved bookmark. The `url` is the identity key within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRecord {
    pub url: String,
    pub category: String,
    pub hashtags: Vec<String>,
    pub pinned: bool,
    #[serde(with = "iso8601")]
    pub date_added: DateTime<Utc>,
}

/// Hashtags as typed by a user (`"rust, #async"`) or as stored (`["rust", "async"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashtagInput {
    Text(String),
    List(Vec<String>),
}

impl Default for HashtagInput {
    fn default() -> Self {
        HashtagInput::List(Vec::new())
    }
}

/// Unvalidated bookmark input, from a form, an import file, or a remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBookmark {
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub hashtags: Option<HashtagInput>,
    #[serde(default)]
    pub pinned: Option<bool>,
    #[serde(default)]
    pub date_added: Option<String>,
}

impl RawBookmark {
    /// Shorthand for a raw bookmark carrying only a URL.
    pub fn from_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }
}

impl From<&BookmarkRecord> for RawBookmark {
    fn from(record: &BookmarkRecord) -> Self {
        Self {
            url: record.url.clone(),
            category: Some(record.category.clone()),
            hashtags: Some(HashtagInput::List(record.hashtags.clone())),
            pinned: Some(record.pinned),
            date_added: Some(iso8601::format(&record.date_added)),
        }
    }
}

/// Partial update of an existing bookmark. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPatch {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub hashtags: Option<HashtagInput>,
    #[serde(default)]
    pub pinned: Option<bool>,
}

/// ISO-8601 timestamps in the `2024-05-01T12:00:00.000Z` shape browsers produce.
pub mod iso8601 {
    use super::*;

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Truncated to milliseconds, the precision `format` writes back.
    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(3))
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp: {}", raw)))
    }
}
