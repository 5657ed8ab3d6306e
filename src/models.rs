use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};

pub const VIDEO_URL_MIN_LEN: usize = 11;
pub const VIDEO_URL_MAX_LEN: usize = 300;
pub const NAME_MIN_LEN: usize = 1;
pub const NAME_MAX_LEN: usize = 50;
pub const SLUG_MIN_LEN: usize = 1;
pub const SLUG_MAX_LEN: usize = 50;

/// Slugs that match the character class but would shadow application routes.
pub const RESERVED_SLUGS: &[&str] = &["api", "internal-use"];

// Only ASCII whitespace ends a match; `\s` would also reject Unicode spaces.
static VIDEO_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/)[^ \t\n\x0B\x0C\r]+$",
    )
    .expect("video url pattern is valid")
});

static SLUG_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("slug pattern is valid"));

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(AccountId);
uuid_id!(OwnerId);
uuid_id!(VideoId);
uuid_id!(ListId);

/// Application profile bound to exactly one external account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: OwnerId,
    pub account_id: AccountId,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: VideoId,
    pub owner_id: OwnerId,
    pub url: String,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoList {
    pub id: ListId,
    pub owner_id: OwnerId,
    pub name: String,
    pub slug: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A list together with its materialized member videos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListWithVideos {
    #[serde(flatten)]
    pub list: VideoList,
    pub videos: Vec<Video>,
}

/// One row of the list/video join. `video` is `None` for a list without members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMemberRow {
    pub list: VideoList,
    pub video: Option<Video>,
}

/// Which lists a read should cover.
///
/// `Ids` carries the caller's order, which eager loads restore after the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSelection {
    All,
    Owner(OwnerId),
    Ids(Vec<ListId>),
}

impl ListSelection {
    pub fn input_order(&self) -> Option<&[ListId]> {
        match self {
            ListSelection::Ids(ids) => Some(ids),
            ListSelection::All | ListSelection::Owner(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideoPayload {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoPayload {
    pub url: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListPayload {
    pub name: String,
    pub slug: String,
    pub video_ids: Option<Vec<VideoId>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListPayload {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub video_ids: Option<Vec<VideoId>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListListsQuery {
    pub eagerload: Option<bool>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVideosQuery {
    pub user: Option<String>,
}

/// Validated fields for a new video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDefinition {
    pub url: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoChanges {
    pub url: Option<String>,
    pub name: Option<String>,
}

/// Validated fields for a new list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListDefinition {
    pub name: String,
    pub slug: String,
    pub video_ids: Vec<VideoId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub video_ids: Option<Vec<VideoId>>,
}

impl ListListsQuery {
    pub fn eager(&self) -> bool {
        self.eagerload.unwrap_or(false)
    }

    pub fn current_user_only(&self) -> Result<bool> {
        parse_user_filter(self.user.as_deref())
    }
}

impl ListVideosQuery {
    pub fn current_user_only(&self) -> Result<bool> {
        parse_user_filter(self.user.as_deref())
    }
}

fn parse_user_filter(user: Option<&str>) -> Result<bool> {
    match user {
        None => Ok(false),
        Some("current") => Ok(true),
        Some(other) => Err(LibError::invalid_with_code(
            "user_invalid",
            "Invalid user",
            anyhow!("unsupported user filter {:?}", other),
        )),
    }
}

impl CreateVideoPayload {
    pub fn normalize(self) -> Result<VideoDefinition> {
        validate_video_url(&self.url)?;
        validate_name(&self.name, "Video")?;
        Ok(VideoDefinition {
            url: self.url,
            name: self.name,
        })
    }
}

impl UpdateVideoPayload {
    pub fn normalize(self) -> Result<VideoChanges> {
        if let Some(url) = &self.url {
            validate_video_url(url)?;
        }
        if let Some(name) = &self.name {
            validate_name(name, "Video")?;
        }
        Ok(VideoChanges {
            url: self.url,
            name: self.name,
        })
    }
}

impl CreateListPayload {
    pub fn normalize(self) -> Result<ListDefinition> {
        validate_name(&self.name, "List")?;
        validate_list_slug(&self.slug)?;
        Ok(ListDefinition {
            name: self.name,
            slug: self.slug,
            video_ids: dedupe_video_ids(self.video_ids.unwrap_or_default()),
        })
    }
}

impl UpdateListPayload {
    pub fn normalize(self) -> Result<ListChanges> {
        if let Some(name) = &self.name {
            validate_name(name, "List")?;
        }
        if let Some(slug) = &self.slug {
            validate_list_slug(slug)?;
        }
        Ok(ListChanges {
            name: self.name,
            slug: self.slug,
            video_ids: self.video_ids.map(dedupe_video_ids),
        })
    }
}

fn dedupe_video_ids(ids: Vec<VideoId>) -> Vec<VideoId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

pub fn validate_video_url(url: &str) -> Result<()> {
    let len = char_len(url);
    if !(VIDEO_URL_MIN_LEN..=VIDEO_URL_MAX_LEN).contains(&len) {
        return Err(LibError::invalid_with_code(
            "video_url_length",
            "Video URL must be between 11 and 300 characters",
            anyhow!("video url length {}", len),
        ));
    }
    if !VIDEO_URL_PATTERN.is_match(url) {
        return Err(LibError::invalid_with_code(
            "video_url_pattern",
            "Video URL must be a YouTube watch or share link",
            anyhow!("video url {:?} does not match pattern", url),
        ));
    }
    Ok(())
}

fn validate_name(name: &str, entity: &'static str) -> Result<()> {
    let len = char_len(name);
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(LibError::invalid_with_code(
            "name_length",
            "Name must be between 1 and 50 characters",
            anyhow!("{} name length {}", entity, len),
        ));
    }
    Ok(())
}

/// Why a slug failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugViolation {
    Length(usize),
    Charset,
    Reserved,
}

impl fmt::Display for SlugViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlugViolation::Length(len) => write!(f, "slug length {} outside 1..=50", len),
            SlugViolation::Charset => write!(f, "slug contains characters outside [a-zA-Z0-9-]"),
            SlugViolation::Reserved => write!(f, "slug is a reserved word"),
        }
    }
}

/// Checks a slug against the public slug rules.
///
/// Reserved words are compared case-sensitively: `API` is a valid slug.
pub fn slug_violation(slug: &str) -> Option<SlugViolation> {
    let len = char_len(slug);
    if !(SLUG_MIN_LEN..=SLUG_MAX_LEN).contains(&len) {
        return Some(SlugViolation::Length(len));
    }
    if !SLUG_CHARSET.is_match(slug) {
        return Some(SlugViolation::Charset);
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Some(SlugViolation::Reserved);
    }
    None
}

pub fn validate_list_slug(slug: &str) -> Result<()> {
    match slug_violation(slug) {
        None => Ok(()),
        Some(SlugViolation::Reserved) => Err(LibError::invalid_with_code(
            "slug_reserved",
            "This slug is reserved",
            anyhow!("slug {:?} is reserved", slug),
        )),
        Some(violation) => Err(LibError::invalid_with_code(
            "slug_invalid",
            "Slug must be 1-50 letters, digits or dashes",
            anyhow!("slug {:?}: {}", slug, violation),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_list(name: &str, slug: &str) -> CreateListPayload {
        CreateListPayload {
            name: name.to_string(),
            slug: slug.to_string(),
            video_ids: None,
        }
    }

    #[test]
    fn accepts_watch_and_share_urls() {
        for url in [
            "https://youtu.be/abc12345678",
            "http://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "www.youtu.be/x",
        ] {
            validate_video_url(url).unwrap_or_else(|err| panic!("{url} rejected: {err}"));
        }
    }

    #[test]
    fn rejects_foreign_hosts_and_whitespace() {
        for url in [
            "https://vimeo.com/12345678",
            "https://youtube.com/shorts/abc",
            "https://youtu.be/abc 123",
            "ftp://youtu.be/abc12345",
        ] {
            let err = validate_video_url(url).expect_err("url should be rejected");
            assert_eq!(err.code, "video_url_pattern");
        }
    }

    #[test]
    fn url_length_bounds_are_checked_before_pattern() {
        let err = validate_video_url("youtu.be/x").expect_err("10 chars is too short");
        assert_eq!(err.code, "video_url_length");

        let long = format!("https://youtu.be/{}", "a".repeat(300));
        let err = validate_video_url(&long).expect_err("too long");
        assert_eq!(err.code, "video_url_length");
    }

    #[test]
    fn video_name_must_be_one_to_fifty_chars() {
        let payload = CreateVideoPayload {
            url: "https://youtu.be/abc12345678".to_string(),
            name: String::new(),
        };
        assert_eq!(payload.normalize().unwrap_err().code, "name_length");

        let payload = CreateVideoPayload {
            url: "https://youtu.be/abc12345678".to_string(),
            name: "é".repeat(50),
        };
        assert!(payload.normalize().is_ok());
    }

    #[test]
    fn reserved_slugs_are_rejected() {
        assert_eq!(slug_violation("api"), Some(SlugViolation::Reserved));
        assert_eq!(slug_violation("internal-use"), Some(SlugViolation::Reserved));
        assert_eq!(slug_violation("API"), None);
        assert_eq!(slug_violation("api-v2"), None);
        assert_eq!(slug_violation("my-api"), None);
    }

    #[test]
    fn slug_charset_and_length() {
        assert_eq!(slug_violation("my-list_1"), Some(SlugViolation::Charset));
        assert_eq!(slug_violation("my list"), Some(SlugViolation::Charset));
        assert_eq!(slug_violation(""), Some(SlugViolation::Length(0)));
        assert_eq!(
            slug_violation(&"a".repeat(51)),
            Some(SlugViolation::Length(51))
        );
        assert_eq!(slug_violation("my-list-1"), None);
    }

    #[test]
    fn create_list_reports_slug_codes() {
        let err = create_list("Faves", "api").normalize().unwrap_err();
        assert_eq!(err.code, "slug_reserved");

        let err = create_list("Faves", "fa ves").normalize().unwrap_err();
        assert_eq!(err.code, "slug_invalid");

        let err = create_list("", "faves").normalize().unwrap_err();
        assert_eq!(err.code, "name_length");
    }

    #[test]
    fn create_list_dedupes_initial_members_keeping_order() {
        let a = VideoId(Uuid::from_u128(1));
        let b = VideoId(Uuid::from_u128(2));
        let payload = CreateListPayload {
            video_ids: Some(vec![b, a, b]),
            ..create_list("Faves", "faves")
        };
        let definition = payload.normalize().expect("valid list");
        assert_eq!(definition.video_ids, vec![b, a]);
    }

    #[test]
    fn update_payload_only_checks_present_fields() {
        let changes = UpdateListPayload::default()
            .normalize()
            .expect("empty update is valid");
        assert_eq!(changes, ListChanges::default());

        let err = UpdateListPayload {
            slug: Some("internal-use".to_string()),
            ..Default::default()
        }
        .normalize()
        .unwrap_err();
        assert_eq!(err.code, "slug_reserved");
    }

    #[test]
    fn user_filter_accepts_only_current() {
        let query = ListListsQuery {
            eagerload: Some(true),
            user: Some("current".to_string()),
        };
        assert!(query.eager());
        assert!(query.current_user_only().unwrap());

        let query = ListVideosQuery {
            user: Some("someone".to_string()),
        };
        assert_eq!(query.current_user_only().unwrap_err().code, "user_invalid");
    }
}
