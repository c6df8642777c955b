//! Entity data model for replicable blog content.
//!
//! Every replicable entity has a local identifier (storage-engine key) and,
//! once it has been published or synced, a `sync_id` that stays stable
//! across copies. Manifest paths and cross-entity references always use the
//! stable id (`sync_id` falling back to `local_id`), so repeated syncs of
//! unchanged content never regenerate paths.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Common surface of every replicable entity.
pub trait SyncEntity {
    fn local_id(&self) -> &str;
    fn set_local_id(&mut self, id: String);
    fn sync_id(&self) -> Option<&str>;
    fn set_sync_id(&mut self, id: String);
    fn modified_at(&self) -> DateTime<Utc>;

    /// Identifier used in manifest paths and cross-entity references.
    /// Never changes once a `sync_id` has been assigned.
    fn stable_id(&self) -> &str {
        self.sync_id().unwrap_or_else(|| self.local_id())
    }
}

macro_rules! impl_sync_entity {
    ($ty:ty) => {
        impl SyncEntity for $ty {
            fn local_id(&self) -> &str {
                &self.local_id
            }
            fn set_local_id(&mut self, id: String) {
                self.local_id = id;
            }
            fn sync_id(&self) -> Option<&str> {
                self.sync_id.as_deref()
            }
            fn set_sync_id(&mut self, id: String) {
                self.sync_id = Some(id);
            }
            fn modified_at(&self) -> DateTime<Utc> {
                self.modified_at
            }
        }
    };
}

/// Blog-level settings. Also carries the draft-encryption salt so that a
/// consumer holding the password can derive the same key as the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSettings {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub base_url: String,
    /// Base64 PBKDF2 salt for draft encryption, if drafts are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_salt: Option<String>,
    /// Identifier of the active custom theme, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_theme: Option<String>,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Storage-engine key. Never serialized: the wire identity is the
    /// stable sync id.
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(Category);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub name: String,
    pub slug: String,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(Tag);

/// Rich content embedded in a post body.
///
/// Tagged variants rather than one struct with nullable fields: an embed is
/// exactly one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Embed {
    #[serde(rename_all = "camelCase")]
    YouTube { video_id: String },
    #[serde(rename_all = "camelCase")]
    Link {
        url: String,
        #[serde(default)]
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        filename: String,
        #[serde(default)]
        alt: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub title: String,
    pub slug: String,
    pub body: String,
    /// Stable id of the category on the wire; local id in the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    /// Stable ids on the wire; local ids in the store.
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(Post);

/// Unpublished post. Replicated only in encrypted form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(Draft);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarLink {
    pub label: String,
    pub url: String,
}

/// Sidebar widget payload. Link lists are nested inline, not synced as
/// separate entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SidebarContent {
    Text { body: String },
    LinkList { links: Vec<SidebarLink> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarItem {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub title: String,
    pub content: SidebarContent,
    pub position: u32,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(SidebarItem);

/// Metadata row for an uploaded static file. The filename doubles as the
/// stable id; the payload lives in blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticFileMeta {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub filename: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(StaticFileMeta);

/// Custom theme. The identifier is already globally stable, so it serves as
/// both local and sync id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(skip)]
    pub local_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<String>,
    pub name: String,
    /// Template name -> template source.
    pub templates: std::collections::BTreeMap<String, String>,
    pub modified_at: DateTime<Utc>,
}

impl_sync_entity!(Theme);

/// Extract the stable id from a manifest entity path, e.g.
/// `posts/abc123.json` -> `abc123`, `drafts/xyz.json.enc` -> `xyz`.
pub fn stable_id_from_path(path: &str) -> Option<&str> {
    let filename = path.rsplit('/').next()?;
    let id = filename
        .strip_suffix(".json.enc")
        .or_else(|| filename.strip_suffix(".json"))
        .unwrap_or(filename);
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
