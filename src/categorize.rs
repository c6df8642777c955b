//! Change categorization.
//!
//! Maps each delta entry's path to an entity-type bucket via a fixed
//! ordered table of path rules. Unknown paths are dropped rather than
//! erroring, so future manifest categories degrade gracefully on old
//! consumers.

use crate::detect::{ChangeSet, ChangedFile};
use crate::manifest::{is_index_path, BLOG_PATH};

/// Entity-type buckets, in the order they appear in the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Blog,
    Categories,
    Tags,
    Posts,
    Drafts,
    Sidebar,
    StaticFiles,
    EmbedImages,
    Themes,
}

/// Fixed ordered rule table: exact match for the blog file, prefix match
/// for everything else.
const RULES: &[(&str, bool, Bucket)] = &[
    (BLOG_PATH, true, Bucket::Blog),
    ("categories/", false, Bucket::Categories),
    ("tags/", false, Bucket::Tags),
    ("posts/", false, Bucket::Posts),
    ("drafts/", false, Bucket::Drafts),
    ("sidebar/", false, Bucket::Sidebar),
    ("static-files/", false, Bucket::StaticFiles),
    ("embed-images/", false, Bucket::EmbedImages),
    ("themes/", false, Bucket::Themes),
];

/// Classify a single path. `None` for index files and unknown categories.
pub fn bucket_for_path(path: &str) -> Option<Bucket> {
    if is_index_path(path) {
        return None;
    }
    for (pattern, exact, bucket) in RULES {
        let matched = if *exact {
            path == *pattern
        } else {
            path.starts_with(pattern)
        };
        if matched {
            return Some(*bucket);
        }
    }
    tracing::debug!(path, "unrecognized manifest path, ignoring");
    None
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketChanges {
    pub new: Vec<ChangedFile>,
    pub modified: Vec<ChangedFile>,
    pub deleted: Vec<ChangedFile>,
}

impl BucketChanges {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorizedChanges {
    pub blog: BucketChanges,
    pub categories: BucketChanges,
    pub tags: BucketChanges,
    pub posts: BucketChanges,
    pub drafts: BucketChanges,
    pub sidebar: BucketChanges,
    pub static_files: BucketChanges,
    pub embed_images: BucketChanges,
    pub themes: BucketChanges,
}

impl CategorizedChanges {
    fn bucket_mut(&mut self, bucket: Bucket) -> &mut BucketChanges {
        match bucket {
            Bucket::Blog => &mut self.blog,
            Bucket::Categories => &mut self.categories,
            Bucket::Tags => &mut self.tags,
            Bucket::Posts => &mut self.posts,
            Bucket::Drafts => &mut self.drafts,
            Bucket::Sidebar => &mut self.sidebar,
            Bucket::StaticFiles => &mut self.static_files,
            Bucket::EmbedImages => &mut self.embed_images,
            Bucket::Themes => &mut self.themes,
        }
    }
}

/// Partition a change set into per-entity-type buckets.
pub fn categorize(changes: &ChangeSet) -> CategorizedChanges {
    let mut out = CategorizedChanges::default();
    for file in &changes.new_files {
        if let Some(bucket) = bucket_for_path(&file.path) {
            out.bucket_mut(bucket).new.push(file.clone());
        }
    }
    for file in &changes.modified_files {
        if let Some(bucket) = bucket_for_path(&file.path) {
            out.bucket_mut(bucket).modified.push(file.clone());
        }
    }
    for file in &changes.deleted_files {
        if let Some(bucket) = bucket_for_path(&file.path) {
            out.bucket_mut(bucket).deleted.push(file.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(path: &str) -> ChangedFile {
        ChangedFile {
            path: path.to_string(),
            hash: "h".into(),
            content_hash: None,
            size: 1,
            encrypted: false,
            iv: None,
        }
    }

    #[test]
    fn test_bucket_for_path() {
        assert_eq!(bucket_for_path("blog.json"), Some(Bucket::Blog));
        assert_eq!(bucket_for_path("categories/c1.json"), Some(Bucket::Categories));
        assert_eq!(bucket_for_path("drafts/d.json.enc"), Some(Bucket::Drafts));
        assert_eq!(bucket_for_path("themes/minimal.json"), Some(Bucket::Themes));
        assert_eq!(bucket_for_path("static-files/a.png"), Some(Bucket::StaticFiles));
    }

    #[test]
    fn test_index_files_excluded() {
        assert_eq!(bucket_for_path("posts/index.json"), None);
        assert_eq!(bucket_for_path("drafts/index.json.enc"), None);
    }

    #[test]
    fn test_unknown_paths_dropped() {
        assert_eq!(bucket_for_path("podcasts/ep1.json"), None);
        assert_eq!(bucket_for_path("manifest.json"), None);
    }

    #[test]
    fn test_categorize_partitions_by_state() {
        let changes = ChangeSet {
            has_changes: true,
            local_version: None,
            remote_version: "v".into(),
            new_files: vec![changed("posts/p1.json"), changed("tags/t1.json")],
            modified_files: vec![changed("posts/p2.json")],
            deleted_files: vec![changed("categories/c1.json")],
        };
        let cat = categorize(&changes);
        assert_eq!(cat.posts.new.len(), 1);
        assert_eq!(cat.posts.modified.len(), 1);
        assert_eq!(cat.tags.new.len(), 1);
        assert_eq!(cat.categories.deleted.len(), 1);
        assert!(cat.drafts.is_empty());
    }
}
