use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Canonical identity of a watched tag: `{project}/{repository}:{tag}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&TagCoordinates> for EntityKey {
    fn from(c: &TagCoordinates) -> Self {
        EntityKey(format!("{}/{}:{}", c.project, c.repository, c.tag))
    }
}

/// Location of one image tag inside a registry endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagCoordinates {
    pub project: String,
    pub repository: String,
    pub tag: String,
}

impl TagCoordinates {
    pub fn new(
        project: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// `{project}/{repository}`, the image name as the registry API expects it
    pub fn image_name(&self) -> String {
        format!("{}/{}", self.project, self.repository)
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::from(self)
    }
}

/// Watched tag together with the last fingerprint observed for it.
///
/// Only the owning watcher loop updates `fingerprint`; everyone else sees snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub coordinates: TagCoordinates,
    pub fingerprint: Option<String>,
}

impl WatchTarget {
    pub fn new(coordinates: TagCoordinates) -> Self {
        Self {
            coordinates,
            fingerprint: None,
        }
    }

    /// Records `fingerprint`; returns false when it equals the stored one
    pub(crate) fn observe(
        &mut self,
        fingerprint: String,
    ) -> bool {
        if self.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return false;
        }
        self.fingerprint = Some(fingerprint);
        true
    }
}

/// Kind of change carried by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// Change notification delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub target: WatchTarget,
}

impl ChangeEvent {
    pub fn new(
        kind: EventKind,
        target: WatchTarget,
    ) -> Self {
        Self { kind, target }
    }

    pub fn modified(target: WatchTarget) -> Self {
        Self::new(EventKind::Modified, target)
    }

    pub fn deleted(target: WatchTarget) -> Self {
        Self::new(EventKind::Deleted, target)
    }
}
