use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::error::AppError;

/// Helm release statuses eligible for retention consideration.
pub const RETAINABLE_STATUSES: [&str; 2] = ["deployed", "superseded"];

/// A `registry/name:tag` triple as it appears in a pod spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaggedImage {
    pub registry: String,
    pub name: String,
    pub tag: String,
}

impl TaggedImage {
    /// Parse a combined `registry/name:tag` reference.
    ///
    /// The tag is everything after the last `:`; the final path segment
    /// before it is the image name and the remaining path (joined by `/`)
    /// is the registry. A reference with no `/` has an empty registry.
    pub fn parse(payload: &str) -> Result<Self, AppError> {
        let (path, tag) = payload
            .rsplit_once(':')
            .ok_or_else(|| AppError::MalformedImageReference(payload.to_string()))?;

        let (registry, name) = match path.rsplit_once('/') {
            Some((registry, name)) => (registry, name),
            None => ("", path),
        };

        if name.is_empty() || tag.is_empty() {
            return Err(AppError::MalformedImageReference(payload.to_string()));
        }

        Ok(Self {
            registry: registry.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Compare tags between two references to the same repository.
    ///
    /// Returns `None` when registry or name differ: tag order is only
    /// meaningful within a single repository, and pretending otherwise
    /// would not be a total order. Callers must handle the `None` case
    /// instead of sorting mixed sets.
    #[allow(dead_code)]
    pub fn cmp_tag_within_repository(&self, other: &Self) -> Option<Ordering> {
        if self.registry == other.registry && self.name == other.name {
            Some(self.tag.cmp(&other.tag))
        } else {
            None
        }
    }
}

impl fmt::Display for TaggedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.name, self.tag)
    }
}

/// A stored image tag together with its registry push timestamp.
///
/// Identity (equality, hashing) is the `registry/name:tag` triple alone, so
/// set membership matches [`TaggedImage`] semantics; `created_on` is payload.
#[derive(Debug, Clone)]
pub struct RegistryTaggedImage {
    pub registry: String,
    pub name: String,
    pub tag: String,
    pub created_on: DateTime<Utc>,
}

impl PartialEq for RegistryTaggedImage {
    fn eq(&self, other: &Self) -> bool {
        self.registry == other.registry && self.name == other.name && self.tag == other.tag
    }
}

impl Eq for RegistryTaggedImage {}

impl Hash for RegistryTaggedImage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.registry.hash(state);
        self.name.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for RegistryTaggedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.name, self.tag)
    }
}

/// One Helm release revision, backed by a release secret.
///
/// `name` is the raw storage object name, `sh.helm.release.v1.<lineage>.v<revision>`.
/// Identity is `name` alone.
#[derive(Debug, Clone)]
pub struct HelmDeployment {
    pub namespace: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl HelmDeployment {
    /// Parse one `namespace,name,status,timestamp` line as emitted by the
    /// release discovery command.
    pub fn from_csv_line(line: &str) -> Result<Self, AppError> {
        let fields: Vec<&str> = line.split(',').collect();
        let (namespace, name, status, timestamp) = match fields.as_slice() {
            [namespace, name, status, timestamp] => (*namespace, *name, *status, *timestamp),
            _ => return Err(AppError::MalformedReleaseEntry(line.to_string())),
        };

        if namespace.is_empty() || name.is_empty() {
            return Err(AppError::MalformedReleaseEntry(line.to_string()));
        }

        let created_at = DateTime::parse_from_rfc3339(timestamp)?.with_timezone(&Utc);

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            status: status.to_string(),
            created_at,
        })
    }

    /// The stable identifier shared by every revision of the same release:
    /// the second-to-last dot-separated segment of the storage name.
    pub fn lineage(&self) -> Result<&str, AppError> {
        let mut it = self.name.rsplit('.');
        it.next();
        it.next()
            .ok_or_else(|| AppError::MalformedReleaseEntry(self.name.clone()))
    }

    /// The numeric revision: the last dot-separated segment with its leading
    /// `v` stripped. Storage names are not zero-padded, so ordering must go
    /// through this rather than the raw name (lexicographic order puts `v9`
    /// after `v10`).
    pub fn revision(&self) -> Result<u64, AppError> {
        let last = self
            .name
            .rsplit('.')
            .next()
            .ok_or_else(|| AppError::MalformedReleaseEntry(self.name.clone()))?;
        last.strip_prefix('v')
            .unwrap_or(last)
            .parse()
            .map_err(|_| AppError::MalformedReleaseEntry(self.name.clone()))
    }

    /// Whether this release's status makes it eligible for retention.
    pub fn is_retainable(&self) -> bool {
        RETAINABLE_STATUSES.contains(&self.status.as_str())
    }
}

impl PartialEq for HelmDeployment {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for HelmDeployment {}

impl Hash for HelmDeployment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
