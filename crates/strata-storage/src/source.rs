use std::fmt;
use std::sync::Arc;

/// Provenance tag attached to every entity.
///
/// `kind` names the subsystem that produced the entity (an importer, a
/// sync, user edits); `location` optionally narrows it down, for example to
/// the build file the entity was imported from.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntitySource {
    kind: Arc<str>,
    location: Option<Arc<str>>,
}

impl EntitySource {
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self {
            kind: Arc::from(kind.as_ref()),
            location: None,
        }
    }

    pub fn with_location(kind: impl AsRef<str>, location: impl AsRef<str>) -> Self {
        Self {
            kind: Arc::from(kind.as_ref()),
            location: Some(Arc::from(location.as_ref())),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl fmt::Debug for EntitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}({location})", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}
