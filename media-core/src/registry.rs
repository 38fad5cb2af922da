use std::collections::HashMap;
use std::fmt;

/// Persisted entity kinds known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Media,
    SubjectMedia,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Media => write!(f, "media"),
            EntityKind::SubjectMedia => write!(f, "subject_media"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: &'static str,
    pub unique: bool,
}

impl IndexSpec {
    pub const fn unique(field: &'static str) -> Self {
        Self { field, unique: true }
    }

    pub const fn plain(field: &'static str) -> Self {
        Self { field, unique: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampPolicy {
    None,
    CreatedOnly,
    CreatedAndUpdated,
}

/// How one entity kind is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub storage_name: &'static str,
    pub indexes: Vec<IndexSpec>,
    pub timestamps: TimestampPolicy,
}

impl EntitySpec {
    pub fn unique_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.indexes.iter().filter(|i| i.unique).map(|i| i.field)
    }

    pub fn is_unique(&self, field: &str) -> bool {
        self.indexes.iter().any(|i| i.unique && i.field == field)
    }
}

/// A static table of entity kinds to storage layout, built once at startup
/// and handed to the persistence collaborators.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    entities: HashMap<EntityKind, EntitySpec>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// The layout the pipeline ships with: media documents unique on `url`,
    /// subject media lists unique on `subject_id`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            EntityKind::Media,
            EntitySpec {
                storage_name: "media",
                indexes: vec![IndexSpec::unique("url")],
                timestamps: TimestampPolicy::CreatedOnly,
            },
        );
        registry.register(
            EntityKind::SubjectMedia,
            EntitySpec {
                storage_name: "subject_media",
                indexes: vec![IndexSpec::unique("subject_id"), IndexSpec::plain("media.media_id")],
                timestamps: TimestampPolicy::CreatedAndUpdated,
            },
        );
        registry
    }

    pub fn register(&mut self, kind: EntityKind, spec: EntitySpec) {
        self.entities.insert(kind, spec);
    }

    pub fn get(&self, kind: EntityKind) -> Option<&EntitySpec> {
        self.entities.get(&kind)
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        self.entities.keys().copied().collect()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_has_unique_media_url() {
        let registry = EntityRegistry::standard();
        let media = registry.get(EntityKind::Media).unwrap();

        assert_eq!(media.storage_name, "media");
        assert!(media.is_unique("url"));
        assert!(!media.is_unique("file_name"));
        assert_eq!(media.unique_fields().collect::<Vec<_>>(), vec!["url"]);
    }

    #[test]
    fn register_replaces_existing_spec() {
        let mut registry = EntityRegistry::new();
        assert!(registry.get(EntityKind::Media).is_none());

        registry.register(
            EntityKind::Media,
            EntitySpec {
                storage_name: "uploads",
                indexes: vec![],
                timestamps: TimestampPolicy::None,
            },
        );
        assert_eq!(registry.get(EntityKind::Media).unwrap().storage_name, "uploads");
        assert_eq!(registry.kinds(), vec![EntityKind::Media]);
    }
}
