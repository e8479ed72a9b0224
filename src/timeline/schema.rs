//! Schema/capability metadata with a read-through cache
//!
//! Source environments differ in which optional fields exist on each object.
//! The normalizer only reads fields the current environment declares, so
//! field lookups go through [`SourceCapabilities`]. Capabilities are built
//! from object schemas resolved through an injectable [`SchemaCache`];
//! schema values are immutable per key so concurrent population is
//! last-writer-wins without invalidation.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cache key: environment + API version + object type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaKey {
    pub environment: String,
    pub version: String,
    pub object_type: String,
}

impl SchemaKey {
    /// Create a new key
    pub fn new(
        environment: impl Into<String>,
        version: impl Into<String>,
        object_type: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            version: version.into(),
            object_type: object_type.into(),
        }
    }
}

/// Field inventory of one object type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectSchema {
    fields: BTreeSet<String>,
}

impl ObjectSchema {
    /// Build from field names
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the object has the field
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Field names in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }
}

/// Keep only the desired fields the object actually has, in request order.
pub fn pick_existing_fields(schema: &ObjectSchema, desired: &[&str]) -> Vec<String> {
    desired
        .iter()
        .filter(|f| schema.has_field(f))
        .map(|f| f.to_string())
        .collect()
}

/// Cross-request cache of object schemas
#[async_trait]
pub trait SchemaCache: Send + Sync {
    /// Look up a cached schema
    async fn get(&self, key: &SchemaKey) -> Option<ObjectSchema>;

    /// Store a schema
    async fn put(&self, key: SchemaKey, schema: ObjectSchema);
}

/// In-memory schema cache
#[derive(Default)]
pub struct InMemorySchemaCache {
    entries: RwLock<HashMap<SchemaKey, ObjectSchema>>,
}

impl InMemorySchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached schemas
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SchemaCache for InMemorySchemaCache {
    async fn get(&self, key: &SchemaKey) -> Option<ObjectSchema> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: SchemaKey, schema: ObjectSchema) {
        self.entries.write().await.insert(key, schema);
    }
}

/// Source of truth for object schemas (e.g. a CRM describe call)
#[async_trait]
pub trait SchemaDescriber: Send + Sync {
    /// Describe one object type
    async fn describe(&self, object_type: &str) -> Result<ObjectSchema>;
}

/// Read-through schema resolver
pub struct SchemaResolver {
    cache: Arc<dyn SchemaCache>,
    describer: Arc<dyn SchemaDescriber>,
    environment: String,
    version: String,
}

impl SchemaResolver {
    /// Create a resolver for one environment and API version
    pub fn new(
        cache: Arc<dyn SchemaCache>,
        describer: Arc<dyn SchemaDescriber>,
        environment: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            describer,
            environment: environment.into(),
            version: version.into(),
        }
    }

    /// Resolve a schema, consulting the cache first.
    ///
    /// A describe failure yields `None`; the object is then treated as
    /// undeclared.
    pub async fn resolve(&self, object_type: &str) -> Option<ObjectSchema> {
        let key = SchemaKey::new(&self.environment, &self.version, object_type);
        if let Some(schema) = self.cache.get(&key).await {
            return Some(schema);
        }
        match self.describer.describe(object_type).await {
            Ok(schema) => {
                self.cache.put(key, schema.clone()).await;
                Some(schema)
            }
            Err(e) => {
                tracing::warn!(object_type, error = %e, "Schema describe failed");
                None
            }
        }
    }

    /// Resolve capabilities for a set of object types concurrently
    pub async fn capabilities(&self, object_types: &[&str]) -> SourceCapabilities {
        let lookups = object_types
            .iter()
            .map(|object_type| async move { (*object_type, self.resolve(object_type).await) });
        let resolved = futures::future::join_all(lookups).await;

        let mut caps = SourceCapabilities::default();
        for (object_type, schema) in resolved {
            if let Some(schema) = schema {
                caps.declare(object_type, schema);
            }
        }
        caps
    }
}

/// Declared field inventories per object type.
///
/// An object without a declared schema is unconstrained: every field is
/// read if present in the record. An object with a declared schema only
/// exposes its declared fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceCapabilities {
    objects: HashMap<String, ObjectSchema>,
}

impl SourceCapabilities {
    /// Unconstrained capabilities
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Declare the schema of an object type
    pub fn declare(&mut self, object_type: impl Into<String>, schema: ObjectSchema) {
        self.objects.insert(object_type.into(), schema);
    }

    /// Builder-style declare
    pub fn with_object(mut self, object_type: impl Into<String>, schema: ObjectSchema) -> Self {
        self.declare(object_type, schema);
        self
    }

    /// Whether the object declares a schema
    pub fn is_declared(&self, object_type: &str) -> bool {
        self.objects.contains_key(object_type)
    }

    /// Whether a field may be read from records of this object type
    pub fn has_field(&self, object_type: &str, field: &str) -> bool {
        self.objects
            .get(object_type)
            .map(|schema| schema.has_field(field))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDescriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaDescriber for CountingDescriber {
        async fn describe(&self, object_type: &str) -> Result<ObjectSchema> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if object_type == "Broken" {
                return Err(Error::Source("describe failed".to_string()));
            }
            Ok(ObjectSchema::from_fields(["Id", "CreatedDate", "Subject"]))
        }
    }

    #[test]
    fn test_pick_existing_fields_keeps_order() {
        let schema = ObjectSchema::from_fields(["Id", "Subject", "CreatedDate"]);
        let picked = pick_existing_fields(&schema, &["Subject", "Missing", "Id"]);
        assert_eq!(picked, vec!["Subject", "Id"]);
    }

    #[test]
    fn test_capabilities_undeclared_is_unconstrained() {
        let caps = SourceCapabilities::default()
            .with_object("Task", ObjectSchema::from_fields(["Id", "Subject"]));
        assert!(caps.has_field("Task", "Subject"));
        assert!(!caps.has_field("Task", "Description"));
        assert!(caps.has_field("Event", "Description"));
    }

    #[tokio::test]
    async fn test_resolver_reads_through_cache() {
        let cache = Arc::new(InMemorySchemaCache::new());
        let describer = Arc::new(CountingDescriber {
            calls: AtomicUsize::new(0),
        });
        let resolver = SchemaResolver::new(cache.clone(), describer.clone(), "prod", "v59.0");

        assert!(resolver.resolve("Task").await.is_some());
        assert!(resolver.resolve("Task").await.is_some());
        assert_eq!(describer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_capabilities_skip_failed_describe() {
        let resolver = SchemaResolver::new(
            Arc::new(InMemorySchemaCache::new()),
            Arc::new(CountingDescriber {
                calls: AtomicUsize::new(0),
            }),
            "sandbox",
            "v59.0",
        );
        let caps = resolver.capabilities(&["Task", "Broken"]).await;
        assert!(caps.is_declared("Task"));
        assert!(!caps.is_declared("Broken"));
        assert!(!caps.has_field("Task", "Description"));
    }

    #[tokio::test]
    async fn test_cache_keys_are_environment_scoped() {
        let cache = InMemorySchemaCache::new();
        let schema = ObjectSchema::from_fields(["Id"]);
        cache.put(SchemaKey::new("prod", "v1", "Task"), schema.clone()).await;
        assert_eq!(cache.get(&SchemaKey::new("prod", "v1", "Task")).await, Some(schema));
        assert!(cache.get(&SchemaKey::new("sandbox", "v1", "Task")).await.is_none());
    }
}
