//! dualstore core types: the resource model, dual-write modes, and the
//! capability contract both storage backends satisfy.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Annotation carrying the origin key: a backend-assigned correlation token
/// that links a unified-store record to its legacy-store counterpart.
pub const ANNO_KEY_ORIGIN: &str = "dualstore.dev/origin-key";

/// An opaque, versioned record identified by `(kind, namespace, name)`.
///
/// `resource_version` strictly increases per backend across successive
/// mutations of the same object; an empty string means "unset".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: String,
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Opaque payload; the router never interprets it.
    pub spec: serde_json::Value,
}

impl Resource {
    pub fn named(name: &str, namespace: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.map(|s| s.to_string()),
            ..Self::default()
        }
    }

    /// Origin key annotation, if the backend assigned one.
    pub fn origin_key(&self) -> Option<&str> {
        self.annotations
            .get(ANNO_KEY_ORIGIN)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Clear backend-assigned identity so the receiving backend mints its own.
    pub fn clear_identity(&mut self) {
        self.resource_version.clear();
        self.uid.clear();
    }

    /// Copy `src`'s labels over ours and merge its annotations key-by-key,
    /// with `src` winning on conflict.
    pub fn merge_metadata_from(&mut self, src: &Resource) {
        self.labels = src.labels.clone();
        for (k, v) in &src.annotations {
            self.annotations.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceList {
    pub resource_version: String,
    pub items: Vec<Resource>,
}

/// Tabular projection of a list for listing UIs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<TableColumn>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<String>,
}

// ---- CRUD options ----

#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub resource_version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Treat a missing object as a create instead of an error.
    pub force_allow_create: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub grace_period_seconds: Option<i64>,
}

/// Selector expressing `key in {values}` over annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSelector {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub namespace: Option<String>,
    pub selector: Option<AnnotationSelector>,
    pub limit: Option<usize>,
}

// ---- Dual-write mode ----

/// Active read/write fan-out policy for one resource kind.
///
/// Persisted as the literal ordinal (`"1"`..`"4"`) and advanced forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mode {
    LegacyOnly = 1,
    ShadowWrite = 2,
    UnifiedPrimary = 3,
    UnifiedOnly = 4,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::LegacyOnly
    }
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::LegacyOnly => "1",
            Mode::ShadowWrite => "2",
            Mode::UnifiedPrimary => "3",
            Mode::UnifiedOnly => "4",
        }
    }

    /// Parse a persisted ordinal. Anything unrecognized yields `None`; callers
    /// fall back to [`Mode::LegacyOnly`], never into a unified-touching mode.
    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "1" => Some(Mode::LegacyOnly),
            "2" => Some(Mode::ShadowWrite),
            "3" => Some(Mode::UnifiedPrimary),
            "4" => Some(Mode::UnifiedOnly),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---- Errors ----

/// Error surface of the storage contract. Callers see the same shape a
/// single-backend store would produce.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum StoreError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---- Update-function contract ----

/// Produces the desired object from the current one (or from nothing when the
/// update is effectively a create).
#[async_trait::async_trait]
pub trait UpdatedObjectInfo: Send + Sync {
    async fn updated_object(&self, existing: Option<Resource>) -> StoreResult<Resource>;
}

/// Update info wrapping an already-computed object, so a second backend can
/// receive exactly what the first one produced.
pub struct PreparedUpdate {
    pub updated: Resource,
}

#[async_trait::async_trait]
impl UpdatedObjectInfo for PreparedUpdate {
    async fn updated_object(&self, _existing: Option<Resource>) -> StoreResult<Resource> {
        Ok(self.updated.clone())
    }
}

// ---- Capability contract ----

/// Method set every storage backend exposes. Both backend roles satisfy the
/// same signatures so a mode strategy can treat them uniformly.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Empty object of the served kind.
    fn new_resource(&self) -> Resource;
    /// Empty list of the served kind.
    fn new_list(&self) -> ResourceList;
    fn namespace_scoped(&self) -> bool;
    fn singular_name(&self) -> String;

    async fn get(&self, namespace: Option<&str>, name: &str, options: &GetOptions)
        -> StoreResult<Resource>;

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList>;

    async fn create(&self, obj: Resource, options: &CreateOptions) -> StoreResult<Resource>;

    /// Returns the stored object and whether the call created it.
    async fn update(
        &self,
        namespace: Option<&str>,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        options: &UpdateOptions,
    ) -> StoreResult<(Resource, bool)>;

    /// Returns the deleted object and whether deletion completes asynchronously.
    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<(Resource, bool)>;

    async fn delete_collection(
        &self,
        options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> StoreResult<ResourceList>;

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table>;

    /// Shutdown hook; releases backend resources.
    async fn destroy(&self);
}

/// The pre-migration, authoritative storage implementation.
pub trait LegacyBackend: Storage {}

/// The target storage implementation being migrated to.
pub trait UnifiedBackend: Storage {}

pub type LegacyRef = Arc<dyn LegacyBackend>;
pub type UnifiedRef = Arc<dyn UnifiedBackend>;
