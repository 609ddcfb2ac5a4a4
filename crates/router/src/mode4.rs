//! Mode 4: the migration's terminal state. Everything delegates to the
//! unified backend; legacy receives no I/O.

use std::time::Instant;

use dualstore_core::{
    CreateOptions, DeleteOptions, GetOptions, LegacyRef, ListOptions, Mode, Resource,
    ResourceList, StoreResult, Storage, Table, UnifiedRef, UpdatedObjectInfo, UpdateOptions,
};
use tracing::warn;

use crate::metrics::RouterMetrics;

const MODE: Mode = Mode::UnifiedOnly;

/// Pass-through to the unified store. The legacy reference is retained only so
/// the lifecycle hook can still cascade to both backends.
pub struct UnifiedOnlyWriter {
    legacy: LegacyRef,
    unified: UnifiedRef,
    kind: String,
    metrics: RouterMetrics,
}

impl UnifiedOnlyWriter {
    pub fn new(kind: &str, legacy: LegacyRef, unified: UnifiedRef, metrics: RouterMetrics) -> Self {
        Self { legacy, unified, kind: kind.to_string(), metrics }
    }
}

#[async_trait::async_trait]
impl Storage for UnifiedOnlyWriter {
    fn new_resource(&self) -> Resource {
        self.unified.new_resource()
    }

    fn new_list(&self) -> ResourceList {
        self.unified.new_list()
    }

    fn namespace_scoped(&self) -> bool {
        self.unified.namespace_scoped()
    }

    fn singular_name(&self) -> String {
        self.unified.singular_name()
    }

    async fn create(&self, obj: Resource, options: &CreateOptions) -> StoreResult<Resource> {
        let op = "create";
        let start = Instant::now();
        let res = self.unified.create(obj, options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        if let Err(e) = &res {
            warn!(error = %e, kind = %self.kind, "unable to create object in storage");
        }
        res
    }

    async fn get(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<Resource> {
        let op = "get";
        let start = Instant::now();
        let res = self.unified.get(namespace, name, options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        res
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList> {
        let op = "list";
        let start = Instant::now();
        let res = self.unified.list(options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        res
    }

    async fn update(
        &self,
        namespace: Option<&str>,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        options: &UpdateOptions,
    ) -> StoreResult<(Resource, bool)> {
        let op = "update";
        let start = Instant::now();
        let res = self.unified.update(namespace, name, info, options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        if let Err(e) = &res {
            warn!(error = %e, kind = %self.kind, name = %name, "unable to update object in storage");
        }
        res
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<(Resource, bool)> {
        let op = "delete";
        let start = Instant::now();
        let res = self.unified.delete(namespace, name, options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        res
    }

    async fn delete_collection(
        &self,
        options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> StoreResult<ResourceList> {
        let op = "delete-collection";
        let start = Instant::now();
        let res = self.unified.delete_collection(options, list_options).await;
        self.metrics.record_storage_duration(res.is_err(), MODE, &self.kind, op, start);
        res
    }

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table> {
        self.unified.convert_to_table(list).await
    }

    async fn destroy(&self) {
        self.unified.destroy().await;
        self.legacy.destroy().await;
    }
}
