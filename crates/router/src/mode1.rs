//! Mode 1: read and write legacy storage; the unified store is exercised as a
//! dark shadow under real traffic with zero blast radius.

use std::time::Instant;

use dualstore_core::{
    CreateOptions, DeleteOptions, GetOptions, LegacyRef, ListOptions, Mode, Resource,
    ResourceList, StoreResult, Storage, Table, UnifiedRef, UpdatedObjectInfo, UpdateOptions,
};
use tracing::warn;

use crate::compare::{compare_list_resource_version, compare_resource_version};
use crate::metrics::RouterMetrics;

const MODE: Mode = Mode::LegacyOnly;

/// Every operation hits the unified backend first, in the foreground, purely
/// for duration/outcome telemetry; its result and error are discarded. The
/// legacy result is what callers see.
pub struct LegacyOnlyWriter {
    legacy: LegacyRef,
    unified: UnifiedRef,
    kind: String,
    metrics: RouterMetrics,
}

impl LegacyOnlyWriter {
    pub fn new(kind: &str, legacy: LegacyRef, unified: UnifiedRef, metrics: RouterMetrics) -> Self {
        Self { legacy, unified, kind: kind.to_string(), metrics }
    }
}

#[async_trait::async_trait]
impl Storage for LegacyOnlyWriter {
    fn new_resource(&self) -> Resource {
        self.legacy.new_resource()
    }

    fn new_list(&self) -> ResourceList {
        self.legacy.new_list()
    }

    fn namespace_scoped(&self) -> bool {
        self.legacy.namespace_scoped()
    }

    fn singular_name(&self) -> String {
        self.legacy.singular_name()
    }

    async fn create(&self, obj: Resource, options: &CreateOptions) -> StoreResult<Resource> {
        let op = "create";

        let start_storage = Instant::now();
        let shadow = self.unified.create(obj.clone(), options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.create(obj, options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to create object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok(created) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let same = compare_resource_version(shadow.as_ref().ok(), Some(&created));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok(created)
            }
        }
    }

    async fn get(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &GetOptions,
    ) -> StoreResult<Resource> {
        let op = "get";

        let start_storage = Instant::now();
        let shadow = self.unified.get(namespace, name, options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.get(namespace, name, options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "unable to get object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok(obj) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let same = compare_resource_version(shadow.as_ref().ok(), Some(&obj));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok(obj)
            }
        }
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList> {
        let op = "list";

        let start_storage = Instant::now();
        let shadow = self.unified.list(options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.list(options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to list objects in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok(list) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let same = compare_list_resource_version(shadow.as_ref().ok(), Some(&list));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok(list)
            }
        }
    }

    async fn update(
        &self,
        namespace: Option<&str>,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        options: &UpdateOptions,
    ) -> StoreResult<(Resource, bool)> {
        let op = "update";

        let start_storage = Instant::now();
        let shadow = self.unified.update(namespace, name, info, options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.update(namespace, name, info, options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "unable to update object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok((obj, created)) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let shadow_obj = shadow.as_ref().ok().map(|(o, _)| o);
                let same = compare_resource_version(shadow_obj, Some(&obj));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok((obj, created))
            }
        }
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        options: &DeleteOptions,
    ) -> StoreResult<(Resource, bool)> {
        let op = "delete";

        let start_storage = Instant::now();
        let shadow = self.unified.delete(namespace, name, options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.delete(namespace, name, options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "unable to delete object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok((obj, deleted_async)) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let shadow_obj = shadow.as_ref().ok().map(|(o, _)| o);
                let same = compare_resource_version(shadow_obj, Some(&obj));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok((obj, deleted_async))
            }
        }
    }

    async fn delete_collection(
        &self,
        options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> StoreResult<ResourceList> {
        let op = "delete-collection";

        let start_storage = Instant::now();
        let shadow = self.unified.delete_collection(options, list_options).await;
        self.metrics
            .record_storage_duration(shadow.is_err(), MODE, &self.kind, op, start_storage);

        let start_legacy = Instant::now();
        let res = self.legacy.delete_collection(options, list_options).await;
        match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to delete collection in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                Err(e)
            }
            Ok(deleted) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                let same = compare_list_resource_version(shadow.as_ref().ok(), Some(&deleted));
                self.metrics.record_outcome(MODE, &self.kind, same, op);
                Ok(deleted)
            }
        }
    }

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table> {
        self.legacy.convert_to_table(list).await
    }

    async fn destroy(&self) {
        self.unified.destroy().await;
        self.legacy.destroy().await;
    }
}
