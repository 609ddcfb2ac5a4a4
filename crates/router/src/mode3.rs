//! Mode 3: write both backends (legacy first), serve all reads from the
//! unified store. Final validation step before legacy reads are retired.

use std::time::Instant;

use dualstore_core::{
    CreateOptions, DeleteOptions, GetOptions, LegacyRef, ListOptions, Mode, PreparedUpdate,
    Resource, ResourceList, StoreResult, Storage, Table, UnifiedRef, UpdatedObjectInfo,
    UpdateOptions, AnnotationSelector, ANNO_KEY_ORIGIN,
};
use tracing::{info, warn};

use crate::metrics::RouterMetrics;
use crate::mode2::collect_origin_keys;

const MODE: Mode = Mode::UnifiedPrimary;

/// Same write fan-out discipline as mode 2; reads go exclusively to the
/// unified backend with no legacy probe or per-item reconciliation.
pub struct UnifiedPrimaryWriter {
    legacy: LegacyRef,
    unified: UnifiedRef,
    kind: String,
    metrics: RouterMetrics,
}

impl UnifiedPrimaryWriter {
    pub fn new(kind: &str, legacy: LegacyRef, unified: UnifiedRef, metrics: RouterMetrics) -> Self {
        Self { legacy, unified, kind: kind.to_string(), metrics }
    }
}

#[async_trait::async_trait]
impl Storage for UnifiedPrimaryWriter {
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

        let start_legacy = Instant::now();
        let created = match self.legacy.create(obj.clone(), options).await {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to create object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                return Err(e);
            }
            Ok(c) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                c
            }
        };

        let mut replica = created.clone();
        for (k, v) in &obj.annotations {
            replica.annotations.entry(k.clone()).or_insert_with(|| v.clone());
        }
        replica.clear_identity();

        let start_storage = Instant::now();
        match self.unified.create(replica, options).await {
            Ok(rsp) => {
                self.metrics.record_storage_duration(false, MODE, &self.kind, op, start_storage);
                Ok(rsp)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = %self.kind,
                    name = %created.name,
                    rv = %created.resource_version,
                    "unable to create object in storage"
                );
                self.metrics.record_storage_duration(true, MODE, &self.kind, op, start_storage);
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
        let res = self.unified.get(namespace, name, options).await;
        self.metrics
            .record_storage_duration(res.is_err(), MODE, &self.kind, op, start_storage);
        if let Err(e) = &res {
            warn!(error = %e, kind = %self.kind, name = %name, "unable to get object from storage");
        }
        res
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList> {
        let op = "list";

        let start_storage = Instant::now();
        let res = self.unified.list(options).await;
        self.metrics
            .record_storage_duration(res.is_err(), MODE, &self.kind, op, start_storage);
        if let Err(e) = &res {
            warn!(error = %e, kind = %self.kind, "unable to list objects from storage");
        }
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

        let found = match self.unified.get(namespace, name, &GetOptions::default()).await {
            Ok(obj) => Some(obj),
            Err(e) if e.is_not_found() => {
                info!(kind = %self.kind, name = %name, "object not found in storage for update, creating one");
                None
            }
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "could not get object to update");
                return Err(e);
            }
        };

        let updated = info.updated_object(found.clone()).await?;

        // The desired state may have been computed from unified's prior
        // object; its version/uid must never reach legacy, which keeps or
        // mints its own identity.
        let mut legacy_desired = updated.clone();
        legacy_desired.clear_identity();

        let start_legacy = Instant::now();
        let res = self
            .legacy
            .update(namespace, name, &PreparedUpdate { updated: legacy_desired }, options)
            .await;
        self.metrics
            .record_legacy_duration(res.is_err(), MODE, &self.kind, op, start_legacy);
        let (legacy_obj, created) = match res {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "could not update in legacy storage");
                return Err(e);
            }
            Ok(v) => v,
        };

        let desired = match &found {
            Some(prior) => {
                let mut d = legacy_obj.clone();
                d.merge_metadata_from(prior);
                d.resource_version = prior.resource_version.clone();
                d.uid = prior.uid.clone();
                d
            }
            None => updated,
        };

        // The unified side may lag behind legacy; when its pre-fetch found
        // nothing the update is allowed to create the replica.
        let storage_options = UpdateOptions {
            force_allow_create: options.force_allow_create || found.is_none(),
        };
        let start_storage = Instant::now();
        match self
            .unified
            .update(namespace, name, &PreparedUpdate { updated: desired }, &storage_options)
            .await
        {
            Ok((rsp, created_storage)) => {
                self.metrics.record_storage_duration(false, MODE, &self.kind, op, start_storage);
                Ok((rsp, created_storage))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    kind = %self.kind,
                    name = %name,
                    rv = %legacy_obj.resource_version,
                    "unable to update object in storage"
                );
                self.metrics.record_storage_duration(true, MODE, &self.kind, op, start_storage);
                Ok((legacy_obj, created))
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

        let start_legacy = Instant::now();
        let legacy_res = self.legacy.delete(namespace, name, options).await;
        self.metrics
            .record_legacy_duration(legacy_res.is_err(), MODE, &self.kind, op, start_legacy);
        if let Err(e) = &legacy_res {
            if !e.is_not_found() {
                warn!(error = %e, kind = %self.kind, name = %name, "could not delete from legacy store");
            }
        }

        let start_storage = Instant::now();
        let storage_res = self.unified.delete(namespace, name, options).await;
        self.metrics
            .record_storage_duration(storage_res.is_err(), MODE, &self.kind, op, start_storage);
        match storage_res {
            // unified is read-authoritative in this mode
            Ok(v) => Ok(v),
            Err(e) => {
                if !e.is_not_found() {
                    warn!(error = %e, kind = %self.kind, name = %name, "could not delete from storage");
                }
                legacy_res
            }
        }
    }

    async fn delete_collection(
        &self,
        options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> StoreResult<ResourceList> {
        let op = "delete-collection";

        let start_legacy = Instant::now();
        let deleted = match self.legacy.delete_collection(options, list_options).await {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "failed to delete collection from legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                return Err(e);
            }
            Ok(d) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                d
            }
        };

        let (origin_keys, _) = collect_origin_keys(&deleted.items);
        if origin_keys.is_empty() {
            return Ok(deleted);
        }

        let storage_options = ListOptions {
            namespace: list_options.namespace.clone(),
            selector: Some(AnnotationSelector { key: ANNO_KEY_ORIGIN.to_string(), values: origin_keys }),
            limit: None,
        };
        let start_storage = Instant::now();
        match self.unified.delete_collection(options, &storage_options).await {
            Ok(res) => {
                self.metrics.record_storage_duration(false, MODE, &self.kind, op, start_storage);
                Ok(res)
            }
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "failed to delete collection from storage");
                self.metrics.record_storage_duration(true, MODE, &self.kind, op, start_storage);
                Ok(deleted)
            }
        }
    }

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table> {
        self.unified.convert_to_table(list).await
    }

    async fn destroy(&self) {
        self.unified.destroy().await;
        self.legacy.destroy().await;
    }
}
