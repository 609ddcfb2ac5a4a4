//! Mode 2: write both backends (legacy first), read legacy as the source of
//! truth, with unified verified in the background on Get and reconciled
//! per-item on List.

use std::time::{Duration, Instant};

use dualstore_core::{
    AnnotationSelector, CreateOptions, DeleteOptions, GetOptions, LegacyRef, ListOptions, Mode,
    PreparedUpdate, Resource, ResourceList, StoreResult, Storage, Table, UnifiedRef,
    UpdatedObjectInfo, UpdateOptions, ANNO_KEY_ORIGIN,
};
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::compare::compare_resource_version;
use crate::metrics::RouterMetrics;

const MODE: Mode = Mode::ShadowWrite;

/// Upper bound on the background Get probe against the unified store. The
/// deadline is independent of the caller's lifetime so slow clients do not
/// under-sample the probe.
const STORAGE_GET_TIMEOUT: Duration = Duration::from_secs(10);

/// Legacy remains authoritative for reads; every successful legacy write is
/// replicated into the unified store so it becomes eligible to take over.
pub struct ShadowWriteWriter {
    legacy: LegacyRef,
    unified: UnifiedRef,
    kind: String,
    metrics: RouterMetrics,
}

impl ShadowWriteWriter {
    pub fn new(kind: &str, legacy: LegacyRef, unified: UnifiedRef, metrics: RouterMetrics) -> Self {
        Self { legacy, unified, kind: kind.to_string(), metrics }
    }
}

#[async_trait::async_trait]
impl Storage for ShadowWriteWriter {
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

        // Replica destined for the unified store: legacy metadata wins; caller
        // annotations legacy did not echo back are kept; identity is cleared
        // so unified mints its own resource version and uid.
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
                // legacy succeeded; the create stands
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

        let start_legacy = Instant::now();
        let res = match self.legacy.get(namespace, name, options).await {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, name = %name, "unable to get object in legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                return Err(e);
            }
            Ok(obj) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                obj
            }
        };

        // Detached probe of the unified store; populates latency/outcome
        // telemetry only and never blocks or fails the caller.
        let unified = self.unified.clone();
        let metrics = self.metrics.clone();
        let kind = self.kind.clone();
        let namespace = namespace.map(|s| s.to_string());
        let name = name.to_string();
        let options = options.clone();
        let legacy_obj = res.clone();
        tokio::spawn(async move {
            let start_storage = Instant::now();
            let probe =
                tokio::time::timeout(STORAGE_GET_TIMEOUT, unified.get(namespace.as_deref(), &name, &options))
                    .await;
            let (failed, same) = match probe {
                Ok(Ok(obj)) => (false, compare_resource_version(Some(&obj), Some(&legacy_obj))),
                Ok(Err(e)) => {
                    debug!(error = %e, kind = %kind, name = %name, "storage get probe failed");
                    (true, false)
                }
                Err(_) => {
                    debug!(kind = %kind, name = %name, "storage get probe timed out");
                    (true, false)
                }
            };
            metrics.record_storage_duration(failed, MODE, &kind, op, start_storage);
            metrics.record_outcome(MODE, &kind, same, op);
        });

        Ok(res)
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList> {
        let op = "list";

        let start_legacy = Instant::now();
        let mut legacy_list = match self.legacy.list(options).await {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to list objects from legacy storage");
                self.metrics.record_legacy_duration(true, MODE, &self.kind, op, start_legacy);
                return Err(e);
            }
            Ok(l) => {
                self.metrics.record_legacy_duration(false, MODE, &self.kind, op, start_legacy);
                l
            }
        };

        let (origin_keys, index) = collect_origin_keys(&legacy_list.items);
        if origin_keys.is_empty() {
            // nothing replicated yet; nothing to cross-check
            return Ok(legacy_list);
        }

        let storage_options = ListOptions {
            namespace: options.namespace.clone(),
            selector: Some(AnnotationSelector { key: ANNO_KEY_ORIGIN.to_string(), values: origin_keys }),
            limit: None,
        };
        let start_storage = Instant::now();
        let storage_list = match self.unified.list(&storage_options).await {
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "unable to list objects from storage");
                self.metrics.record_storage_duration(true, MODE, &self.kind, op, start_storage);
                // read shadowing failure is invisible to callers
                return Ok(legacy_list);
            }
            Ok(l) => {
                self.metrics.record_storage_duration(false, MODE, &self.kind, op, start_storage);
                l
            }
        };

        // Unified data takes precedence per-item once it exists, even though
        // legacy drives the search; order stays legacy's.
        for obj in storage_list.items {
            if let Some(&i) = index.get(obj.name.as_str()) {
                legacy_list.items[i] = obj;
            }
        }
        Ok(legacy_list)
    }

    async fn update(
        &self,
        namespace: Option<&str>,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        options: &UpdateOptions,
    ) -> StoreResult<(Resource, bool)> {
        let op = "update";

        // Pre-fetch the unified object; not found means the destination update
        // will effectively be a create.
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

        // With a prior unified object, carry its identity forward so the
        // destination update is idempotent against what unified already
        // holds; without one, unified receives the caller-computed state and
        // mints its own identity.
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
                // unified already owns identity fields on the write path
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
        let res = self.legacy.delete(namespace, name, options).await;
        self.metrics
            .record_legacy_duration(res.is_err(), MODE, &self.kind, op, start_legacy);
        if let Err(e) = &res {
            if !e.is_not_found() {
                warn!(error = %e, kind = %self.kind, name = %name, "could not delete from legacy store");
            }
        }

        // Best effort on the unified side regardless of the legacy outcome;
        // already-absent is an acceptable terminal state.
        let start_storage = Instant::now();
        let storage_res = self.unified.delete(namespace, name, options).await;
        self.metrics
            .record_storage_duration(storage_res.is_err(), MODE, &self.kind, op, start_storage);
        if let Err(e) = &storage_res {
            if !e.is_not_found() {
                warn!(error = %e, kind = %self.kind, name = %name, "could not delete from duplicate storage");
            }
        }

        res
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

        // Only the items the legacy call actually deleted are selected for
        // deletion in the unified store.
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
            Ok(_) => {
                self.metrics.record_storage_duration(false, MODE, &self.kind, op, start_storage)
            }
            Err(e) => {
                warn!(error = %e, kind = %self.kind, "failed to delete collection from storage");
                self.metrics.record_storage_duration(true, MODE, &self.kind, op, start_storage);
            }
        }

        Ok(deleted)
    }

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table> {
        self.unified.convert_to_table(list).await
    }

    async fn destroy(&self) {
        self.unified.destroy().await;
        self.legacy.destroy().await;
    }
}

/// Origin keys present in `items`, plus each item's index by name so a
/// unified-store object can later replace its legacy counterpart in place.
pub(crate) fn collect_origin_keys(items: &[Resource]) -> (Vec<String>, FxHashMap<String, usize>) {
    let mut keys = Vec::new();
    let mut index = FxHashMap::default();
    for (i, item) in items.iter().enumerate() {
        if let Some(k) = item.origin_key() {
            keys.push(k.to_string());
        }
        index.insert(item.name.clone(), i);
    }
    (keys, index)
}
