#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dualstore_core::{
    CreateOptions, DeleteOptions, GetOptions, LegacyBackend, ListOptions, Resource, ResourceList,
    StoreError, StoreResult, Storage, Table, TableColumn, TableRow, UnifiedBackend,
    UpdatedObjectInfo, UpdateOptions, ANNO_KEY_ORIGIN,
};

/// Scripted in-memory backend: call log, per-operation failure injection, and
/// seeded resource versions. Serves as both the legacy and the unified role.
pub struct MockBackend {
    label: &'static str,
    scoped: bool,
    items: Mutex<Vec<Resource>>,
    next_rv: AtomicU64,
    calls: Mutex<Vec<&'static str>>,
    fail: Mutex<HashSet<&'static str>>,
}

impl MockBackend {
    pub fn new(label: &'static str) -> Arc<Self> {
        Self::with_next_rv(label, 1)
    }

    /// Backend whose next successful write is stamped with `rv`.
    pub fn with_next_rv(label: &'static str, rv: u64) -> Arc<Self> {
        Arc::new(Self {
            label,
            scoped: true,
            items: Mutex::new(Vec::new()),
            next_rv: AtomicU64::new(rv),
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(HashSet::new()),
        })
    }

    pub fn seed(&self, r: Resource) {
        self.items.lock().unwrap().push(r);
    }

    pub fn fail_on(&self, op: &'static str) {
        self.fail.lock().unwrap().insert(op);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    pub fn find(&self, name: &str) -> Option<Resource> {
        self.items.lock().unwrap().iter().find(|r| r.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    fn enter(&self, op: &'static str) -> StoreResult<()> {
        self.calls.lock().unwrap().push(op);
        if self.fail.lock().unwrap().contains(op) {
            return Err(StoreError::Internal(format!("{}: {} failed", self.label, op)));
        }
        Ok(())
    }

    fn bump(&self) -> String {
        self.next_rv.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn matches(r: &Resource, options: &ListOptions) -> bool {
        if let Some(ns) = &options.namespace {
            if r.namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }
        if let Some(sel) = &options.selector {
            return r
                .annotations
                .get(&sel.key)
                .map(|v| sel.values.iter().any(|w| w == v))
                .unwrap_or(false);
        }
        true
    }
}

#[async_trait::async_trait]
impl Storage for MockBackend {
    fn new_resource(&self) -> Resource {
        Resource::default()
    }

    fn new_list(&self) -> ResourceList {
        ResourceList::default()
    }

    fn namespace_scoped(&self) -> bool {
        self.scoped
    }

    fn singular_name(&self) -> String {
        self.label.to_string()
    }

    async fn get(
        &self,
        namespace: Option<&str>,
        name: &str,
        _options: &GetOptions,
    ) -> StoreResult<Resource> {
        self.enter("get")?;
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name && (namespace.is_none() || r.namespace.as_deref() == namespace))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self, options: &ListOptions) -> StoreResult<ResourceList> {
        self.enter("list")?;
        let items: Vec<Resource> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::matches(r, options))
            .cloned()
            .collect();
        Ok(ResourceList {
            resource_version: self.next_rv.load(Ordering::SeqCst).to_string(),
            items,
        })
    }

    async fn create(&self, obj: Resource, _options: &CreateOptions) -> StoreResult<Resource> {
        self.enter("create")?;
        let mut stored = obj;
        if stored.uid.is_empty() {
            stored.uid = format!("{}-{}", self.label, uuid::Uuid::new_v4());
        }
        stored.resource_version = self.bump();
        self.items.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        namespace: Option<&str>,
        name: &str,
        info: &dyn UpdatedObjectInfo,
        options: &UpdateOptions,
    ) -> StoreResult<(Resource, bool)> {
        self.enter("update")?;
        let existing = self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.name == name && (namespace.is_none() || r.namespace.as_deref() == namespace))
            .cloned();
        let created = existing.is_none();
        if created && !options.force_allow_create {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let mut stored = info.updated_object(existing.clone()).await?;
        if stored.uid.is_empty() {
            // identity is stable across updates of the same object
            stored.uid = existing
                .map(|r| r.uid)
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| format!("{}-{}", self.label, uuid::Uuid::new_v4()));
        }
        stored.resource_version = self.bump();
        let mut items = self.items.lock().unwrap();
        match items.iter().position(|r| r.name == name) {
            Some(i) => items[i] = stored.clone(),
            None => items.push(stored.clone()),
        }
        Ok((stored, created))
    }

    async fn delete(
        &self,
        namespace: Option<&str>,
        name: &str,
        _options: &DeleteOptions,
    ) -> StoreResult<(Resource, bool)> {
        self.enter("delete")?;
        let mut items = self.items.lock().unwrap();
        match items
            .iter()
            .position(|r| r.name == name && (namespace.is_none() || r.namespace.as_deref() == namespace))
        {
            Some(i) => Ok((items.remove(i), false)),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn delete_collection(
        &self,
        _options: &DeleteOptions,
        list_options: &ListOptions,
    ) -> StoreResult<ResourceList> {
        self.enter("delete-collection")?;
        let mut items = self.items.lock().unwrap();
        let (deleted, kept): (Vec<Resource>, Vec<Resource>) =
            items.drain(..).partition(|r| Self::matches(r, list_options));
        *items = kept;
        Ok(ResourceList {
            resource_version: self.next_rv.load(Ordering::SeqCst).to_string(),
            items: deleted,
        })
    }

    async fn convert_to_table(&self, list: &ResourceList) -> StoreResult<Table> {
        self.enter("convert-to-table")?;
        Ok(Table {
            columns: vec![
                TableColumn { name: "Name".into(), kind: "string".into() },
                TableColumn { name: "Version".into(), kind: "string".into() },
            ],
            rows: list
                .items
                .iter()
                .map(|r| TableRow { cells: vec![r.name.clone(), r.resource_version.clone()] })
                .collect(),
        })
    }

    async fn destroy(&self) {
        self.calls.lock().unwrap().push("destroy");
    }
}

impl LegacyBackend for MockBackend {}
impl UnifiedBackend for MockBackend {}

/// Resource carrying an origin key, as a backend that already replicated the
/// object would return it.
pub fn res_with_origin(name: &str, ns: &str, rv: &str, uid: &str, origin: &str) -> Resource {
    let mut r = res(name, ns, rv, uid);
    r.annotations.insert(ANNO_KEY_ORIGIN.to_string(), origin.to_string());
    r
}

pub fn res(name: &str, ns: &str, rv: &str, uid: &str) -> Resource {
    let mut r = Resource::named(name, Some(ns));
    r.resource_version = rv.to_string();
    r.uid = uid.to_string();
    r
}

/// Update function used by callers in tests: sets `spec` on the current
/// object, or on a fresh one when nothing exists yet.
pub struct SetSpec {
    pub name: String,
    pub namespace: Option<String>,
    pub spec: serde_json::Value,
}

#[async_trait::async_trait]
impl UpdatedObjectInfo for SetSpec {
    async fn updated_object(&self, existing: Option<Resource>) -> StoreResult<Resource> {
        let mut base = existing
            .unwrap_or_else(|| Resource::named(&self.name, self.namespace.as_deref()));
        base.spec = self.spec.clone();
        Ok(base)
    }
}

/// Poll until `cond` holds; background work in the router is detached, so
/// tests observe it by waiting rather than joining.
pub async fn wait_for(cond: impl Fn() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 1s");
}
