use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::client::{BatchOp, StateStore};
use crate::error::{StoreError, StoreResult};
use crate::watch::{EventLog, EventType};
use pkg_constants::state::{
    EVENT_CHANNEL_CAPACITY, EVENT_LOG_CAPACITY, INDEX_PREFIX, REGISTRY_PREFIX,
};
use pkg_types::meta::{ObjectKey, Resource};
use pkg_types::validate::validate_name;

type IndexFn = Arc<dyn Fn(&[u8]) -> StoreResult<Vec<String>> + Send + Sync>;

struct IndexSpec {
    name: String,
    extract: IndexFn,
}

/// Typed object registry on top of [`StateStore`].
///
/// Objects live at `/registry/<kind>/<namespace>/<name>` as JSON. Every write
/// is a single SlateDB batch covering the object and its index entries, and
/// is published on `event_log` once committed. Writes are serialized so the
/// resource-version check and the write are atomic; reads never block.
#[derive(Clone)]
pub struct Registry {
    store: StateStore,
    pub event_log: EventLog,
    indexes: Arc<RwLock<HashMap<&'static str, Vec<IndexSpec>>>>,
    write_lock: Arc<Mutex<()>>,
}

pub fn object_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}/{}", REGISTRY_PREFIX, kind, namespace, name)
}

fn kind_prefix(kind: &str) -> String {
    format!("{}/{}/", REGISTRY_PREFIX, kind)
}

fn namespace_prefix(kind: &str, namespace: &str) -> String {
    format!("{}/{}/{}/", REGISTRY_PREFIX, kind, namespace)
}

fn index_prefix(kind: &str, index: &str) -> String {
    format!("{}/{}/{}/", INDEX_PREFIX, kind, index)
}

fn index_value_prefix(kind: &str, index: &str, namespace: &str, value: &str) -> String {
    format!("{}/{}/{}/{}/{}/", INDEX_PREFIX, kind, index, namespace, value)
}

fn invalid<T: Resource>(key: &ObjectKey, reason: impl Display) -> StoreError {
    StoreError::Invalid {
        kind: T::KIND,
        key: key.clone(),
        reason: reason.to_string(),
    }
}

/// Namespace and name are joined into storage and index keys, so both must
/// be plain DNS labels for every kind.
fn check_identity<T: Resource>(key: &ObjectKey) -> StoreResult<()> {
    validate_name(&key.namespace)
        .map_err(|e| invalid::<T>(key, format!("metadata.namespace: {}", e)))?;
    validate_name(&key.name).map_err(|e| invalid::<T>(key, format!("metadata.name: {}", e)))
}

fn check_version<T: Resource>(key: &ObjectKey, expected: u64, actual: u64) -> StoreResult<()> {
    if expected != actual {
        return Err(StoreError::Conflict {
            kind: T::KIND,
            key: key.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Apply an RFC 7386 JSON merge patch to `target` in place.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (field, value) in patch_map {
            if value.is_null() {
                target_map.remove(field);
            } else {
                merge_patch(
                    target_map.entry(field.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}

impl Registry {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            event_log: EventLog::new(EVENT_LOG_CAPACITY, EVENT_CHANNEL_CAPACITY),
            indexes: Arc::new(RwLock::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Registry over an in-memory object store.
    pub async fn in_memory() -> StoreResult<Self> {
        Ok(Self::new(StateStore::in_memory().await?))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    // ─── Indexes ───────────────────────────────────────────────────────────

    /// Declare a secondary index on kind `T` and build it from existing objects.
    ///
    /// Meant to run once at startup; an empty, malformed or duplicate index
    /// name is an error the caller should treat as fatal.
    pub async fn register_index<T: Resource>(
        &self,
        name: &str,
        extract: fn(&T) -> Vec<String>,
    ) -> StoreResult<()> {
        if name.is_empty() || name.contains('/') {
            return Err(StoreError::Index(format!(
                "invalid index name '{}' for {}",
                name,
                T::KIND
            )));
        }
        {
            let mut indexes = self.indexes.write().await;
            let specs = indexes.entry(T::KIND).or_default();
            if specs.iter().any(|s| s.name == name) {
                return Err(StoreError::Index(format!(
                    "index '{}' is already registered for {}",
                    name,
                    T::KIND
                )));
            }
            specs.push(IndexSpec {
                name: name.to_string(),
                extract: Arc::new(move |bytes: &[u8]| {
                    let obj: T = serde_json::from_slice(bytes)?;
                    Ok(extract(&obj))
                }),
            });
        }
        let count = self.rebuild_index::<T>(name).await?;
        info!("Registered index {} on {} ({} objects)", name, T::KIND, count);
        Ok(())
    }

    async fn rebuild_index<T: Resource>(&self, name: &str) -> StoreResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut ops: Vec<BatchOp> = self
            .store
            .list_prefix(&index_prefix(T::KIND, name))
            .await?
            .into_iter()
            .map(|(key, _)| BatchOp::Delete(key))
            .collect();

        let objects = self.store.list_prefix(&kind_prefix(T::KIND)).await?;
        let count = objects.len();
        for (_, bytes) in objects {
            let obj: T = serde_json::from_slice(&bytes)?;
            let key = obj.key();
            for entry in self.index_entries(T::KIND, &key, &bytes).await? {
                if entry.starts_with(&index_prefix(T::KIND, name)) {
                    ops.push(BatchOp::Put(entry, key.name.as_bytes().to_vec()));
                }
            }
        }
        if !ops.is_empty() {
            self.store.write_batch(ops).await?;
        }
        Ok(count)
    }

    /// Index entry keys for one object.
    async fn index_entries(
        &self,
        kind: &'static str,
        key: &ObjectKey,
        bytes: &[u8],
    ) -> StoreResult<BTreeSet<String>> {
        let indexes = self.indexes.read().await;
        let mut entries = BTreeSet::new();
        if let Some(specs) = indexes.get(kind) {
            for spec in specs {
                for value in (spec.extract)(bytes)? {
                    if value.is_empty() || value.contains('/') {
                        continue;
                    }
                    let entry = format!(
                        "{}{}",
                        index_value_prefix(kind, &spec.name, &key.namespace, &value),
                        key.name
                    );
                    entries.insert(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Commit one object write (or delete) together with its index changes,
    /// then publish it on the event log.
    async fn commit(
        &self,
        kind: &'static str,
        key: &ObjectKey,
        previous: Option<Vec<u8>>,
        next: Option<Vec<u8>>,
    ) -> StoreResult<()> {
        let old_entries = match &previous {
            Some(bytes) => self.index_entries(kind, key, bytes).await?,
            None => BTreeSet::new(),
        };
        let new_entries = match &next {
            Some(bytes) => self.index_entries(kind, key, bytes).await?,
            None => BTreeSet::new(),
        };

        let mut ops = Vec::new();
        for stale in old_entries.difference(&new_entries) {
            ops.push(BatchOp::Delete(stale.clone()));
        }
        for fresh in new_entries.difference(&old_entries) {
            ops.push(BatchOp::Put(fresh.clone(), key.name.as_bytes().to_vec()));
        }
        let storage_key = object_key(kind, &key.namespace, &key.name);
        let event_type = match &next {
            Some(bytes) => {
                ops.push(BatchOp::Put(storage_key.clone(), bytes.clone()));
                EventType::Put
            }
            None => {
                ops.push(BatchOp::Delete(storage_key.clone()));
                EventType::Delete
            }
        };
        self.store.write_batch(ops).await?;
        self.event_log
            .emit(event_type, kind, storage_key, previous, next)
            .await;
        Ok(())
    }

    // ─── Reads ─────────────────────────────────────────────────────────────

    async fn load<T: Resource>(&self, key: &ObjectKey) -> StoreResult<Option<(T, Vec<u8>)>> {
        match self
            .store
            .get(&object_key(T::KIND, &key.namespace, &key.name))
            .await?
        {
            Some(bytes) => Ok(Some((serde_json::from_slice(&bytes)?, bytes))),
            None => Ok(None),
        }
    }

    async fn load_existing<T: Resource>(&self, key: &ObjectKey) -> StoreResult<(T, Vec<u8>)> {
        self.load(key).await?.ok_or_else(|| StoreError::NotFound {
            kind: T::KIND,
            key: key.clone(),
        })
    }

    pub async fn try_get<T: Resource>(&self, namespace: &str, name: &str) -> StoreResult<Option<T>> {
        Ok(self
            .load::<T>(&ObjectKey::new(namespace, name))
            .await?
            .map(|(obj, _)| obj))
    }

    pub async fn get<T: Resource>(&self, namespace: &str, name: &str) -> StoreResult<T> {
        self.try_get(namespace, name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: T::KIND,
                key: ObjectKey::new(namespace, name),
            })
    }

    /// All objects of kind `T` in a namespace.
    pub async fn list<T: Resource>(&self, namespace: &str) -> StoreResult<Vec<T>> {
        let entries = self
            .store
            .list_prefix(&namespace_prefix(T::KIND, namespace))
            .await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_slice(&v).ok())
            .collect())
    }

    /// All objects of kind `T` across namespaces.
    pub async fn list_all<T: Resource>(&self) -> StoreResult<Vec<T>> {
        let entries = self.store.list_prefix(&kind_prefix(T::KIND)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, v)| serde_json::from_slice(&v).ok())
            .collect())
    }

    /// Objects of kind `T` in `namespace` whose `index` contains `value`.
    pub async fn list_by_index<T: Resource>(
        &self,
        namespace: &str,
        index: &str,
        value: &str,
    ) -> StoreResult<Vec<T>> {
        {
            let indexes = self.indexes.read().await;
            let registered = indexes
                .get(T::KIND)
                .is_some_and(|specs| specs.iter().any(|s| s.name == index));
            if !registered {
                return Err(StoreError::Index(format!(
                    "index '{}' is not registered for {}",
                    index,
                    T::KIND
                )));
            }
        }

        let entries = self
            .store
            .list_prefix(&index_value_prefix(T::KIND, index, namespace, value))
            .await?;
        let mut objects = Vec::with_capacity(entries.len());
        for (_, name) in entries {
            let name = String::from_utf8_lossy(&name).to_string();
            // Deleted between the index scan and the read: skip.
            if let Some(obj) = self.try_get::<T>(namespace, &name).await? {
                objects.push(obj);
            }
        }
        Ok(objects)
    }

    // ─── Writes ────────────────────────────────────────────────────────────

    /// Create a new object. Generation and resource version start at 1.
    pub async fn create<T: Resource>(&self, mut obj: T) -> StoreResult<T> {
        let key = obj.key();
        check_identity::<T>(&key)?;
        let _guard = self.write_lock.lock().await;
        if self.load::<T>(&key).await?.is_some() {
            return Err(StoreError::AlreadyExists { kind: T::KIND, key });
        }
        obj.validate().map_err(|e| invalid::<T>(&key, e))?;

        let meta = obj.metadata_mut();
        meta.generation = 1;
        meta.resource_version = 1;
        if meta.created_at.is_none() {
            meta.created_at = Some(Utc::now());
        }
        let bytes = serde_json::to_vec(&obj)?;
        self.commit(T::KIND, &key, None, Some(bytes)).await?;
        debug!("Created {} {}", T::KIND, key);
        Ok(obj)
    }

    /// Replace spec and metadata of an existing object; status is preserved.
    ///
    /// A non-zero `resource_version` on `obj` is a precondition. The
    /// generation is bumped when the spec changes.
    pub async fn update<T: Resource>(&self, obj: T) -> StoreResult<T> {
        let key = obj.key();
        check_identity::<T>(&key)?;
        let _guard = self.write_lock.lock().await;
        let (current, current_bytes) = self.load_existing::<T>(&key).await?;
        let expected = obj.metadata().resource_version;
        if expected != 0 {
            check_version::<T>(&key, expected, current.metadata().resource_version)?;
        }
        obj.validate_update(&current)
            .map_err(|e| invalid::<T>(&key, e))?;

        let mut next = obj;
        next.set_status(current.status().clone());
        let spec_changed = next.spec() != current.spec();
        {
            let current_meta = current.metadata();
            let meta = next.metadata_mut();
            meta.created_at = current_meta.created_at;
            meta.resource_version = current_meta.resource_version;
            meta.generation = if spec_changed {
                current_meta.generation + 1
            } else {
                current_meta.generation
            };
        }
        self.write_if_changed(&key, current, current_bytes, next)
            .await
    }

    /// Create the object, or update it unconditionally if it exists.
    pub async fn apply<T: Resource>(&self, mut obj: T) -> StoreResult<T> {
        let key = obj.key();
        if self.load::<T>(&key).await?.is_some() {
            obj.metadata_mut().resource_version = 0;
            self.update(obj).await
        } else {
            self.create(obj).await
        }
    }

    /// Write only the status of `obj`. Its resource version must match.
    pub async fn update_status<T: Resource>(&self, obj: &T) -> StoreResult<T> {
        let _guard = self.write_lock.lock().await;
        let key = obj.key();
        let (current, current_bytes) = self.load_existing::<T>(&key).await?;
        check_version::<T>(
            &key,
            obj.metadata().resource_version,
            current.metadata().resource_version,
        )?;

        let mut next = current.clone();
        next.set_status(obj.status().clone());
        self.write_if_changed(&key, current, current_bytes, next)
            .await
    }

    /// Apply a JSON merge patch to the spec/metadata of an object.
    ///
    /// Identity fields and status cannot be changed through a patch. With
    /// `precondition`, the stored resource version must match it.
    pub async fn patch<T: Resource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
        precondition: Option<u64>,
    ) -> StoreResult<T> {
        let key = ObjectKey::new(namespace, name);
        check_identity::<T>(&key)?;
        let _guard = self.write_lock.lock().await;
        let (current, current_bytes) = self.load_existing::<T>(&key).await?;
        if let Some(expected) = precondition {
            check_version::<T>(&key, expected, current.metadata().resource_version)?;
        }

        let mut doc = serde_json::to_value(&current)?;
        merge_patch(&mut doc, patch);
        let mut next: T = serde_json::from_value(doc).map_err(|e| invalid::<T>(&key, e))?;
        next.set_status(current.status().clone());
        let spec_changed = next.spec() != current.spec();
        {
            let current_meta = current.metadata();
            let meta = next.metadata_mut();
            meta.name = current_meta.name.clone();
            meta.namespace = current_meta.namespace.clone();
            meta.created_at = current_meta.created_at;
            meta.resource_version = current_meta.resource_version;
            meta.generation = if spec_changed {
                current_meta.generation + 1
            } else {
                current_meta.generation
            };
        }
        next.validate_update(&current)
            .map_err(|e| invalid::<T>(&key, e))?;
        self.write_if_changed(&key, current, current_bytes, next)
            .await
    }

    /// Delete an object and its index entries, returning the last stored value.
    pub async fn delete<T: Resource>(&self, namespace: &str, name: &str) -> StoreResult<T> {
        let _guard = self.write_lock.lock().await;
        let key = ObjectKey::new(namespace, name);
        let (current, current_bytes) = self.load_existing::<T>(&key).await?;
        self.commit(T::KIND, &key, Some(current_bytes), None).await?;
        debug!("Deleted {} {}", T::KIND, key);
        Ok(current)
    }

    /// Persist `next` unless it serializes identically to what is stored.
    /// `next` must carry the current resource version; it is bumped here.
    async fn write_if_changed<T: Resource>(
        &self,
        key: &ObjectKey,
        current: T,
        current_bytes: Vec<u8>,
        mut next: T,
    ) -> StoreResult<T> {
        if serde_json::to_vec(&next)? == current_bytes {
            return Ok(current);
        }
        next.metadata_mut().resource_version += 1;
        let bytes = serde_json::to_vec(&next)?;
        self.commit(T::KIND, key, Some(current_bytes), Some(bytes))
            .await?;
        debug!(
            "Updated {} {} (rv={})",
            T::KIND,
            key,
            next.metadata().resource_version
        );
        Ok(next)
    }
}
