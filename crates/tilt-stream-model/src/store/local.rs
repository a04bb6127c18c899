use std::sync::Arc;
use std::fmt;
use std::fmt::Display;

use chrono::Utc;
use tracing::{debug, trace, instrument};
use async_lock::RwLock;
use async_lock::RwLockReadGuard;
use async_lock::RwLockWriteGuard;
use uuid::Uuid;

use crate::core::{ObjectKey, ResourceVersion, Spec};

use super::{
    ChangeFlag, DualEpochMap, Epoch, FULL_FILTER, LabelSelector,
    MetadataStoreObject, STATUS_FILTER, StoreError,
};
use super::event::{ChangeListener, EventPublisher};
use super::watch::{WatchFilter, Watcher};

pub type StoreMap<S> = DualEpochMap<ObjectKey, MetadataStoreObject<S>>;

/// Canonical in memory copy of every object of one kind.
/// Readers get copies. Every write runs validation, checks the expected version
/// and stamps the object with a new store epoch which doubles as resource version.
/// Spec (with metadata) and status are versioned separately so writes to one
/// never conflict with writes to the other.
#[derive(Debug)]
pub struct LocalStore<S>
where
    S: Spec,
{
    store: RwLock<StoreMap<S>>,
    event_publisher: Arc<EventPublisher>,
}

impl<S> Default for LocalStore<S>
where
    S: Spec,
{
    fn default() -> Self {
        Self {
            store: RwLock::new(DualEpochMap::new()),
            event_publisher: EventPublisher::shared(),
        }
    }
}

impl<S> Display for LocalStore<S>
where
    S: Spec,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} Store", S::LABEL)
    }
}

/// version check for one version domain.
/// caller must have observed latest write in the domain and nothing newer than current
fn check_version(
    expected: ResourceVersion,
    domain: ResourceVersion,
    current: ResourceVersion,
) -> bool {
    expected >= domain && expected <= current
}

impl<S> LocalStore<S>
where
    S: Spec,
{
    /// create arc wrapper
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            store: RwLock::new(DualEpochMap::with_history_limit(limit)),
            event_publisher: EventPublisher::shared(),
        }
    }

    /// Read guard
    #[inline(always)]
    pub async fn read(&self) -> RwLockReadGuard<'_, StoreMap<S>> {
        self.store.read().await
    }

    #[inline(always)]
    async fn write(&self) -> RwLockWriteGuard<'_, StoreMap<S>> {
        self.store.write().await
    }

    /// current epoch
    pub async fn epoch(&self) -> Epoch {
        self.read().await.epoch()
    }

    pub fn event_publisher(&self) -> &Arc<EventPublisher> {
        &self.event_publisher
    }

    /// listener for any change in this store
    pub fn change_listener(&self) -> ChangeListener {
        self.event_publisher.change_listener()
    }

    pub async fn get(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, StoreError> {
        self.read()
            .await
            .get(key)
            .map(|value| value.inner().clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: S::LABEL,
                key: key.clone(),
            })
    }

    pub async fn contains_key(&self, key: &ObjectKey) -> bool {
        self.read().await.contains_key(key)
    }

    /// objects matching selector, order is not guaranteed
    pub async fn list(&self, selector: &LabelSelector) -> Vec<MetadataStoreObject<S>> {
        self.read()
            .await
            .values()
            .filter(|value| selector.matches(&value.meta))
            .map(|value| value.inner().clone())
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.read().await.len()
    }

    fn validate(obj: &MetadataStoreObject<S>) -> Result<(), StoreError> {
        let errors = obj.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            debug!(kind = S::LABEL, key = %obj.key(), %errors, "rejected invalid object");
            Err(StoreError::Invalid {
                kind: S::LABEL,
                key: obj.key(),
                errors,
            })
        }
    }

    /// add new object with fresh identity.
    /// status starts at default, it is only written through `update_status`
    #[instrument(skip(self, obj), fields(kind = S::LABEL, key = %obj.key()))]
    pub async fn create(
        &self,
        mut obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, StoreError> {
        Self::validate(&obj)?;
        let key = obj.key();

        let mut write_guard = self.write().await;
        if write_guard.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: S::LABEL,
                key,
            });
        }

        write_guard.increment_epoch();
        let epoch = write_guard.epoch();
        let version = ResourceVersion::new(epoch);
        let now = Utc::now();

        obj.meta.uid = Uuid::new_v4().to_string();
        obj.meta.generation = 1;
        obj.meta.creation_timestamp = Some(now);
        obj.meta.modification_timestamp = Some(now);
        obj.meta.resource_version = version;
        obj.meta.spec_version = version;
        obj.meta.status_version = version;
        obj.status = S::Status::default();

        write_guard.insert(key, obj.clone());
        drop(write_guard);

        debug!(epoch, "created");
        self.event_publisher.store_change(epoch);
        Ok(obj)
    }

    /// replace spec and labels, status of `obj` is ignored.
    /// `expected` must be at least the last spec version of the object
    #[instrument(skip(self, obj), fields(kind = S::LABEL, key = %obj.key()))]
    pub async fn update(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, StoreError> {
        Self::validate(&obj)?;
        let key = obj.key();

        let mut write_guard = self.write().await;

        let spec_changed = match write_guard.get(&key) {
            Some(current) => {
                if !check_version(
                    expected,
                    current.meta.spec_version,
                    current.meta.resource_version,
                ) {
                    debug!(%expected, current = %current.meta.resource_version, "conflict");
                    return Err(StoreError::Conflict {
                        kind: S::LABEL,
                        key,
                        expected,
                        current: current.meta.resource_version,
                    });
                }
                current.spec != obj.spec
            }
            None => {
                return Err(StoreError::NotFound {
                    kind: S::LABEL,
                    key,
                });
            }
        };

        write_guard.increment_epoch();
        let epoch = write_guard.epoch();
        let version = ResourceVersion::new(epoch);

        // metadata is always touched so every accepted update is visible
        let changes = ChangeFlag {
            spec: spec_changed,
            status: false,
            meta: true,
        };

        let Some(value) = write_guard.stamp(&key, &changes) else {
            write_guard.decrement_epoch();
            return Err(StoreError::NotFound {
                kind: S::LABEL,
                key,
            });
        };

        let current = value.inner_mut();
        if spec_changed {
            current.spec = obj.spec;
            current.meta.generation += 1;
        }
        current.meta.labels = obj.meta.labels;
        current.meta.modification_timestamp = Some(Utc::now());
        current.meta.spec_version = version;
        current.meta.resource_version = version;
        drop(write_guard);

        debug!(epoch, spec_changed, "updated");
        self.event_publisher.store_change(epoch);
        Ok(version)
    }

    /// status sub-resource write, spec and metadata are untouched.
    /// `expected` must be at least the last status version of the object.
    /// writing identical status is a no-op and returns current version
    #[instrument(skip(self, status), fields(kind = S::LABEL))]
    pub async fn update_status(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, StoreError> {
        let mut write_guard = self.write().await;

        match write_guard.get(key) {
            Some(current) => {
                if !check_version(
                    expected,
                    current.meta.status_version,
                    current.meta.resource_version,
                ) {
                    debug!(%expected, current = %current.meta.resource_version, "status conflict");
                    return Err(StoreError::Conflict {
                        kind: S::LABEL,
                        key: key.clone(),
                        expected,
                        current: current.meta.resource_version,
                    });
                }
                if current.status == status {
                    trace!("status unchanged");
                    return Ok(current.meta.resource_version);
                }
            }
            None => {
                return Err(StoreError::NotFound {
                    kind: S::LABEL,
                    key: key.clone(),
                });
            }
        }

        write_guard.increment_epoch();
        let epoch = write_guard.epoch();
        let version = ResourceVersion::new(epoch);

        let Some(value) = write_guard.stamp(key, &STATUS_FILTER) else {
            write_guard.decrement_epoch();
            return Err(StoreError::NotFound {
                kind: S::LABEL,
                key: key.clone(),
            });
        };

        let current = value.inner_mut();
        current.apply_status(status);
        current.meta.status_version = version;
        current.meta.resource_version = version;
        drop(write_guard);

        debug!(epoch, "status updated");
        self.event_publisher.store_change(epoch);
        Ok(version)
    }

    /// remove object, returns last state stamped with deletion version
    #[instrument(skip(self), fields(kind = S::LABEL))]
    pub async fn delete(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, StoreError> {
        let mut write_guard = self.write().await;
        write_guard.increment_epoch();
        let epoch = write_guard.epoch();

        if let Some(value) = write_guard.stamp(key, &FULL_FILTER) {
            value.inner_mut().meta.resource_version = ResourceVersion::new(epoch);
        }

        match write_guard.remove(key) {
            Some(old_value) => {
                drop(write_guard);
                debug!(epoch, "deleted");
                self.event_publisher.store_change(epoch);
                Ok(old_value.inner_owned())
            }
            None => {
                write_guard.decrement_epoch();
                Err(StoreError::NotFound {
                    kind: S::LABEL,
                    key: key.clone(),
                })
            }
        }
    }

    /// watch every object from the beginning
    pub fn watch(self: &Arc<Self>, filter: WatchFilter) -> Watcher<S> {
        Watcher::new(self.clone(), filter, None)
    }

    /// resume watch after a version previously delivered to the caller
    pub fn watch_since(
        self: &Arc<Self>,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Watcher<S> {
        Watcher::new(self.clone(), filter, since)
    }
}

#[cfg(test)]
mod test {

    use std::sync::Arc;

    use fluvio_future::task::spawn_task;

    use crate::core::{ObjectKey, ResourceVersion};
    use crate::fixture::{TestSpec, TestStatus, test_object};
    use crate::store::LabelSelector;

    use super::LocalStore;

    type TestStore = LocalStore<TestSpec>;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::namespaced("default", name)
    }

    #[fluvio_future::test]
    async fn test_store_create_get() {
        let store = TestStore::new_shared();

        let created = store.create(test_object("t1", 1)).await.expect("create");
        assert_eq!(created.meta.generation, 1);
        assert!(!created.meta.uid.is_empty());
        assert!(created.meta.creation_timestamp.is_some());
        assert_eq!(created.resource_version(), ResourceVersion::new(1));

        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value, created);
        assert_eq!(store.count().await, 1);

        let err = store
            .create(test_object("t1", 2))
            .await
            .expect_err("duplicate");
        assert!(matches!(err, crate::store::StoreError::AlreadyExists { .. }));

        let err = store.get(&key("none")).await.expect_err("missing");
        assert!(err.is_not_found());
    }

    #[fluvio_future::test]
    async fn test_store_create_resets_status() {
        let store = TestStore::new_shared();
        let obj = test_object("t1", 1).with_status(TestStatus {
            up: true,
            error: None,
        });
        let created = store.create(obj).await.expect("create");
        assert_eq!(created.status, TestStatus::default());
    }

    #[fluvio_future::test]
    async fn test_store_update_advances_version() {
        let store = TestStore::new_shared();
        let created = store.create(test_object("t1", 1)).await.expect("create");
        let first = created.resource_version();

        // given
        let mut obj = created.clone();
        obj.spec.replica = 3;

        // when
        let version = store.update(obj, first).await.expect("update");

        // then
        assert!(version > first);
        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value.resource_version(), version);
        assert!(value.resource_version() > first);
        assert_eq!(value.spec.replica, 3);
        assert_eq!(value.meta.generation, 2);
        assert_eq!(value.meta.uid, created.meta.uid);

        // unchanged spec still advances version but not generation
        let version2 = store.update(value.clone(), version).await.expect("update");
        assert!(version2 > version);
        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value.meta.generation, 2);
    }

    #[fluvio_future::test]
    async fn test_store_update_stale_version() {
        let store = TestStore::new_shared();
        let created = store.create(test_object("t1", 1)).await.expect("create");
        let first = created.resource_version();

        store
            .update(test_object("t1", 2), first)
            .await
            .expect("first update");

        let err = store
            .update(test_object("t1", 3), first)
            .await
            .expect_err("stale");
        assert!(err.is_conflict());

        // version from the future
        let err = store
            .update(test_object("t1", 3), ResourceVersion::new(100))
            .await
            .expect_err("future");
        assert!(err.is_conflict());

        assert_eq!(store.get(&key("t1")).await.expect("get").spec.replica, 2);
    }

    #[fluvio_future::test]
    async fn test_store_concurrent_updates_one_wins() {
        let store = TestStore::new_shared();
        let created = store.create(test_object("t1", 1)).await.expect("create");
        let version = created.resource_version();

        let mut handles = vec![];
        for replica in 2..10u16 {
            let store = store.clone();
            handles.push(spawn_task(async move {
                store.update(test_object("t1", replica), version).await
            }));
        }

        let mut success = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await {
                Ok(_) => success += 1,
                Err(err) => {
                    assert!(err.is_conflict());
                    conflicts += 1;
                }
            }
        }
        assert_eq!(success, 1);
        assert_eq!(conflicts, 7);
    }

    #[fluvio_future::test]
    async fn test_store_spec_and_status_do_not_conflict() {
        let store = TestStore::new_shared();
        let created = store.create(test_object("t1", 1)).await.expect("create");
        let observed = created.resource_version();

        // both writers observed same version
        let spec_version = store
            .update(test_object("t1", 5), observed)
            .await
            .expect("spec update");
        let status_version = store
            .update_status(
                &key("t1"),
                TestStatus {
                    up: true,
                    error: None,
                },
                observed,
            )
            .await
            .expect("status update");
        assert!(status_version > spec_version);

        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value.spec.replica, 5);
        assert!(value.status.up);
        assert_eq!(value.meta.spec_version, spec_version);
        assert_eq!(value.meta.status_version, status_version);
        assert_eq!(value.resource_version(), status_version);

        // spec writer holding version before status write is still current for spec
        store
            .update(test_object("t1", 6), spec_version)
            .await
            .expect("spec update after status");

        // stale status write
        let err = store
            .update_status(&key("t1"), TestStatus::default(), observed)
            .await
            .expect_err("stale status");
        assert!(err.is_conflict());
    }

    #[fluvio_future::test]
    async fn test_store_update_status_untouched_spec() {
        let store = TestStore::new_shared();
        let created = store.create(test_object("t1", 4)).await.expect("create");

        let status = TestStatus {
            up: true,
            error: None,
        };
        let version = store
            .update_status(&key("t1"), status.clone(), created.resource_version())
            .await
            .expect("status");

        // same status is no-op
        let same = store
            .update_status(&key("t1"), status, version)
            .await
            .expect("status");
        assert_eq!(same, version);
        assert_eq!(store.epoch().await, version.epoch());

        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value.spec, created.spec);
        assert_eq!(value.meta.generation, 1);
        assert_eq!(
            value.meta.modification_timestamp,
            created.meta.modification_timestamp
        );
    }

    #[fluvio_future::test]
    async fn test_store_invalid_write_unchanged() {
        let store = TestStore::new_shared();

        let err = store
            .create(test_object("t1", 0))
            .await
            .expect_err("invalid");
        let errors = err.field_errors().expect("field errors");
        assert!(errors.find("spec.replica").is_some());
        assert_eq!(store.count().await, 0);
        assert_eq!(store.epoch().await, 0);

        let created = store.create(test_object("t1", 1)).await.expect("create");
        let err = store
            .update(test_object("t1", 0), created.resource_version())
            .await
            .expect_err("invalid");
        assert!(err.field_errors().is_some());

        let value = store.get(&key("t1")).await.expect("get");
        assert_eq!(value, created);
        assert_eq!(store.epoch().await, 1);
    }

    #[fluvio_future::test]
    async fn test_store_delete() {
        let store = TestStore::new_shared();
        store.create(test_object("t1", 1)).await.expect("create");

        let deleted = store.delete(&key("t1")).await.expect("delete");
        assert_eq!(deleted.resource_version(), ResourceVersion::new(2));
        assert!(!store.contains_key(&key("t1")).await);

        let err = store.delete(&key("t1")).await.expect_err("missing");
        assert!(err.is_not_found());
        assert_eq!(store.epoch().await, 2);

        let err = store
            .update_status(&key("t1"), TestStatus::default(), ResourceVersion::new(2))
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
    }

    #[fluvio_future::test]
    async fn test_store_list_selector() {
        let store = Arc::new(TestStore::default());
        let mut web = test_object("web", 1);
        web.meta = web.meta.set_labels(vec![("app", "web")]);
        store.create(web).await.expect("create");
        store.create(test_object("db", 1)).await.expect("create");

        assert_eq!(store.list(&LabelSelector::everything()).await.len(), 2);
        let selected = store
            .list(&LabelSelector::default().with_label("app", "web"))
            .await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "web");
    }
}
