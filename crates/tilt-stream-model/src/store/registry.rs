use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::{ObjectKey, ResourceVersion, Spec};

use super::{LabelSelector, LocalStore, MetadataStoreObject, StoreError, WatchFilter, Watcher};

/// type erased pointer to `LocalStore<S>`
struct StorePointer {
    label: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl StorePointer {
    fn new<S: Spec>(store: Arc<LocalStore<S>>) -> Self {
        Self {
            label: S::LABEL,
            inner: store,
        }
    }

    fn downcast<S: Spec>(&self) -> Result<Arc<LocalStore<S>>, StoreError> {
        self.inner
            .clone()
            .downcast::<LocalStore<S>>()
            .map_err(|_| StoreError::UnknownKind(S::LABEL))
    }
}

/// All kinds known to the process. The set of kinds is fixed once built.
pub struct ObjectStore {
    stores: HashMap<&'static str, StorePointer>,
}

impl fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.stores.values().map(|store| store.label).collect();
        kinds.sort_unstable();
        f.debug_struct("ObjectStore").field("kinds", &kinds).finish()
    }
}

impl ObjectStore {
    pub fn builder() -> ObjectStoreBuilder {
        ObjectStoreBuilder::default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.stores.keys().copied().collect()
    }

    /// typed store for kind
    pub fn store<S: Spec>(&self) -> Result<Arc<LocalStore<S>>, StoreError> {
        self.stores
            .get(S::LABEL)
            .ok_or(StoreError::UnknownKind(S::LABEL))?
            .downcast::<S>()
    }

    pub async fn get<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, StoreError> {
        self.store::<S>()?.get(key).await
    }

    pub async fn list<S: Spec>(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<MetadataStoreObject<S>>, StoreError> {
        Ok(self.store::<S>()?.list(selector).await)
    }

    pub async fn create<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, StoreError> {
        self.store::<S>()?.create(obj).await
    }

    pub async fn update<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, StoreError> {
        self.store::<S>()?.update(obj, expected).await
    }

    pub async fn update_status<S: Spec>(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, StoreError> {
        self.store::<S>()?
            .update_status(key, status, expected)
            .await
    }

    pub async fn delete<S: Spec>(
        &self,
        key: &ObjectKey,
    ) -> Result<MetadataStoreObject<S>, StoreError> {
        self.store::<S>()?.delete(key).await
    }

    pub fn watch<S: Spec>(
        &self,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Result<Watcher<S>, StoreError> {
        Ok(self.store::<S>()?.watch_since(filter, since))
    }
}

#[derive(Default)]
pub struct ObjectStoreBuilder {
    stores: HashMap<&'static str, StorePointer>,
}

impl ObjectStoreBuilder {
    /// add kind, registering same kind again keeps the first store
    pub fn register<S: Spec>(self) -> Self {
        self.with_store(LocalStore::<S>::new_shared())
    }

    /// add kind backed by existing store
    pub fn with_store<S: Spec>(mut self, store: Arc<LocalStore<S>>) -> Self {
        if self.stores.contains_key(S::LABEL) {
            debug!(kind = S::LABEL, "kind already registered");
        } else {
            debug!(kind = S::LABEL, gvr = %S::group_version_resource(), "registering kind");
            self.stores.insert(S::LABEL, StorePointer::new(store));
        }
        self
    }

    pub fn build(self) -> ObjectStore {
        ObjectStore {
            stores: self.stores,
        }
    }
}

#[cfg(test)]
mod test {

    use crate::core::ObjectKey;
    use crate::fixture::{GlobalSpec, TestSpec, global_object, test_object};
    use crate::store::{LabelSelector, StoreError, WatchEventType, WatchFilter};

    use super::ObjectStore;

    #[fluvio_future::test]
    async fn test_object_store_kinds() {
        let store = ObjectStore::builder()
            .register::<TestSpec>()
            .register::<GlobalSpec>()
            .build();
        let mut kinds = store.kinds();
        kinds.sort_unstable();
        assert_eq!(kinds, vec!["Global", "Test"]);

        store
            .create(test_object("t1", 1))
            .await
            .expect("create test");
        store
            .create(global_object("g1", "v"))
            .await
            .expect("create global");

        assert_eq!(
            store
                .list::<TestSpec>(&LabelSelector::everything())
                .await
                .expect("list")
                .len(),
            1
        );
        let global = store
            .get::<GlobalSpec>(&ObjectKey::new("g1"))
            .await
            .expect("get");
        assert_eq!(global.spec.value, "v");

        let mut watcher = store
            .watch::<GlobalSpec>(WatchFilter::All, None)
            .expect("watch");
        let event = watcher.next().await;
        assert_eq!(event.event_type, WatchEventType::Added);
    }

    #[fluvio_future::test]
    async fn test_object_store_unknown_kind() {
        let store = ObjectStore::builder().register::<TestSpec>().build();
        let err = store
            .get::<GlobalSpec>(&ObjectKey::new("g1"))
            .await
            .expect_err("unknown");
        assert!(matches!(err, StoreError::UnknownKind("Global")));
    }
}
