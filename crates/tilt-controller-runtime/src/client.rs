use std::sync::Arc;

use async_trait::async_trait;

use tilt_stream_model::core::{ObjectKey, ResourceVersion, Spec};
use tilt_stream_model::store::{
    LabelSelector, MetadataStoreObject, ObjectStore, WatchFilter, Watcher,
};

use crate::error::ClientError;

/// Access to objects of every registered kind.
/// All reads return copies, all writes are checked against the expected version.
#[async_trait]
pub trait Client: Send + Sync + 'static {
    async fn get<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError>;

    async fn list<S: Spec>(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<MetadataStoreObject<S>>, ClientError>;

    async fn create<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, ClientError>;

    async fn update<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError>;

    async fn update_status<S: Spec>(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError>;

    async fn delete<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError>;

    async fn watch<S: Spec>(
        &self,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Result<Watcher<S>, ClientError>;
}

/// client backed directly by the object store
#[derive(Debug, Clone)]
pub struct StoreClient(Arc<ObjectStore>);

impl StoreClient {
    pub fn new(store: Arc<ObjectStore>) -> Self {
        Self(store)
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.0
    }
}

#[async_trait]
impl Client for StoreClient {
    async fn get<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        Ok(self.0.get::<S>(key).await?)
    }

    async fn list<S: Spec>(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<MetadataStoreObject<S>>, ClientError> {
        Ok(self.0.list::<S>(selector).await?)
    }

    async fn create<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, ClientError> {
        Ok(self.0.create(obj).await?)
    }

    async fn update<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        Ok(self.0.update(obj, expected).await?)
    }

    async fn update_status<S: Spec>(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        Ok(self.0.update_status::<S>(key, status, expected).await?)
    }

    async fn delete<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        Ok(self.0.delete::<S>(key).await?)
    }

    async fn watch<S: Spec>(
        &self,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Result<Watcher<S>, ClientError> {
        Ok(self.0.watch::<S>(filter, since)?)
    }
}

#[async_trait]
impl<C> Client for Arc<C>
where
    C: Client,
{
    async fn get<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        self.as_ref().get::<S>(key).await
    }

    async fn list<S: Spec>(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<MetadataStoreObject<S>>, ClientError> {
        self.as_ref().list::<S>(selector).await
    }

    async fn create<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
    ) -> Result<MetadataStoreObject<S>, ClientError> {
        self.as_ref().create(obj).await
    }

    async fn update<S: Spec>(
        &self,
        obj: MetadataStoreObject<S>,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        self.as_ref().update(obj, expected).await
    }

    async fn update_status<S: Spec>(
        &self,
        key: &ObjectKey,
        status: S::Status,
        expected: ResourceVersion,
    ) -> Result<ResourceVersion, ClientError> {
        self.as_ref().update_status::<S>(key, status, expected).await
    }

    async fn delete<S: Spec>(&self, key: &ObjectKey) -> Result<MetadataStoreObject<S>, ClientError> {
        self.as_ref().delete::<S>(key).await
    }

    async fn watch<S: Spec>(
        &self,
        filter: WatchFilter,
        since: Option<ResourceVersion>,
    ) -> Result<Watcher<S>, ClientError> {
        self.as_ref().watch::<S>(filter, since).await
    }
}

#[cfg(test)]
mod test {

    use std::sync::Arc;

    use tilt_stream_model::core::{ObjectKey, ResourceVersion};
    use tilt_stream_model::fixture::{TestSpec, test_object};
    use tilt_stream_model::store::{LabelSelector, ObjectStore};

    use super::{Client, StoreClient};

    #[fluvio_future::test]
    async fn test_store_client() {
        let client = Arc::new(StoreClient::new(Arc::new(
            ObjectStore::builder().register::<TestSpec>().build(),
        )));

        let created = client.create(test_object("t1", 1)).await.expect("create");
        let key = ObjectKey::namespaced("default", "t1");
        let value = client.get::<TestSpec>(&key).await.expect("get");
        assert_eq!(value, created);

        let err = client
            .update(test_object("t1", 2), ResourceVersion::new(0))
            .await
            .expect_err("stale");
        assert!(err.is_conflict());

        client.delete::<TestSpec>(&key).await.expect("delete");
        let err = client.get::<TestSpec>(&key).await.expect_err("deleted");
        assert!(err.is_not_found());
        assert!(
            client
                .list::<TestSpec>(&LabelSelector::everything())
                .await
                .expect("list")
                .is_empty()
        );
    }
}
