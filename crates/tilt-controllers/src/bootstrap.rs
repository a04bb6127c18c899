use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tilt_api::button::UIButtonSpec;
use tilt_api::store::ObjectStore;
use tilt_controller_runtime::{
    Client, ControllerManager, DeferredClient, ManagerConfig, ManagerError, StoreClient,
};

use crate::uibutton::{ButtonRegistry, UIButtonReconciler};

pub type MainClient = Arc<DeferredClient<StoreClient>>;

/// register every controller of the runtime
pub fn provide_controllers<C>(
    manager: &mut ControllerManager<C>,
    registry: Arc<ButtonRegistry>,
) -> Result<(), ManagerError>
where
    C: Client + Clone,
{
    let client = manager.client().clone();
    manager.register(UIButtonReconciler::new(client, registry))?;
    Ok(())
}

/// store with a collection for every served kind
pub fn provide_object_store() -> ObjectStore {
    ObjectStore::builder().register::<UIButtonSpec>().build()
}

/// running controllers together with the store they reconcile
pub struct MainLoop {
    manager: ControllerManager<MainClient>,
    client: MainClient,
    store: Arc<ObjectStore>,
}

impl MainLoop {
    pub fn client(&self) -> &MainClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn manager(&self) -> &ControllerManager<MainClient> {
        &self.manager
    }

    /// returns once stopped or on the first fatal controller error
    pub async fn wait(&self) -> Result<(), ManagerError> {
        self.manager.wait().await
    }

    pub async fn stop(mut self) -> Result<(), ManagerError> {
        self.manager.stop().await
    }
}

/// Controllers are constructed and started against a deferred client before the
/// store exists, then the store client is bound and held calls proceed.
pub async fn start_main_loop(
    config: ManagerConfig,
    registry: Arc<ButtonRegistry>,
) -> Result<MainLoop> {
    let client: MainClient = DeferredClient::shared(config.bind_timeout);

    let mut manager = ControllerManager::new(client.clone(), config);
    provide_controllers(&mut manager, registry)?;
    manager.start()?;

    let store = Arc::new(provide_object_store());
    client.bind(StoreClient::new(store.clone())).await?;
    info!(kinds = ?store.kinds(), "main loop started");

    Ok(MainLoop {
        manager,
        client,
        store,
    })
}
