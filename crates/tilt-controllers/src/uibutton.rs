//!
//! # UIButton controller
//!
//! Publishes the current set of buttons to the UI facing [`ButtonRegistry`].
//! Buttons are keyed by name; a button is republished only when its resource version moves.
//!
use std::collections::BTreeMap;
use std::sync::Arc;

use async_lock::RwLock;
use async_trait::async_trait;
use tracing::{debug, instrument};

use tilt_api::button::{UIButton, UIButtonSpec};
use tilt_api::core::ObjectKey;
use tilt_api::store::{ChangeListener, EventPublisher, WatchFilter};
use tilt_controller_runtime::{Client, ReconcileContext, ReconcileResult, Reconciler};

/// buttons currently visible to the UI
#[derive(Debug, Default)]
pub struct ButtonRegistry {
    buttons: RwLock<BTreeMap<String, UIButton>>,
    event_publisher: Arc<EventPublisher>,
}

impl ButtonRegistry {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// listen for any change of the visible buttons
    pub fn change_listener(&self) -> ChangeListener {
        self.event_publisher.change_listener()
    }

    /// returns false if the same version is already published
    pub async fn upsert(&self, button: UIButton) -> bool {
        let mut buttons = self.buttons.write().await;
        if let Some(existing) = buttons.get(button.name()) {
            if existing.resource_version() == button.resource_version() {
                return false;
            }
        }
        buttons.insert(button.name().to_owned(), button);
        self.publish();
        true
    }

    pub async fn remove(&self, name: &str) -> bool {
        let mut buttons = self.buttons.write().await;
        if buttons.remove(name).is_none() {
            return false;
        }
        self.publish();
        true
    }

    /// called with write lock held, so changes are counted one by one
    fn publish(&self) {
        let next = self.event_publisher.current_change() + 1;
        self.event_publisher.store_change(next);
    }

    pub async fn get(&self, name: &str) -> Option<UIButton> {
        self.buttons.read().await.get(name).cloned()
    }

    /// buttons attached to a component, in name order
    pub async fn for_component(&self, component_id: &str) -> Vec<UIButton> {
        self.buttons
            .read()
            .await
            .values()
            .filter(|button| button.spec.location.component_id == component_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.buttons.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct UIButtonReconciler<C> {
    client: C,
    registry: Arc<ButtonRegistry>,
}

impl<C> UIButtonReconciler<C>
where
    C: Client,
{
    pub fn new(client: C, registry: Arc<ButtonRegistry>) -> Self {
        Self { client, registry }
    }
}

#[async_trait]
impl<C> Reconciler for UIButtonReconciler<C>
where
    C: Client,
{
    type Spec = UIButtonSpec;

    #[instrument(skip(self, _ctx), fields(button = %key))]
    async fn reconcile(
        &self,
        key: &ObjectKey,
        _ctx: &ReconcileContext,
    ) -> anyhow::Result<ReconcileResult> {
        match self.client.get::<UIButtonSpec>(key).await {
            Ok(button) => {
                let version = button.resource_version();
                if self.registry.upsert(button).await {
                    debug!(%version, "button published");
                }
            }
            Err(err) if err.is_not_found() => {
                if self.registry.remove(&key.name).await {
                    debug!("button removed");
                }
            }
            Err(err) => return Err(err.into()),
        }
        Ok(ReconcileResult::done())
    }

    /// clicks are status writes and must reach the UI
    fn watch_filter(&self) -> WatchFilter {
        WatchFilter::All
    }
}

#[cfg(test)]
mod test {

    use std::sync::Arc;

    use chrono::Utc;

    use tilt_api::button::{UIButton, UIButtonSpec, UIButtonStatus, UIComponentLocation};
    use tilt_api::core::{ObjectKey, ObjectMeta};
    use tilt_api::store::ObjectStore;
    use tilt_controller_runtime::{Client, ReconcileContext, Reconciler, StoreClient};
    use tilt_types::event::StickyEvent;

    use super::{ButtonRegistry, UIButtonReconciler};

    fn button(name: &str, component: &str) -> UIButton {
        UIButton::new(
            ObjectMeta::new(name),
            UIButtonSpec::new(UIComponentLocation::resource(component), "Run"),
        )
    }

    fn setup() -> (StoreClient, Arc<ButtonRegistry>, UIButtonReconciler<StoreClient>) {
        let client = StoreClient::new(Arc::new(
            ObjectStore::builder().register::<UIButtonSpec>().build(),
        ));
        let registry = ButtonRegistry::shared();
        let reconciler = UIButtonReconciler::new(client.clone(), registry.clone());
        (client, registry, reconciler)
    }

    #[fluvio_future::test]
    async fn test_reconcile_publishes_and_removes() {
        let (client, registry, reconciler) = setup();
        let ctx = ReconcileContext::new(StickyEvent::shared());
        let key = ObjectKey::new("deploy");

        // given
        client.create(button("deploy", "frontend")).await.expect("create");

        // when
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");

        // then
        let published = registry.get("deploy").await.expect("published");
        assert_eq!(published.spec.text, "Run");
        assert_eq!(registry.for_component("frontend").await.len(), 1);
        assert!(registry.for_component("backend").await.is_empty());

        client.delete::<UIButtonSpec>(&key).await.expect("delete");
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");
        assert!(registry.is_empty().await);

        // reconcile of absent object stays a no-op
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");
        assert!(registry.is_empty().await);
    }

    #[fluvio_future::test]
    async fn test_reconcile_is_idempotent() {
        let (client, registry, reconciler) = setup();
        let ctx = ReconcileContext::new(StickyEvent::shared());
        let key = ObjectKey::new("deploy");
        client.create(button("deploy", "frontend")).await.expect("create");

        let listener = registry.change_listener();
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");
        let after_first = listener.current_change();
        assert_eq!(after_first, 1);

        reconciler.reconcile(&key, &ctx).await.expect("reconcile");
        assert_eq!(listener.current_change(), after_first);
        assert_eq!(registry.len().await, 1);
    }

    #[fluvio_future::test]
    async fn test_click_is_republished() {
        let (client, registry, reconciler) = setup();
        let ctx = ReconcileContext::new(StickyEvent::shared());
        let key = ObjectKey::new("deploy");
        let created = client.create(button("deploy", "frontend")).await.expect("create");
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");

        let clicked = Utc::now();
        client
            .update_status::<UIButtonSpec>(
                &key,
                UIButtonStatus::clicked_at(clicked),
                created.resource_version(),
            )
            .await
            .expect("click");
        reconciler.reconcile(&key, &ctx).await.expect("reconcile");

        let published = registry.get("deploy").await.expect("published");
        assert_eq!(published.status.last_clicked_at, Some(clicked));
        assert_eq!(published.spec.text, "Run");
    }
}
