use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::Status;

#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UIButtonStatus {
    /// unset until first click
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_clicked_at: Option<DateTime<Utc>>,
    /// last reconcile failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Status for UIButtonStatus {
    fn set_reconcile_error(&mut self, error: Option<String>) {
        self.error = error;
    }

    fn reconcile_error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl UIButtonStatus {
    pub fn clicked_at(time: DateTime<Utc>) -> Self {
        Self {
            last_clicked_at: Some(time),
            error: None,
        }
    }

    /// record click, keeps error state
    pub fn click(&mut self, time: DateTime<Utc>) {
        self.last_clicked_at = Some(time);
    }
}

#[cfg(test)]
mod test {

    use chrono::Utc;

    use crate::button::{UIButton, UIButtonSpec, UIComponentLocation};
    use crate::core::{ObjectKey, ObjectMeta};
    use crate::store::LocalStore;

    use super::UIButtonStatus;

    fn deploy_button() -> UIButton {
        UIButton::new(
            ObjectMeta::new("deploy"),
            UIButtonSpec::new(UIComponentLocation::resource("frontend"), "Deploy"),
        )
    }

    #[fluvio_future::test]
    async fn test_button_status_sub_resource() {
        let store = LocalStore::<UIButtonSpec>::new_shared();
        let key = ObjectKey::new("deploy");

        // given
        let created = store.create(deploy_button()).await.expect("create");
        let value = store.get(&key).await.expect("get");
        assert!(value.status.last_clicked_at.is_none());

        // when
        let clicked = Utc::now();
        store
            .update_status(
                &key,
                UIButtonStatus::clicked_at(clicked),
                created.resource_version(),
            )
            .await
            .expect("update status");

        // then
        let value = store.get(&key).await.expect("get");
        assert_eq!(value.status.last_clicked_at, Some(clicked));
        assert_eq!(value.spec.text, "Deploy");
        assert_eq!(value.spec, created.spec);
    }

    #[fluvio_future::test]
    async fn test_invalid_button_never_stored() {
        let store = LocalStore::<UIButtonSpec>::new_shared();
        let mut button = deploy_button();
        button.spec.text = String::new();

        let err = store.create(button).await.expect_err("invalid");
        assert!(
            err.field_errors()
                .and_then(|errors| errors.find("spec.text"))
                .is_some()
        );
        assert_eq!(store.count().await, 0);

        // namespace is not allowed on cluster scoped kind
        let mut button = deploy_button();
        button.meta.namespace = Some("default".to_owned());
        let err = store.create(button).await.expect_err("namespaced");
        assert!(
            err.field_errors()
                .and_then(|errors| errors.find("metadata.namespace"))
                .is_some()
        );
    }

    #[test]
    fn test_status_json() {
        let json = serde_json::to_value(UIButtonStatus::default()).expect("serialize");
        assert_eq!(json, serde_json::json!({}));

        let mut status = UIButtonStatus::default();
        status.click(Utc::now());
        let json = serde_json::to_value(&status).expect("serialize");
        assert!(json.get("lastClickedAt").is_some());
    }
}
