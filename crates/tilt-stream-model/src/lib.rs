pub mod core;
pub mod epoch;
pub mod store;
pub mod validation;

#[cfg(any(test, feature = "fixture"))]
pub mod fixture {

    use serde::{Serialize, Deserialize};

    use crate::core::{Spec, Status, ObjectMeta};
    use crate::store::MetadataStoreObject;
    use crate::validation::{ErrorList, FieldError, FieldPath};

    // define test spec and status
    #[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
    pub struct TestSpec {
        pub replica: u16,
    }

    impl Spec for TestSpec {
        const LABEL: &'static str = "Test";
        const PLURAL: &'static str = "tests";
        const NAMESPACED: bool = true;
        type Status = TestStatus;

        fn validate(&self) -> ErrorList {
            let mut errors = ErrorList::default();
            if self.replica == 0 {
                errors.push(FieldError::invalid(
                    FieldPath::new("spec.replica"),
                    self.replica,
                    "replica must be positive",
                ));
            }
            errors
        }
    }

    #[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
    pub struct TestStatus {
        pub up: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    impl Status for TestStatus {
        fn set_reconcile_error(&mut self, error: Option<String>) {
            self.error = error;
        }

        fn reconcile_error(&self) -> Option<&str> {
            self.error.as_deref()
        }
    }

    /// cluster scoped kind
    #[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
    pub struct GlobalSpec {
        pub value: String,
    }

    impl Spec for GlobalSpec {
        const LABEL: &'static str = "Global";
        const PLURAL: &'static str = "globals";
        type Status = GlobalStatus;
    }

    #[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
    pub struct GlobalStatus {
        pub seen: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    impl Status for GlobalStatus {
        fn set_reconcile_error(&mut self, error: Option<String>) {
            self.error = error;
        }

        fn reconcile_error(&self) -> Option<&str> {
            self.error.as_deref()
        }
    }

    pub type DefaultTest = MetadataStoreObject<TestSpec>;

    pub fn test_object(name: &str, replica: u16) -> DefaultTest {
        MetadataStoreObject::new(
            ObjectMeta::namespaced("default", name),
            TestSpec { replica },
        )
    }

    pub fn global_object(name: &str, value: &str) -> MetadataStoreObject<GlobalSpec> {
        MetadataStoreObject::new(
            ObjectMeta::new(name),
            GlobalSpec {
                value: value.to_owned(),
            },
        )
    }
}
