mod event;
mod local;
mod registry;
mod watch;

pub use event::*;
pub use local::*;
pub use registry::*;
pub use watch::*;

pub use crate::epoch::*;

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use tilt_types::KindLabel;

use crate::core::{ObjectKey, ObjectMeta, ResourceVersion, Spec};
use crate::validation::{ErrorList, FieldError, FieldPath};

/// Object as kept by the store: identity and versioning, desired and observed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct MetadataStoreObject<S>
where
    S: Spec,
{
    #[serde(rename = "metadata")]
    pub meta: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: S::Status,
}

impl<S> Default for MetadataStoreObject<S>
where
    S: Spec,
{
    fn default() -> Self {
        Self {
            meta: ObjectMeta::default(),
            spec: S::default(),
            status: S::Status::default(),
        }
    }
}

impl<S> MetadataStoreObject<S>
where
    S: Spec,
{
    pub fn new(meta: ObjectMeta, spec: S) -> Self {
        Self {
            meta,
            spec,
            status: S::Status::default(),
        }
    }

    pub fn with_status(mut self, status: S::Status) -> Self {
        self.status = status;
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.meta.key()
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn resource_version(&self) -> ResourceVersion {
        self.meta.resource_version
    }

    /// status sub-resource: replace status only.
    /// returns true if status is different
    pub fn apply_status(&mut self, status: S::Status) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        true
    }

    /// validate identity against kind scope then spec
    pub fn validate(&self) -> ErrorList {
        let mut errors = ErrorList::default();
        let meta_path = FieldPath::new("metadata");

        if self.meta.name.is_empty() {
            errors.push(FieldError::required(
                meta_path.child("name"),
                "name or generateName is required",
            ));
        }

        match (&self.meta.namespace, S::NAMESPACED) {
            (None, true) => errors.push(FieldError::required(
                meta_path.child("namespace"),
                format!("{} is namespaced", S::LABEL),
            )),
            (Some(namespace), true) if namespace.is_empty() => {
                errors.push(FieldError::required(
                    meta_path.child("namespace"),
                    format!("{} is namespaced", S::LABEL),
                ))
            }
            (Some(_), false) => errors.push(FieldError::forbidden(
                meta_path.child("namespace"),
                format!("not allowed on cluster scoped {}", S::LABEL),
            )),
            _ => {}
        }

        errors.extend(self.spec.validate());
        errors
    }
}

/// equality based selection on labels, empty selector matches everything
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn with_label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn is_everything(&self) -> bool {
        self.match_labels.is_empty()
    }

    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| meta.labels.get(key) == Some(value))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{kind} \"{key}\" not found")]
    NotFound { kind: KindLabel, key: ObjectKey },
    #[error("{kind} \"{key}\" already exists")]
    AlreadyExists { kind: KindLabel, key: ObjectKey },
    #[error(
        "operation cannot be fulfilled on {kind} \"{key}\": object has been modified, expected version: {expected}, current: {current}"
    )]
    Conflict {
        kind: KindLabel,
        key: ObjectKey,
        expected: ResourceVersion,
        current: ResourceVersion,
    },
    #[error("{kind} \"{key}\" is invalid: {errors}")]
    Invalid {
        kind: KindLabel,
        key: ObjectKey,
        errors: ErrorList,
    },
    #[error("kind {0} is not registered")]
    UnknownKind(KindLabel),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// field errors of rejected write
    pub fn field_errors(&self) -> Option<&ErrorList> {
        match self {
            Self::Invalid { errors, .. } => Some(errors),
            _ => None,
        }
    }
}
