//!
//! # Object model
//!
//! Every resource kind is described by a [`Spec`] (desired state, written by clients)
//! and its associated [`Status`] (observed state, written by the reconciler owning the kind).
//! Identity and versioning live in [`ObjectMeta`].
//!
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Debug;
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde::de::DeserializeOwned;

use tilt_types::Epoch;
use tilt_types::defaults::{API_GROUP, API_VERSION};

use crate::validation::ErrorList;

pub trait Spec:
    Default + Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// kind name, unique within the store
    const LABEL: &'static str;
    /// lower case plural used for resource path
    const PLURAL: &'static str;
    /// cluster scoped kinds have no namespace
    const NAMESPACED: bool = false;

    type Status: Status;

    /// kind specific validation, invoked by the store on every spec write.
    /// field paths are rooted at `spec`
    fn validate(&self) -> ErrorList {
        ErrorList::default()
    }

    fn group_version_resource() -> GroupVersionResource {
        GroupVersionResource {
            group: API_GROUP,
            version: API_VERSION,
            resource: Self::PLURAL,
        }
    }
}

pub trait Status:
    Default + Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// record or clear last reconcile failure.
    /// every kind carries the slot so persistent failures are visible to readers
    fn set_reconcile_error(&mut self, error: Option<String>);

    fn reconcile_error(&self) -> Option<&str>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    pub group: &'static str,
    pub version: &'static str,
    pub resource: &'static str,
}

impl Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.resource)
    }
}

/// Opaque token advanced on every write of an object.
/// Writes must present the version they last observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(Epoch);

impl ResourceVersion {
    pub const fn new(epoch: Epoch) -> Self {
        Self(epoch)
    }

    #[inline]
    pub fn epoch(&self) -> Epoch {
        self.0
    }
}

impl From<Epoch> for ResourceVersion {
    fn from(epoch: Epoch) -> Self {
        Self(epoch)
    }
}

impl Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// identity of object within a kind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// key for cluster scoped object
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespaced<S: Into<String>, N: Into<String>>(namespace: S, name: N) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

impl From<&str> for ObjectKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// assigned by store on create
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// latest write of any part of the object
    #[serde(default)]
    pub resource_version: ResourceVersion,
    /// last spec or metadata write, used for `update`
    #[serde(default)]
    pub spec_version: ResourceVersion,
    /// last status write, used for `update_status`
    #[serde(default)]
    pub status_version: ResourceVersion,
    /// number of accepted spec writes
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespaced<S: Into<String>, N: Into<String>>(namespace: S, name: N) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn set_labels<T: Into<String>>(mut self, labels: Vec<(T, T)>) -> Self {
        for (key, value) in labels {
            self.labels.insert(key.into(), value.into());
        }
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}
