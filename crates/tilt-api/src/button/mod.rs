mod spec;
mod status;

pub use self::spec::*;
pub use self::status::*;

use crate::store::MetadataStoreObject;

pub type UIButton = MetadataStoreObject<UIButtonSpec>;
