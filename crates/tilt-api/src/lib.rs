pub mod button;

pub use tilt_stream_model::core;

pub mod store {
    pub use tilt_stream_model::store::*;
}

pub mod validation {
    pub use tilt_stream_model::validation::*;
}

pub(crate) fn is_false(b: &bool) -> bool {
    !b
}
