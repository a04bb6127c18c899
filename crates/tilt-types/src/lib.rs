pub mod defaults;
pub mod event;

//
// Types
//
pub type KindLabel = &'static str;
pub type Epoch = i64;
