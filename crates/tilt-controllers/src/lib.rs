mod bootstrap;
pub mod uibutton;

pub use bootstrap::*;
