//! The registered scenarios: one API suite, one UI suite per browser project

pub mod api;
pub mod ui;

pub use api::{ApiContext, ApiSuite};
pub use ui::{UiContext, UiSuite};
