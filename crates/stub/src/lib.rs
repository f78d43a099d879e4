//! Bugtrack reference backend
//!
//! A small in-memory implementation of the bug tracker HTTP API. It exists
//! so the end-to-end API suite can run hermetically and so the suite has a
//! local target during development:
//!
//! ```text
//! GET    /api/health
//! GET    /api/bugs            POST /api/bugs          DELETE /api/bugs
//! GET    /api/bugs/{id}       PUT  /api/bugs/{id}     DELETE /api/bugs/{id}
//! GET    /api/bugs/{id}/comments                      POST   /api/bugs/{id}/comments
//! ```

pub mod server;
pub mod store;

pub use server::{router, serve, StubServer};
pub use store::{BugStore, StoreError};
