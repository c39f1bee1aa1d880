//! HTTP surface: JSON API under `/api`, legacy credential routes at the root.

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::{AppState, app_router};
