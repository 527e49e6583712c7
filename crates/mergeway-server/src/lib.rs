//! # mergeway-server
//!
//! JSON-over-HTTP front end for the mergeway engine.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/repos/{repo}/pulls` | create |
//! | `GET` | `/repos/{repo}/pulls?state=` | list |
//! | `GET` | `/repos/{repo}/pulls/{id}` | get |
//! | `PATCH` | `/repos/{repo}/pulls/{id}` | edit or close |
//! | `GET` | `/repos/{repo}/pulls/{id}/commits` | commits introduced |
//! | `GET` | `/repos/{repo}/pulls/{id}/mergeable` | dry-run merge |
//! | `PUT` | `/repos/{repo}/pulls/{id}/merge` | merge |

pub mod error;
pub mod handlers;
mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::router;
