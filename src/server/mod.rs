mod api;
mod mirror;
mod objects;
mod registry;
pub mod response;
mod router;

pub use router::{AppState, create_router};
