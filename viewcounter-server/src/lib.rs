pub mod server;
mod handler;
mod response;
mod state;
mod visitor;

pub use server::ViewCounterServer;
pub use handler::{count_view, handle_request};
pub use response::{ViewCountResponse, format_view_time};
pub use state::AppState;
pub use visitor::VisitorIdentity;
