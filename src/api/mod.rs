// API module
//
// HTTP transport for the node: routes, handlers and the typed request and
// response bodies

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
