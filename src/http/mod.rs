//! HTTP/JSON adapter.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net::connection)
//!     → server.rs (router, middleware stack)
//!     → request.rs (request ID, RequestContext extraction)
//!     → middleware/ (tenancy gate, bearer propagation)
//!     → handlers.rs + params.rs (decode query string, call QueryService)
//!     → response.rs (JSON envelope, status mapping)
//! ```

pub mod handlers;
pub mod middleware;
pub mod params;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::build_router;
