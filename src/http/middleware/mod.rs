//! Request middleware for the HTTP adapter.

pub mod bearer;
pub mod tenancy;

pub use bearer::bearer_token_propagation;
pub use tenancy::tenancy_gate;
