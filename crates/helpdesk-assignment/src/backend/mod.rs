pub mod rest;

pub use rest::{RestBackendConfig, RestTicketBackend};
