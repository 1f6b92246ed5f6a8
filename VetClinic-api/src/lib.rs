// VetClinic-api lib.rs
//
// HTTP surface of the VetClinic application: handlers, routing and the
// OpenAPI document.

// Public modules
pub mod api;
pub mod entities;
pub mod openapi;
