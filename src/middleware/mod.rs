// Middleware applied to the HTTP router

pub mod cors;

pub use cors::*;
