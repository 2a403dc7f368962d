//! HTTP surface of the recommendation server.

pub mod rest;

pub use rest::{configure, AppState, RestApi};
