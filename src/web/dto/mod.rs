//! Data Transfer Objects for the JSON API.

pub mod response;

pub use response::*;
