#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod render;
