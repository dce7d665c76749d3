#![allow(dead_code)]

mod catalog;
mod http;

pub use catalog::*;
pub use http::*;
