//! REST API 处理器

pub mod admin;
pub mod api_key;
pub mod public;
