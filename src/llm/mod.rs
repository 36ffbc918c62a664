//! Remote text and image generation clients
//!
//! Both services are consumed as black-box request/response APIs.

pub mod client;
pub mod image;
pub mod types;

pub use client::{ChatClient, ChatError, CompletionOptions};
pub use image::{ImageClient, ImageError, ImageOptions};
pub use types::ChatMessage;
