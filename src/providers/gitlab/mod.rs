mod api;
mod client;
mod types;
pub mod variables;

pub use api::GitLabApi;
pub use client::GitLabClient;
pub use types::*;
