pub mod api;
pub mod client;

pub use client::TraktClient;

pub const DEFAULT_BASE_URL: &str = "https://api.trakt.tv";
