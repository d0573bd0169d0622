pub mod client;

pub use client::StremioClient;

pub const DEFAULT_BASE_URL: &str = "https://api.strem.io";
