pub mod cinemeta;
pub mod error;
pub mod http;
pub mod provider;
pub mod stremio;
pub mod traits;
pub mod trakt;

pub use cinemeta::CinemetaClient;
pub use error::SourceError;
pub use provider::CredentialClientProvider;
pub use stremio::StremioClient;
pub use traits::{ClientProvider, HistoryClient, IdMapStore, LibraryClient, LinkStore, MetadataProvider};
pub use trakt::TraktClient;
