//! Third-party web integrations: URL shortening and maps.

pub mod bitly;
pub mod mock;
pub mod static_maps;

pub use bitly::BitlyShortener;
pub use mock::{MockMaps, MockShortener};
pub use static_maps::GoogleStaticMaps;
