//! Port traits. API boundaries for the hexagon.
//!
//! - Outbound: called by the application into infrastructure (storage, SMS, mail, maps)
//! - Inbound traffic arrives through the HTTP adapter, which calls use cases directly

pub mod outbound;

pub use outbound::{
    Attachment, ChapterRepo, DispatchRepo, Email, IncidentRepo, MapImage, MapProvider, Mailer,
    MessageRepo, PersonRepo, SmsGateway, UrlShortener,
};
