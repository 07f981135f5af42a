//! Application use cases. Orchestrate domain logic via ports.

pub mod directory_service;
pub mod dispatch_service;
pub mod incident_service;
pub mod message_service;
pub mod outbox;
pub mod report_service;

pub use directory_service::DirectoryService;
pub use dispatch_service::{AssignRequest, DirectMessage, DispatchService, MessageTemplate};
pub use incident_service::{DatSubmission, IncidentService, IncidentUpdate};
pub use message_service::MessageService;
pub use outbox::Outbox;
pub use report_service::ReportService;
