//! Core domain layer. No external I/O dependencies.
//!
//! Entities, validation rules, the dispatch state machine and authorization rules
//! live here. Dependencies flow inward.

pub mod ability;
pub mod chapter;
pub mod dat_incident;
pub mod dispatch;
pub mod errors;
pub mod event_log;
pub mod geo;
pub mod incident;
pub mod message;
pub mod person;
pub mod report;

pub use ability::{Ability, Action, Subject, SubjectKind};
pub use chapter::{Chapter, IncidentNumberSequence, TRACKED_RESOURCE_TYPES};
pub use dat_incident::{DatIncident, ResponderTime};
pub use dispatch::{
    AssignmentRole, RecruitmentResponse, ResponderAssignment, ResponderRecruitment,
    ResponderStatus,
};
pub use errors::{DomainError, ValidationErrors};
pub use event_log::{EventKind, EventLog};
pub use geo::LatLng;
pub use incident::{Incident, IncidentStats, IncidentStatus, NewIncident};
pub use message::{Direction, ResponderMessage, SmsReply};
pub use person::{Person, RoleGrant};
pub use report::{DateRange, FiscalYear};
