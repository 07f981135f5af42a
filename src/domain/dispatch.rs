//! Responder dispatch: assignments with their status progression, and SMS recruitments.
//!
//! An assignment moves `assigned -> dispatched -> on_scene -> departed`, one step at a
//! time. Re-applying the current status is a no-op so repeated clicks or retried
//! requests do not fail or rewrite timestamps.

use super::errors::{DomainError, ValidationErrors};
use super::event_log::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole {
    TeamLead,
    Responder,
    Trainee,
    NotAvailable,
    NoAnswer,
}

impl AssignmentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentRole::TeamLead => "team_lead",
            AssignmentRole::Responder => "responder",
            AssignmentRole::Trainee => "trainee",
            AssignmentRole::NotAvailable => "not_available",
            AssignmentRole::NoAnswer => "no_answer",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssignmentRole::TeamLead => "Team Lead",
            AssignmentRole::Responder => "Responder",
            AssignmentRole::Trainee => "Trainee",
            AssignmentRole::NotAvailable => "Not Available",
            AssignmentRole::NoAnswer => "No Answer",
        }
    }

    /// Roles that put the person on the response.
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            AssignmentRole::TeamLead | AssignmentRole::Responder | AssignmentRole::Trainee
        )
    }
}

impl fmt::Display for AssignmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "team_lead" => Ok(AssignmentRole::TeamLead),
            "responder" => Ok(AssignmentRole::Responder),
            "trainee" => Ok(AssignmentRole::Trainee),
            "not_available" => Ok(AssignmentRole::NotAvailable),
            "no_answer" => Ok(AssignmentRole::NoAnswer),
            other => Err(DomainError::invalid("role", format!("{other} is not a role"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderStatus {
    Assigned,
    Dispatched,
    OnScene,
    Departed,
}

impl ResponderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStatus::Assigned => "assigned",
            ResponderStatus::Dispatched => "dispatched",
            ResponderStatus::OnScene => "on_scene",
            ResponderStatus::Departed => "departed",
        }
    }

    /// Console caption, e.g. "On Scene at".
    pub fn caption(&self) -> &'static str {
        match self {
            ResponderStatus::Assigned => "Assigned at",
            ResponderStatus::Dispatched => "Dispatched at",
            ResponderStatus::OnScene => "On Scene at",
            ResponderStatus::Departed => "Departed at",
        }
    }

    pub fn event(&self) -> EventKind {
        match self {
            ResponderStatus::Assigned => EventKind::ResponderAssigned,
            ResponderStatus::Dispatched => EventKind::ResponderDispatched,
            ResponderStatus::OnScene => EventKind::ResponderOnScene,
            ResponderStatus::Departed => EventKind::ResponderDeparted,
        }
    }

    fn next(&self) -> Option<ResponderStatus> {
        match self {
            ResponderStatus::Assigned => Some(ResponderStatus::Dispatched),
            ResponderStatus::Dispatched => Some(ResponderStatus::OnScene),
            ResponderStatus::OnScene => Some(ResponderStatus::Departed),
            ResponderStatus::Departed => None,
        }
    }
}

impl fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(ResponderStatus::Assigned),
            "dispatched" => Ok(ResponderStatus::Dispatched),
            "on_scene" => Ok(ResponderStatus::OnScene),
            "departed" => Ok(ResponderStatus::Departed),
            other => Err(DomainError::invalid("status", format!("{other} is not a status"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderAssignment {
    pub id: i64,
    pub incident_id: i64,
    pub person_id: i64,
    pub role: AssignmentRole,
    pub assigned_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub on_scene_at: Option<DateTime<Utc>>,
    pub departed_scene_at: Option<DateTime<Utc>>,
}

impl ResponderAssignment {
    pub fn new(incident_id: i64, person_id: i64, role: AssignmentRole, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            incident_id,
            person_id,
            role,
            assigned_at: now,
            dispatched_at: None,
            on_scene_at: None,
            departed_scene_at: None,
        }
    }

    pub fn was_available(&self) -> bool {
        self.role.is_available()
    }

    pub fn status(&self) -> ResponderStatus {
        if self.departed_scene_at.is_some() {
            ResponderStatus::Departed
        } else if self.on_scene_at.is_some() {
            ResponderStatus::OnScene
        } else if self.dispatched_at.is_some() {
            ResponderStatus::Dispatched
        } else {
            ResponderStatus::Assigned
        }
    }

    /// Timestamp of the current status.
    pub fn status_time(&self) -> DateTime<Utc> {
        match self.status() {
            ResponderStatus::Assigned => self.assigned_at,
            ResponderStatus::Dispatched => self.dispatched_at.unwrap_or(self.assigned_at),
            ResponderStatus::OnScene => self.on_scene_at.unwrap_or(self.assigned_at),
            ResponderStatus::Departed => self.departed_scene_at.unwrap_or(self.assigned_at),
        }
    }

    /// Still on the response (available and not yet departed).
    pub fn is_active(&self) -> bool {
        self.was_available() && self.status() != ResponderStatus::Departed
    }

    /// Move to `target`. Returns `Ok(false)` when already there.
    pub fn advance(&mut self, target: ResponderStatus, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let current = self.status();
        if current == target {
            return Ok(false);
        }
        if !self.was_available() {
            return Err(DomainError::InvalidTransition(format!(
                "{} responders cannot be marked {}",
                self.role.label(),
                target
            )));
        }
        if current.next() != Some(target) {
            return Err(DomainError::InvalidTransition(format!(
                "cannot move from {current} to {target}"
            )));
        }
        match target {
            ResponderStatus::Assigned => {}
            ResponderStatus::Dispatched => self.dispatched_at = Some(now),
            ResponderStatus::OnScene => self.on_scene_at = Some(now),
            ResponderStatus::Departed => self.departed_scene_at = Some(now),
        }
        Ok(true)
    }

    /// Change role on re-assignment. Progress is cleared when the person becomes unavailable.
    pub fn reassign(&mut self, role: AssignmentRole) {
        self.role = role;
        if !role.is_available() {
            self.dispatched_at = None;
            self.on_scene_at = None;
            self.departed_scene_at = None;
        }
    }
}

/// One team lead per incident. `candidate` may already be in `existing` (re-assignment).
pub fn check_team_lead(
    existing: &[ResponderAssignment],
    candidate: &ResponderAssignment,
) -> Result<(), DomainError> {
    if candidate.role != AssignmentRole::TeamLead {
        return Ok(());
    }
    let taken = existing.iter().any(|a| {
        a.role == AssignmentRole::TeamLead
            && a.incident_id == candidate.incident_id
            && a.person_id != candidate.person_id
    });
    if taken {
        let mut errors = ValidationErrors::new();
        errors.add("role", "a team lead is already assigned to this incident");
        return errors.into_result();
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecruitmentResponse {
    Pending,
    Available,
    Unavailable,
}

impl RecruitmentResponse {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecruitmentResponse::Pending => "pending",
            RecruitmentResponse::Available => "available",
            RecruitmentResponse::Unavailable => "unavailable",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecruitmentResponse::Pending => "Message Sent",
            RecruitmentResponse::Available => "Available",
            RecruitmentResponse::Unavailable => "Not Available",
        }
    }
}

impl FromStr for RecruitmentResponse {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecruitmentResponse::Pending),
            "available" => Ok(RecruitmentResponse::Available),
            "unavailable" => Ok(RecruitmentResponse::Unavailable),
            other => Err(DomainError::invalid(
                "response",
                format!("{other} is not a response"),
            )),
        }
    }
}

/// An SMS availability request sent to one person for one incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponderRecruitment {
    pub id: i64,
    pub incident_id: i64,
    pub person_id: i64,
    pub outbound_message_id: Option<i64>,
    pub inbound_message_id: Option<i64>,
    pub response: RecruitmentResponse,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResponderRecruitment {
    pub fn new(incident_id: i64, person_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            incident_id,
            person_id,
            outbound_message_id: None,
            inbound_message_id: None,
            response: RecruitmentResponse::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response == RecruitmentResponse::Pending
    }

    /// Pending with the request SMS actually sent.
    pub fn is_awaiting_reply(&self) -> bool {
        self.is_pending() && self.outbound_message_id.is_some()
    }

    /// Record a yes/no answer. Returns false when the answer did not change anything.
    pub fn record_reply(&mut self, available: bool, inbound_message_id: i64, now: DateTime<Utc>) -> bool {
        let response = if available {
            RecruitmentResponse::Available
        } else {
            RecruitmentResponse::Unavailable
        };
        if self.response == response {
            return false;
        }
        self.response = response;
        self.inbound_message_id = Some(inbound_message_id);
        self.updated_at = now;
        true
    }

    /// Start a fresh request after a previous answer. The new SMS id is set once sent.
    pub fn reopen(&mut self, now: DateTime<Utc>) {
        self.response = RecruitmentResponse::Pending;
        self.outbound_message_id = None;
        self.inbound_message_id = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assignment(role: AssignmentRole) -> ResponderAssignment {
        ResponderAssignment::new(1, 2, role, Utc::now())
    }

    #[test]
    fn test_forward_progression() {
        let mut a = assignment(AssignmentRole::Responder);
        let t0 = a.assigned_at;
        assert_eq!(a.status(), ResponderStatus::Assigned);

        assert!(a.advance(ResponderStatus::Dispatched, t0 + Duration::minutes(1)).unwrap());
        assert!(a.advance(ResponderStatus::OnScene, t0 + Duration::minutes(30)).unwrap());
        assert!(a.advance(ResponderStatus::Departed, t0 + Duration::minutes(90)).unwrap());
        assert_eq!(a.status(), ResponderStatus::Departed);
        assert_eq!(a.status_time(), t0 + Duration::minutes(90));
        assert!(!a.is_active());
    }

    #[test]
    fn test_repeat_is_noop() {
        let mut a = assignment(AssignmentRole::TeamLead);
        let t = a.assigned_at + Duration::minutes(2);
        assert!(a.advance(ResponderStatus::Dispatched, t).unwrap());
        assert!(!a.advance(ResponderStatus::Dispatched, t + Duration::minutes(5)).unwrap());
        assert_eq!(a.dispatched_at, Some(t));
    }

    #[test]
    fn test_skip_and_backwards_rejected() {
        let mut a = assignment(AssignmentRole::Responder);
        let now = Utc::now();
        assert!(matches!(
            a.advance(ResponderStatus::OnScene, now),
            Err(DomainError::InvalidTransition(_))
        ));
        a.advance(ResponderStatus::Dispatched, now).unwrap();
        a.advance(ResponderStatus::OnScene, now).unwrap();
        assert!(matches!(
            a.advance(ResponderStatus::Dispatched, now),
            Err(DomainError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_unavailable_cannot_be_dispatched() {
        let mut a = assignment(AssignmentRole::NotAvailable);
        assert!(!a.was_available());
        assert!(a.advance(ResponderStatus::Dispatched, Utc::now()).is_err());
    }

    #[test]
    fn test_reassign_to_unavailable_clears_progress() {
        let mut a = assignment(AssignmentRole::Responder);
        a.advance(ResponderStatus::Dispatched, Utc::now()).unwrap();
        a.reassign(AssignmentRole::NotAvailable);
        assert_eq!(a.status(), ResponderStatus::Assigned);
        assert!(a.dispatched_at.is_none());
    }

    #[test]
    fn test_single_team_lead() {
        let lead = ResponderAssignment::new(1, 10, AssignmentRole::TeamLead, Utc::now());
        let other = ResponderAssignment::new(1, 11, AssignmentRole::TeamLead, Utc::now());
        let existing = vec![lead.clone()];
        assert!(check_team_lead(&existing, &other).is_err());
        assert!(check_team_lead(&existing, &lead).is_ok());

        let responder = ResponderAssignment::new(1, 11, AssignmentRole::Responder, Utc::now());
        assert!(check_team_lead(&existing, &responder).is_ok());
    }

    #[test]
    fn test_recruitment_replies() {
        let now = Utc::now();
        let mut r = ResponderRecruitment::new(1, 2, now);
        assert_eq!(r.response.label(), "Message Sent");
        assert!(r.record_reply(true, 5, now));
        assert!(!r.record_reply(true, 6, now));
        assert_eq!(r.inbound_message_id, Some(5));
        assert!(r.record_reply(false, 7, now));
        assert_eq!(r.response.label(), "Not Available");

        r.reopen(now);
        assert!(r.is_pending());
        assert!(!r.is_awaiting_reply());
        assert!(r.inbound_message_id.is_none());
        r.outbound_message_id = Some(8);
        assert!(r.is_awaiting_reply());
    }
}
