//! Role-based authorization. Rules are built per person from their role grants and
//! checked against a subject kind plus the subject's chapter.

use super::errors::DomainError;
use super::person::{Person, RoleGrant};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    New,
    Create,
    Update,
    Destroy,
    /// Matches every action.
    Manage,
    Impersonate,
    TestReport,
    SendReport,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Read => "read",
            Action::New => "new",
            Action::Create => "create",
            Action::Update => "update",
            Action::Destroy => "destroy",
            Action::Manage => "manage",
            Action::Impersonate => "impersonate",
            Action::TestReport => "test_report",
            Action::SendReport => "send_report",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Chapter,
    County,
    Position,
    Person,
    Role,
    CellCarrier,
    DispatchConfig,
    Shift,
    ShiftGroup,
    ShiftCategory,
    ReportSubscription,
    PriceListItem,
    CallLog,
    Vehicle,
    JobLog,
    Motd,
    Partner,
    NamedQuery,
    DataFilter,
    HomepageLink,
    Lookup,
    NotificationEvent,
    NotificationRole,
    DispatchLog,
    Territory,
    Region,
    Incident,
    DatIncident,
    ResponderAssignment,
    ResponderMessage,
    EventLog,
}

/// What is being accessed. `chapter_id: None` is a class-level check ("any X").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub kind: SubjectKind,
    pub chapter_id: Option<i64>,
}

impl Subject {
    pub fn any(kind: SubjectKind) -> Self {
        Self {
            kind,
            chapter_id: None,
        }
    }

    pub fn in_chapter(kind: SubjectKind, chapter_id: i64) -> Self {
        Self {
            kind,
            chapter_id: Some(chapter_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Always,
    Chapter(i64),
    /// Region subjects without a chapter, or the given chapter.
    UnscopedOrChapter(i64),
}

#[derive(Debug, Clone)]
struct Rule {
    actions: Vec<Action>,
    /// `None` applies to every kind.
    kinds: Option<Vec<SubjectKind>>,
    condition: Condition,
}

impl Rule {
    fn matches_action(&self, action: Action) -> bool {
        self.actions.iter().any(|a| *a == Action::Manage || *a == action)
    }

    fn matches_kind(&self, kind: SubjectKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }

    fn matches_subject(&self, subject: &Subject) -> bool {
        match (self.condition, subject.chapter_id) {
            (Condition::Always, _) => true,
            // Class-level checks pass whenever a conditional rule exists.
            (Condition::Chapter(_), None) => true,
            (Condition::Chapter(c), Some(s)) => c == s,
            (Condition::UnscopedOrChapter(_), None) => true,
            (Condition::UnscopedOrChapter(c), Some(s)) => c == s,
        }
    }
}

/// The rule set for one person.
#[derive(Debug, Clone, Default)]
pub struct Ability {
    person_id: i64,
    rules: Vec<Rule>,
}

impl Ability {
    pub fn for_person(person: &Person) -> Self {
        let mut ability = Ability {
            person_id: person.id,
            rules: Vec::new(),
        };
        let chapter = person.chapter_id;

        if person.has_role(RoleGrant::ChapterConfig) {
            ability.can(&[Action::Read, Action::Update], &[SubjectKind::Chapter], Condition::Always);
            ability.can(
                &[Action::Manage],
                &[
                    SubjectKind::County,
                    SubjectKind::Position,
                    SubjectKind::CellCarrier,
                    SubjectKind::Person,
                    SubjectKind::Role,
                    SubjectKind::DispatchConfig,
                    SubjectKind::Shift,
                    SubjectKind::ShiftGroup,
                    SubjectKind::ShiftCategory,
                    SubjectKind::ReportSubscription,
                    SubjectKind::PriceListItem,
                    SubjectKind::CallLog,
                    SubjectKind::Vehicle,
                    SubjectKind::JobLog,
                    SubjectKind::Motd,
                    SubjectKind::Partner,
                    SubjectKind::NamedQuery,
                    SubjectKind::DataFilter,
                    SubjectKind::HomepageLink,
                    SubjectKind::Lookup,
                ],
                Condition::Always,
            );
            ability.rules.push(Rule {
                actions: vec![Action::Manage],
                kinds: None,
                condition: Condition::Always,
            });
        }

        if person.has_role(RoleGrant::ChapterAdmin) {
            let own = Condition::Chapter(chapter);
            ability.can(
                &[Action::Read],
                &[SubjectKind::Person, SubjectKind::County, SubjectKind::Position],
                own,
            );
            ability.can(&[Action::Impersonate], &[SubjectKind::Person], own);
            ability.can(
                &[Action::Manage],
                &[SubjectKind::Vehicle, SubjectKind::HomepageLink],
                own,
            );
            ability.can(
                &[Action::New, Action::TestReport, Action::SendReport],
                &[SubjectKind::ReportSubscription],
                Condition::Always,
            );
            ability.can(&[Action::Manage], &[SubjectKind::ReportSubscription], own);
            ability.can(
                &[Action::Manage],
                &[
                    SubjectKind::NotificationEvent,
                    SubjectKind::NotificationRole,
                    SubjectKind::Territory,
                ],
                own,
            );
            ability.can(&[Action::Read, Action::Update], &[SubjectKind::DispatchConfig], own);
            ability.can(&[Action::Read], &[SubjectKind::DispatchLog], own);
            ability.can(
                &[Action::Manage],
                &[SubjectKind::Region],
                Condition::UnscopedOrChapter(chapter),
            );
        }

        if person.has_role(RoleGrant::IncidentsAdmin) {
            ability.can(
                &[Action::Manage],
                &[
                    SubjectKind::Incident,
                    SubjectKind::DatIncident,
                    SubjectKind::ResponderAssignment,
                    SubjectKind::ResponderMessage,
                    SubjectKind::EventLog,
                ],
                Condition::Chapter(chapter),
            );
            ability.can(&[Action::Read], &[SubjectKind::Person], Condition::Chapter(chapter));
        }

        if person.has_role(RoleGrant::SubmitIncidentReport) {
            let own = Condition::Chapter(chapter);
            ability.can(&[Action::Read], &[SubjectKind::Incident, SubjectKind::EventLog], own);
            ability.can(
                &[Action::Read, Action::Create, Action::Update],
                &[SubjectKind::DatIncident],
                own,
            );
            ability.can(&[Action::Update], &[SubjectKind::Incident], own);
        }

        ability
    }

    fn can(&mut self, actions: &[Action], kinds: &[SubjectKind], condition: Condition) {
        self.rules.push(Rule {
            actions: actions.to_vec(),
            kinds: Some(kinds.to_vec()),
            condition,
        });
    }

    pub fn allows(&self, action: Action, subject: &Subject) -> bool {
        self.rules.iter().any(|rule| {
            rule.matches_action(action) && rule.matches_kind(subject.kind) && rule.matches_subject(subject)
        })
    }

    pub fn authorize(&self, action: Action, subject: &Subject) -> Result<(), DomainError> {
        if self.allows(action, subject) {
            Ok(())
        } else {
            tracing::debug!(person_id = self.person_id, %action, ?subject, "authorization denied");
            Err(DomainError::Forbidden {
                action: action.to_string(),
                subject: format!("{:?}", subject.kind),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::person::sample_person;

    fn person_with(roles: &[RoleGrant]) -> Person {
        let mut p = sample_person(1, "Admin");
        p.roles = roles.to_vec();
        p
    }

    #[test]
    fn test_no_roles_no_access() {
        let ability = Ability::for_person(&person_with(&[]));
        assert!(!ability.allows(Action::Read, &Subject::in_chapter(SubjectKind::Incident, 1)));
        assert!(ability.authorize(Action::Read, &Subject::any(SubjectKind::Incident)).is_err());
    }

    #[test]
    fn test_chapter_config_manages_everything() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::ChapterConfig]));
        assert!(ability.allows(Action::Destroy, &Subject::in_chapter(SubjectKind::Incident, 99)));
        assert!(ability.allows(Action::Create, &Subject::any(SubjectKind::Chapter)));
    }

    #[test]
    fn test_chapter_admin_is_chapter_scoped() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::ChapterAdmin]));
        let own_vehicle = Subject::in_chapter(SubjectKind::Vehicle, 1);
        let other_vehicle = Subject::in_chapter(SubjectKind::Vehicle, 2);
        assert!(ability.allows(Action::Destroy, &own_vehicle));
        assert!(!ability.allows(Action::Destroy, &other_vehicle));

        assert!(ability.allows(Action::Read, &Subject::in_chapter(SubjectKind::Person, 1)));
        assert!(!ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::Person, 1)));
        assert!(ability.allows(Action::Impersonate, &Subject::in_chapter(SubjectKind::Person, 1)));

        assert!(ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::DispatchConfig, 1)));
        assert!(!ability.allows(Action::Destroy, &Subject::in_chapter(SubjectKind::DispatchConfig, 1)));
        assert!(!ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::DispatchLog, 1)));
    }

    #[test]
    fn test_report_subscription_actions() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::ChapterAdmin]));
        let other = Subject::in_chapter(SubjectKind::ReportSubscription, 2);
        assert!(ability.allows(Action::SendReport, &other));
        assert!(ability.allows(Action::New, &other));
        assert!(!ability.allows(Action::Destroy, &other));
    }

    #[test]
    fn test_region_proxy() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::ChapterAdmin]));
        assert!(ability.allows(Action::Manage, &Subject::any(SubjectKind::Region)));
        assert!(ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::Region, 1)));
        assert!(!ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::Region, 3)));
    }

    #[test]
    fn test_class_level_check_with_conditional_rule() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::IncidentsAdmin]));
        assert!(ability.allows(Action::Create, &Subject::any(SubjectKind::Incident)));
        assert!(!ability.allows(Action::Create, &Subject::any(SubjectKind::Vehicle)));
    }

    #[test]
    fn test_report_submitter() {
        let ability = Ability::for_person(&person_with(&[RoleGrant::SubmitIncidentReport]));
        assert!(ability.allows(Action::Update, &Subject::in_chapter(SubjectKind::DatIncident, 1)));
        assert!(ability.allows(Action::Read, &Subject::in_chapter(SubjectKind::Incident, 1)));
        assert!(!ability.allows(Action::Destroy, &Subject::in_chapter(SubjectKind::Incident, 1)));
        assert!(!ability.allows(
            Action::Create,
            &Subject::in_chapter(SubjectKind::ResponderAssignment, 1)
        ));
    }
}
