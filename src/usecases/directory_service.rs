//! Directory service. Chapters and their people.
//!
//! A fresh install has nobody to authorize the first writes, so the first chapter and
//! the first person of a chapter may be created without an actor.

use crate::domain::{Ability, Action, Chapter, DomainError, Person, Subject, SubjectKind};
use crate::ports::{ChapterRepo, PersonRepo};
use std::sync::Arc;
use tracing::info;

pub struct DirectoryService {
    chapters: Arc<dyn ChapterRepo>,
    people: Arc<dyn PersonRepo>,
}

impl DirectoryService {
    pub fn new(chapters: Arc<dyn ChapterRepo>, people: Arc<dyn PersonRepo>) -> Self {
        Self { chapters, people }
    }

    pub async fn create_chapter(&self, actor: Option<&Person>, chapter: Chapter) -> Result<Chapter, DomainError> {
        let bootstrap = self.chapters.list_chapters().await?.is_empty();
        if !bootstrap {
            let actor = require_actor(actor)?;
            Ability::for_person(actor).authorize(Action::Create, &Subject::any(SubjectKind::Chapter))?;
        }
        chapter.validate()?;
        let created = self.chapters.create_chapter(&chapter).await?;
        info!(chapter_id = created.id, bootstrap, "chapter registered");
        Ok(created)
    }

    pub async fn add_person(
        &self,
        actor: Option<&Person>,
        chapter: &Chapter,
        mut person: Person,
    ) -> Result<Person, DomainError> {
        let bootstrap = self.people.people_in_chapter(chapter.id).await?.is_empty();
        if !bootstrap {
            let actor = require_actor(actor)?;
            Ability::for_person(actor).authorize(
                Action::Create,
                &Subject::in_chapter(SubjectKind::Person, chapter.id),
            )?;
        }
        person.id = 0;
        person.chapter_id = chapter.id;
        person.validate()?;
        let created = self.people.create_person(&person).await?;
        info!(person_id = created.id, chapter_id = chapter.id, "person added");
        Ok(created)
    }

    pub async fn chapter_by_slug(&self, slug: &str) -> Result<Chapter, DomainError> {
        self.chapters.find_chapter_by_slug(slug).await
    }

    pub async fn person(&self, id: i64) -> Result<Person, DomainError> {
        self.people.get_person(id).await
    }
}

fn require_actor(actor: Option<&Person>) -> Result<&Person, DomainError> {
    actor.ok_or_else(|| DomainError::Forbidden {
        action: Action::Create.to_string(),
        subject: "anonymous request".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::SqliteRepo;
    use crate::domain::RoleGrant;
    use crate::domain::chapter::sample_chapter;
    use crate::domain::person::sample_person;

    async fn service() -> DirectoryService {
        let repo = Arc::new(SqliteRepo::in_memory().await.unwrap());
        DirectoryService::new(repo.clone(), repo)
    }

    #[tokio::test]
    async fn test_bootstrap_then_authorized_writes() {
        let directory = service().await;
        let chapter = directory.create_chapter(None, sample_chapter()).await.unwrap();

        let mut admin = sample_person(0, "Admin");
        admin.roles = vec![RoleGrant::ChapterConfig];
        let admin = directory.add_person(None, &chapter, admin).await.unwrap();

        // Second person needs an actor now.
        let anonymous = directory
            .add_person(None, &chapter, sample_person(0, "Responder1"))
            .await;
        assert!(matches!(anonymous, Err(DomainError::Forbidden { .. })));

        let volunteer = directory
            .add_person(Some(&admin), &chapter, sample_person(0, "Responder1"))
            .await
            .unwrap();
        assert_eq!(volunteer.chapter_id, chapter.id);

        let denied = directory
            .add_person(Some(&volunteer), &chapter, sample_person(0, "Responder2"))
            .await;
        assert!(matches!(denied, Err(DomainError::Forbidden { .. })));

        let mut other = sample_chapter();
        other.url_slug = "arcsv".into();
        assert!(directory.create_chapter(None, other.clone()).await.is_err());
        assert!(directory.create_chapter(Some(&admin), other).await.is_ok());
    }
}
