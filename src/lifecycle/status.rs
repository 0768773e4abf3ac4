//! Status transitions and staff notes

use bson::DateTime;
use tracing::info;

use super::{parse_id, LoanService};
use crate::db::schemas::{ApplicationStatus, LoanApplicationDoc, Note};
use crate::types::{LoanDeskError, Result};

fn parse_status(status: &str) -> Result<ApplicationStatus> {
    ApplicationStatus::parse(status).ok_or_else(|| {
        let allowed: Vec<&str> = ApplicationStatus::ALL.iter().map(|s| s.as_str()).collect();
        LoanDeskError::invalid(
            "status",
            format!("`{status}` is not one of {}", allowed.join(", ")),
        )
    })
}

impl LoanService {
    /// Move an application to `status`, recording who did it.
    ///
    /// Any status may follow any other. The timeline entry (and the note,
    /// when `comment` is non-blank) is saved in the same write as the status.
    pub async fn set_status(
        &self,
        id: &str,
        status: &str,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<LoanApplicationDoc> {
        let status = parse_status(status)?;
        let mut record = self.find_by_id(id).await?;
        let previous = record.status;

        record.record_status_change(status, actor, comment, DateTime::now());
        self.store.save(&mut record).await?;

        info!(
            reference = %record.reference(),
            from = %previous,
            to = %status,
            by = %actor,
            "Application status changed"
        );
        Ok(record)
    }

    /// Append a note and return the full note list
    pub async fn add_note(&self, id: &str, actor: &str, text: &str) -> Result<Vec<Note>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LoanDeskError::invalid("text", "Note text is required"));
        }
        let oid = parse_id(id)?;

        let mut record = self.load(oid).await?;
        record.push_note(actor, text, DateTime::now());
        self.store.save(&mut record).await?;

        info!(reference = %record.reference(), by = %actor, "Note added");
        Ok(record.notes)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{service, submission};
    use crate::db::schemas::TimelineStatus;
    use crate::types::LoanDeskError;

    #[tokio::test]
    async fn test_each_status_change_appends_one_event() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();
        let id = record.id_hex();

        let sequence = ["under review", "approved", "pending", "rejected"];
        for status in sequence {
            service.set_status(&id, status, "Admin", None).await.unwrap();
        }

        let record = service.find_by_id(&id).await.unwrap();
        assert_eq!(record.timeline.len(), 1 + sequence.len());
        for (event, status) in record.timeline[1..].iter().zip(sequence) {
            assert_eq!(event.event, format!("Application {status}"));
            assert_eq!(event.status, TimelineStatus::Completed);
            assert_eq!(event.by, "Admin");
        }
        assert_eq!(record.status.as_str(), "rejected");
        assert!(record.notes.is_empty());
    }

    #[tokio::test]
    async fn test_comment_becomes_a_note() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();

        let updated = service
            .set_status(&record.id_hex(), "under Review", "Admin (a@b.com)", Some("  Checking income "))
            .await
            .unwrap();

        assert_eq!(updated.status.as_str(), "under review");
        assert_eq!(updated.notes.len(), 1);
        assert_eq!(updated.notes[0].text, "Checking income");
        assert_eq!(updated.notes[0].author, "Admin (a@b.com)");
    }

    #[tokio::test]
    async fn test_unknown_status_is_rejected_before_lookup() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();

        let err = service
            .set_status(&record.id_hex(), "archived", "Admin", None)
            .await
            .unwrap_err();
        assert_eq!(err.fields()[0].field, "status");

        let unchanged = service.find_by_id(&record.id_hex()).await.unwrap();
        assert_eq!(unchanged.timeline.len(), 1);
        assert_eq!(unchanged.version, record.version);
    }

    #[tokio::test]
    async fn test_blank_note_is_rejected_and_notes_unchanged() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();
        let id = record.id_hex();

        service.add_note(&id, "Admin", "First look").await.unwrap();
        let err = service.add_note(&id, "Admin", " \n\t ").await.unwrap_err();
        assert!(matches!(err, LoanDeskError::Validation(_)));

        let notes = service.find_by_id(&id).await.unwrap().notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "First look");
    }

    #[tokio::test]
    async fn test_add_note_returns_all_notes() {
        let service = service();
        let record = service.create(submission(), None).await.unwrap();
        let id = record.id_hex();

        service.add_note(&id, "Admin", "one").await.unwrap();
        let notes = service.add_note(&id, "Reviewer", "two").await.unwrap();

        let texts: Vec<_> = notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(notes[1].author, "Reviewer");
    }

    #[tokio::test]
    async fn test_status_change_on_missing_application() {
        let service = service();
        let err = service
            .set_status(&bson::oid::ObjectId::new().to_hex(), "approved", "Admin", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoanDeskError::NotFound(_)));
    }
}
