//! Write-side service: status changes and notes, under optimistic
//! concurrency.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use leadops_auth::{authorize, Permission, Principal};
use leadops_core::{CoreError, CoreResult, LeadId};
use leadops_leads::{ChangeStatus, Lead, LeadEvent, LeadNote, LeadStatusHistory};

use crate::lead_store::{LeadStore, NoteInsert, StatusUpdate};

/// Write-side operations over leads.
pub struct LeadMutationService<S: LeadStore> {
    store: Arc<S>,
}

impl<S: LeadStore> LeadMutationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Change a lead's status under a version precondition.
    ///
    /// The flow is read → validate → conditional write. The early version
    /// check gives a friendly `Conflict` without burning a transaction, but
    /// the *authoritative* check is the conditional write itself: if a
    /// concurrent writer lands between our read and our write, zero rows
    /// match and the store reports `Conflict`. Conflicts are never retried
    /// here — the caller's intent may be stale, so the caller decides.
    #[instrument(
        skip(self, principal, change),
        fields(
            site_id = %principal.site_id,
            lead_id = %lead_id,
            expected_version = change.expected_version
        ),
        err
    )]
    pub async fn update_status(
        &self,
        principal: &Principal,
        lead_id: LeadId,
        change: ChangeStatus,
    ) -> CoreResult<Lead> {
        authorize(principal, &Permission::leads_write())?;
        change.validate()?;

        let site_id = principal.site_id;
        let current = self
            .store
            .get(site_id, lead_id)
            .await?
            .ok_or(CoreError::NotFound)?;

        if current.version != change.expected_version {
            return Err(CoreError::conflict(format!(
                "lead {} is at version {}, caller expected {}",
                lead_id, current.version, change.expected_version
            )));
        }

        let now = Utc::now();
        let actor = Some(principal.actor_id());
        let to_sub_status = change
            .sub_status
            .clone()
            .or_else(|| current.sub_status.clone());

        let history = LeadStatusHistory::new(
            site_id,
            lead_id,
            current.status,
            change.status,
            actor,
            change.reason_code.clone(),
            now,
        );
        let event = LeadEvent::status_changed(
            site_id,
            lead_id,
            actor,
            current.status,
            change.status,
            current.sub_status.as_deref(),
            to_sub_status.as_deref(),
            change.reason_code.as_deref(),
            now,
        );

        self.store
            .apply_status_change(StatusUpdate {
                site_id,
                lead_id,
                change,
                history,
                event,
                occurred_at: now,
            })
            .await
    }

    /// Append a note and roll activity up onto the lead.
    ///
    /// No version precondition — append-only rows don't conflict with
    /// themselves — but the rollup still advances `version`.
    #[instrument(
        skip(self, principal, body),
        fields(site_id = %principal.site_id, lead_id = %lead_id, pinned),
        err
    )]
    pub async fn add_note(
        &self,
        principal: &Principal,
        lead_id: LeadId,
        body: &str,
        pinned: bool,
    ) -> CoreResult<LeadNote> {
        authorize(principal, &Permission::leads_write())?;

        let body = body.trim();
        if body.is_empty() {
            return Err(CoreError::validation("note body is required"));
        }

        let now = Utc::now();
        let actor = principal.actor_id();
        let note = LeadNote::new(principal.site_id, lead_id, actor, body, pinned, now);
        let event = LeadEvent::note_added(principal.site_id, lead_id, actor, pinned, now);

        self.store.add_note(NoteInsert { note, event }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadops_auth::PrincipalId;
    use leadops_core::SiteId;
    use leadops_leads::{ActivityType, LeadEventType, LeadStatus};

    use crate::lead_store::InMemoryLeadStore;

    fn principal(site_id: SiteId) -> Principal {
        Principal::new(PrincipalId::new(), site_id, vec![Permission::new("*")])
    }

    async fn seeded(store: &InMemoryLeadStore) -> (SiteId, Lead) {
        let site = SiteId::new();
        let lead = Lead::new(site, "auto", "Dana Roe");
        store.insert(&lead).await.unwrap();
        (site, lead)
    }

    #[tokio::test]
    async fn successful_update_increments_version_by_exactly_one() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store);

        let updated = service
            .update_status(
                &principal(site),
                lead.id,
                ChangeStatus::new(LeadStatus::Contacted, 1),
            )
            .await
            .unwrap();

        assert_eq!(updated.version, lead.version + 1);
        assert_eq!(updated.status, LeadStatus::Contacted);
        assert_eq!(updated.last_activity_type, Some(ActivityType::StatusChange));
    }

    #[tokio::test]
    async fn archive_without_reason_then_with_reason_then_stale_version() {
        // Archive flow: missing reason rejected, reason accepted, stale
        // version conflicted.
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store);
        let p = principal(site);

        let err = service
            .update_status(&p, lead.id, ChangeStatus::new(LeadStatus::Archived, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let updated = service
            .update_status(
                &p,
                lead.id,
                ChangeStatus::new(LeadStatus::Archived, 1).with_reason_code("duplicate"),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.is_archived());
        assert_eq!(updated.reason_code.as_deref(), Some("duplicate"));

        // Reusing the already-consumed version is a conflict, not a rerun.
        let err = service
            .update_status(
                &p,
                lead.id,
                ChangeStatus::new(LeadStatus::Archived, 1).with_reason_code("duplicate"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_updates_with_same_expected_version_one_wins() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = Arc::new(LeadMutationService::new(store));
        let p = principal(site);

        let a = {
            let service = service.clone();
            let p = p.clone();
            tokio::spawn(async move {
                service
                    .update_status(&p, lead.id, ChangeStatus::new(LeadStatus::Contacted, 1))
                    .await
            })
        };
        let b = {
            let service = service.clone();
            let p = p.clone();
            tokio::spawn(async move {
                service
                    .update_status(&p, lead.id, ChangeStatus::new(LeadStatus::Qualified, 1))
                    .await
            })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::Conflict(_))))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
    }

    #[tokio::test]
    async fn update_writes_history_and_event_atomically() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store.clone());
        let p = principal(site);

        service
            .update_status(
                &p,
                lead.id,
                ChangeStatus::new(LeadStatus::Lost, 1).with_reason_code("unreachable"),
            )
            .await
            .unwrap();

        let history = store.list_status_history(site, lead.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, LeadStatus::New);
        assert_eq!(history[0].to_status, LeadStatus::Lost);
        assert_eq!(history[0].reason_code.as_deref(), Some("unreachable"));
        assert_eq!(history[0].actor, Some(p.actor_id()));

        let events = store.list_events(site, lead.id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, LeadEventType::StatusChanged);
        assert_eq!(events[0].metadata["reason_code"], "unreachable");
    }

    #[tokio::test]
    async fn rejected_update_leaves_no_audit_rows() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store.clone());

        let _ = service
            .update_status(
                &principal(site),
                lead.id,
                ChangeStatus::new(LeadStatus::Contacted, 99),
            )
            .await
            .unwrap_err();

        assert!(store
            .list_status_history(site, lead.id, 10)
            .await
            .unwrap()
            .is_empty());
        assert!(store.list_events(site, lead.id, 10).await.unwrap().is_empty());

        let unchanged = store.get(site, lead.id).await.unwrap().unwrap();
        assert_eq!(unchanged.version, 1);
        assert_eq!(unchanged.status, LeadStatus::New);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let store = InMemoryLeadStore::arc();
        let (site, _) = seeded(&store).await;
        let service = LeadMutationService::new(store);

        let err = service
            .update_status(
                &principal(site),
                LeadId::new(),
                ChangeStatus::new(LeadStatus::Contacted, 1),
            )
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound);
    }

    #[tokio::test]
    async fn note_rolls_activity_and_advances_version_without_precondition() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store.clone());
        let p = principal(site);

        let note = service
            .add_note(&p, lead.id, "  spoke with them, call back Friday  ", true)
            .await
            .unwrap();
        assert_eq!(note.body, "spoke with them, call back Friday");
        assert!(note.pinned);

        let lead_after = store.get(site, lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.version, 2);
        assert_eq!(lead_after.last_activity_type, Some(ActivityType::Note));

        let events = store.list_events(site, lead.id, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, LeadEventType::NoteAdded);

        // A second note needs no version knowledge at all.
        service.add_note(&p, lead.id, "second", false).await.unwrap();
        let lead_after = store.get(site, lead.id).await.unwrap().unwrap();
        assert_eq!(lead_after.version, 3);
    }

    #[tokio::test]
    async fn blank_note_is_rejected() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store);

        let err = service
            .add_note(&principal(site), lead.id, "   ", false)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn pinned_notes_list_first() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store.clone());
        let p = principal(site);

        service.add_note(&p, lead.id, "first", false).await.unwrap();
        service.add_note(&p, lead.id, "second", false).await.unwrap();
        let pinned = service.add_note(&p, lead.id, "pinned", true).await.unwrap();

        let notes = store.list_notes(site, lead.id, 10).await.unwrap();
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].id, pinned.id);
    }

    #[tokio::test]
    async fn missing_write_permission_is_forbidden() {
        let store = InMemoryLeadStore::arc();
        let (site, lead) = seeded(&store).await;
        let service = LeadMutationService::new(store);
        let read_only = Principal::new(
            PrincipalId::new(),
            site,
            vec![Permission::leads_read()],
        );

        let err = service
            .update_status(&read_only, lead.id, ChangeStatus::new(LeadStatus::Won, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }
}
