//! Read-side service: lists, point lookups, bulk collection for exports.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use leadops_auth::{authorize, Permission, Principal};
use leadops_core::{CoreError, CoreResult, LeadId, SiteId};
use leadops_leads::{Lead, LeadEvent, LeadNote};
use leadops_query::{Cursor, LeadListQuery, QueryPlan};

use crate::lead_store::LeadStore;

/// Detail payload limits, matching what the drawer UI consumes.
const DETAIL_NOTES_LIMIT: u32 = 50;
const DETAIL_EVENTS_LIMIT: u32 = 100;

/// Page size used internally when walking a result set in bulk mode.
const BULK_PAGE_SIZE: u32 = 200;

/// One page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadPage {
    pub items: Vec<Lead>,
    /// Opaque cursor resuming after the last item; `None` when the page is
    /// empty or pagination terminated on a null sort value.
    pub next_cursor: Option<String>,
    /// Total rows matching the filters, independent of pagination position.
    pub filtered_count: u64,
}

/// Point-lookup payload: the lead plus its recent notes and events.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadDetail {
    pub lead: Lead,
    pub notes: Vec<LeadNote>,
    pub events: Vec<LeadEvent>,
}

/// Read-side operations over leads.
pub struct LeadQueryService<S: LeadStore> {
    store: Arc<S>,
}

impl<S: LeadStore> LeadQueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Execute a list query for the principal's site.
    ///
    /// `now` anchors time-relative filters; pass `Utc::now()` outside tests.
    /// The count is computed from an independent seek-free plan so it answers
    /// "how many match" no matter where the caller is in the result set.
    #[instrument(skip(self, principal, query), fields(site_id = %principal.site_id, sort = %query.sort), err)]
    pub async fn list(
        &self,
        principal: &Principal,
        query: &LeadListQuery,
        now: DateTime<Utc>,
    ) -> CoreResult<LeadPage> {
        authorize(principal, &Permission::leads_read())?;

        let plan = QueryPlan::compile(principal.site_id, query, now)?;
        let items = self.store.list(&plan).await?;
        let filtered_count = self.store.count(&plan.without_seek()).await?;

        let next_cursor = items
            .last()
            .and_then(|last| Cursor::after(plan.sort(), last))
            .map(|cursor| cursor.encode());

        Ok(LeadPage {
            items,
            next_cursor,
            filtered_count,
        })
    }

    /// Point lookup scoped to the principal's site.
    #[instrument(skip(self, principal), fields(site_id = %principal.site_id, lead_id = %lead_id), err)]
    pub async fn get(&self, principal: &Principal, lead_id: LeadId) -> CoreResult<LeadDetail> {
        authorize(principal, &Permission::leads_read())?;

        let site_id = principal.site_id;
        let lead = self
            .store
            .get(site_id, lead_id)
            .await?
            .ok_or(CoreError::NotFound)?;

        let notes = self
            .store
            .list_notes(site_id, lead_id, DETAIL_NOTES_LIMIT)
            .await?;
        let events = self
            .store
            .list_events(site_id, lead_id, DETAIL_EVENTS_LIMIT)
            .await?;

        Ok(LeadDetail { lead, notes, events })
    }

    /// Bulk mode: walk the whole result set through successive cursors, up to
    /// `cap` rows. Used by the export handler, which already carries an
    /// authorized site scope on its job row.
    #[instrument(skip(self, query), fields(site_id = %site_id), err)]
    pub async fn collect_for_export(
        &self,
        site_id: SiteId,
        query: &LeadListQuery,
        now: DateTime<Utc>,
        cap: usize,
    ) -> CoreResult<Vec<Lead>> {
        let mut query = query.clone().without_cursor();
        query.limit = Some(BULK_PAGE_SIZE);

        let mut rows: Vec<Lead> = Vec::new();
        loop {
            let plan = QueryPlan::compile(site_id, &query, now)?;
            let page = self.store.list(&plan).await?;
            if page.is_empty() {
                break;
            }

            let next = page
                .last()
                .and_then(|last| Cursor::after(plan.sort(), last))
                .map(|c| c.encode());

            rows.extend(page);
            if rows.len() >= cap {
                rows.truncate(cap);
                break;
            }

            match next {
                Some(cursor) => query.cursor = Some(cursor),
                None => break,
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::Duration;
    use leadops_auth::PrincipalId;
    use leadops_query::{ArchivedFilter, SortKey};

    use crate::lead_store::InMemoryLeadStore;

    fn principal(site_id: SiteId) -> Principal {
        Principal::new(PrincipalId::new(), site_id, vec![Permission::new("*")])
    }

    fn reader_only(site_id: SiteId) -> Principal {
        Principal::new(PrincipalId::new(), site_id, vec![])
    }

    async fn seed(store: &InMemoryLeadStore, site: SiteId, n: usize) -> Vec<Lead> {
        let base = Utc::now();
        let mut leads = Vec::new();
        for i in 0..n {
            let mut lead = Lead::new(site, "auto", format!("Lead {i}"))
                .with_priority((i % 5) as i32 * 10);
            // Duplicate timestamps on purpose: the id tie-break carries the
            // total order.
            lead.created_at = base - Duration::minutes((i / 3) as i64);
            store.insert(&lead).await.unwrap();
            leads.push(lead);
        }
        leads
    }

    #[tokio::test]
    async fn list_pages_and_counts() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        seed(&store, site, 12).await;

        let service = LeadQueryService::new(store);
        let query = LeadListQuery {
            limit: Some(5),
            ..LeadListQuery::default()
        };
        let page = service
            .list(&principal(site), &query, Utc::now())
            .await
            .unwrap();

        assert_eq!(page.items.len(), 5);
        assert_eq!(page.filtered_count, 12);
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn pagination_loses_and_duplicates_nothing() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        seed(&store, site, 23).await;
        let service = LeadQueryService::new(store);
        let p = principal(site);

        for sort in [SortKey::CreatedDesc, SortKey::PriorityDesc] {
            // Unpaginated baseline.
            let all = service
                .list(
                    &p,
                    &LeadListQuery {
                        sort,
                        limit: Some(200),
                        ..LeadListQuery::default()
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
            let baseline: Vec<LeadId> = all.items.iter().map(|l| l.id).collect();
            assert_eq!(baseline.len(), 23);

            // Cursor walk with a small page size.
            let mut seen: Vec<LeadId> = Vec::new();
            let mut query = LeadListQuery {
                sort,
                limit: Some(4),
                ..LeadListQuery::default()
            };
            loop {
                let page = service.list(&p, &query, Utc::now()).await.unwrap();
                if page.items.is_empty() {
                    break;
                }
                seen.extend(page.items.iter().map(|l| l.id));
                match page.next_cursor {
                    Some(cursor) => query.cursor = Some(cursor),
                    None => break,
                }
            }

            assert_eq!(seen, baseline, "sort {sort} lost or reordered rows");
            let unique: HashSet<_> = seen.iter().collect();
            assert_eq!(unique.len(), seen.len(), "sort {sort} duplicated rows");
        }
    }

    #[tokio::test]
    async fn count_is_independent_of_cursor_position() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        seed(&store, site, 10).await;
        let service = LeadQueryService::new(store);
        let p = principal(site);

        let mut query = LeadListQuery {
            limit: Some(3),
            ..LeadListQuery::default()
        };
        let first = service.list(&p, &query, Utc::now()).await.unwrap();
        query.cursor = first.next_cursor.clone();
        let second = service.list(&p, &query, Utc::now()).await.unwrap();

        assert_eq!(first.filtered_count, 10);
        assert_eq!(second.filtered_count, 10);
        assert_ne!(
            first.items.first().map(|l| l.id),
            second.items.first().map(|l| l.id)
        );
    }

    #[tokio::test]
    async fn nullable_sort_terminates_when_the_page_ends_on_null() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        let now = Utc::now();

        let mut with_activity = Lead::new(site, "auto", "Active");
        with_activity.last_activity_at = Some(now);
        store.insert(&with_activity).await.unwrap();
        store.insert(&Lead::new(site, "auto", "Silent")).await.unwrap();

        let service = LeadQueryService::new(store);
        let page = service
            .list(
                &principal(site),
                &LeadListQuery::sorted_by(SortKey::LastActivityDesc),
                now,
            )
            .await
            .unwrap();

        // Null last-activity rows sort last; the page ends on one, so no
        // cursor is minted and pagination stops here by design.
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, with_activity.id);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn cross_site_leads_are_invisible() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        let other_site = SiteId::new();
        seed(&store, site, 3).await;
        let foreign = Lead::new(other_site, "auto", "Other");
        store.insert(&foreign).await.unwrap();

        let service = LeadQueryService::new(store);
        let page = service
            .list(&principal(site), &LeadListQuery::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(page.filtered_count, 3);

        let err = service
            .get(&principal(site), foreign.id)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::NotFound);
    }

    #[tokio::test]
    async fn archived_tri_state_filters() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        let now = Utc::now();
        let mut archived = Lead::new(site, "auto", "Archived");
        archived.archived_at = Some(now);
        store.insert(&archived).await.unwrap();
        store.insert(&Lead::new(site, "auto", "Active")).await.unwrap();

        let service = LeadQueryService::new(store);
        let p = principal(site);

        for (filter, expected) in [
            (ArchivedFilter::ActiveOnly, 1),
            (ArchivedFilter::ArchivedOnly, 1),
            (ArchivedFilter::Any, 2),
        ] {
            let page = service
                .list(
                    &p,
                    &LeadListQuery {
                        archived: filter,
                        ..LeadListQuery::default()
                    },
                    now,
                )
                .await
                .unwrap();
            assert_eq!(page.filtered_count, expected, "filter {filter:?}");
        }
    }

    #[tokio::test]
    async fn missing_read_permission_is_forbidden() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        let service = LeadQueryService::new(store);

        let err = service
            .list(&reader_only(site), &LeadListQuery::default(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn search_finds_by_email_phone_and_name() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        let target = Lead::new(site, "auto", "Dana Roe")
            .with_email("dana@example.com")
            .with_phone("(555) 010-7788");
        store.insert(&target).await.unwrap();
        store.insert(&Lead::new(site, "auto", "Someone Else")).await.unwrap();

        let service = LeadQueryService::new(store);
        let p = principal(site);

        for term in ["dana@example.com", "5550107788", "dana"] {
            let page = service
                .list(
                    &p,
                    &LeadListQuery {
                        search: Some(term.into()),
                        ..LeadListQuery::default()
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
            assert_eq!(page.items.len(), 1, "term {term}");
            assert_eq!(page.items[0].id, target.id);
        }
    }

    #[tokio::test]
    async fn bulk_collection_caps_and_walks_all_pages() {
        let store = InMemoryLeadStore::arc();
        let site = SiteId::new();
        seed(&store, site, 15).await;
        let service = LeadQueryService::new(store);

        let all = service
            .collect_for_export(site, &LeadListQuery::default(), Utc::now(), 5000)
            .await
            .unwrap();
        assert_eq!(all.len(), 15);

        let capped = service
            .collect_for_export(site, &LeadListQuery::default(), Utc::now(), 7)
            .await
            .unwrap();
        assert_eq!(capped.len(), 7);
    }
}
