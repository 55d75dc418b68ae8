//! The filter/sort compiler: boundary query → immutable execution plan.

use chrono::{DateTime, Duration, NaiveTime, Utc};

use leadops_core::{CoreError, CoreResult, SiteId};
use leadops_leads::Lead;

use crate::cursor::Cursor;
use crate::filter::{classify_search, ArchivedFilter, LeadListQuery, NextActionDue, PageLimit, Predicate};
use crate::sort::SortKey;

/// An immutable, fully-resolved query plan.
///
/// The site scope is fixed at construction and cannot be bypassed by any
/// filter combination. All time-relative filters are resolved against the
/// `now` handed to [`QueryPlan::compile`], so executing the same plan twice
/// means executing the same predicates twice.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    site_id: SiteId,
    predicates: Vec<Predicate>,
    sort: SortKey,
    seek: Option<Cursor>,
    limit: PageLimit,
}

impl QueryPlan {
    /// Compile a validated list query into a plan.
    ///
    /// Fails fast — before any store work — on an undecodable cursor, a
    /// cursor minted under a different sort key, or an inverted priority
    /// range.
    pub fn compile(site_id: SiteId, query: &LeadListQuery, now: DateTime<Utc>) -> CoreResult<Self> {
        let seek = match query.cursor.as_deref() {
            None => None,
            Some(raw) => {
                let cursor = Cursor::decode(raw)?;
                if cursor.sort_key() != query.sort {
                    return Err(CoreError::validation(format!(
                        "cursor was minted under sort '{}', request uses '{}'",
                        cursor.sort_key(),
                        query.sort
                    )));
                }
                Some(cursor)
            }
        };

        if let (Some(min), Some(max)) = (query.priority_min, query.priority_max) {
            if min > max {
                return Err(CoreError::validation(format!(
                    "priority_min {min} exceeds priority_max {max}"
                )));
            }
        }

        let mut predicates = Vec::new();

        match query.archived {
            ArchivedFilter::ActiveOnly => predicates.push(Predicate::ArchivedIsNull),
            ArchivedFilter::ArchivedOnly => predicates.push(Predicate::ArchivedIsNotNull),
            ArchivedFilter::Any => {}
        }

        if !query.status_in.is_empty() {
            predicates.push(Predicate::StatusIn(query.status_in.clone()));
        }
        if !query.sub_status_in.is_empty() {
            predicates.push(Predicate::SubStatusIn(query.sub_status_in.clone()));
        }
        if !query.kind_in.is_empty() {
            predicates.push(Predicate::KindIn(query.kind_in.clone()));
        }
        if !query.region_in.is_empty() {
            predicates.push(Predicate::RegionIn(query.region_in.clone()));
        }

        if let Some(min) = query.priority_min {
            predicates.push(Predicate::PriorityAtLeast(min));
        }
        if let Some(max) = query.priority_max {
            predicates.push(Predicate::PriorityAtMost(max));
        }

        if let Some(from) = query.created_from {
            predicates.push(Predicate::CreatedAtOrAfter(from));
        }
        if let Some(to) = query.created_to {
            predicates.push(Predicate::CreatedBefore(to));
        }

        match query.next_action_due {
            None => {}
            Some(NextActionDue::Any) => predicates.push(Predicate::NextActionSet),
            Some(NextActionDue::Overdue) => predicates.push(Predicate::NextActionBefore(now)),
            Some(NextActionDue::Today) => {
                let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
                predicates.push(Predicate::NextActionBetween {
                    from: midnight,
                    to: midnight + Duration::days(1),
                });
            }
            Some(NextActionDue::Next7Days) => predicates.push(Predicate::NextActionBetween {
                from: now,
                to: now + Duration::days(7),
            }),
        }

        if let Some(search) = query.search.as_deref() {
            if let Some(predicate) = classify_search(search) {
                predicates.push(predicate);
            }
        }

        Ok(Self {
            site_id,
            predicates,
            sort: query.sort,
            seek,
            limit: PageLimit::clamp(query.limit),
        })
    }

    /// The same plan with the pagination position removed.
    ///
    /// This is how counts are built: an independent plan sharing the filter
    /// predicate set, so the total reflects "how many match" regardless of
    /// where the caller is in the result set.
    pub fn without_seek(&self) -> Self {
        Self {
            seek: None,
            ..self.clone()
        }
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn sort(&self) -> SortKey {
        self.sort
    }

    pub fn seek(&self) -> Option<&Cursor> {
        self.seek.as_ref()
    }

    pub fn limit(&self) -> u32 {
        self.limit.get()
    }

    /// Filter-level match (site scope + predicates), ignoring seek and limit.
    pub fn matches(&self, lead: &Lead) -> bool {
        lead.site_id == self.site_id && self.predicates.iter().all(|p| p.matches(lead))
    }

    /// Full page admission: filters plus the seek position.
    pub fn admits(&self, lead: &Lead) -> bool {
        self.matches(lead)
            && match &self.seek {
                None => true,
                Some(cursor) => cursor.seek_admits(lead),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadops_leads::LeadStatus;

    fn site() -> SiteId {
        SiteId::new()
    }

    #[test]
    fn plan_always_carries_the_site_scope() {
        let plan = QueryPlan::compile(site(), &LeadListQuery::default(), Utc::now()).unwrap();
        let foreign = Lead::new(site(), "auto", "Other Tenant");
        assert!(!plan.matches(&foreign));
    }

    #[test]
    fn default_query_hides_archived_leads() {
        let s = site();
        let plan = QueryPlan::compile(s, &LeadListQuery::default(), Utc::now()).unwrap();
        assert_eq!(plan.predicates(), &[Predicate::ArchivedIsNull]);

        let mut archived = Lead::new(s, "auto", "Gone");
        archived.archived_at = Some(Utc::now());
        assert!(!plan.matches(&archived));
    }

    #[test]
    fn cursor_sort_mismatch_fails_before_execution() {
        let cursor = Cursor::CreatedDesc {
            created_at: Utc::now(),
            id: leadops_core::LeadId::new(),
        };
        let query = LeadListQuery {
            sort: SortKey::PriorityDesc,
            cursor: Some(cursor.encode()),
            ..LeadListQuery::default()
        };
        let err = QueryPlan::compile(site(), &query, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn undecodable_cursor_is_a_validation_error() {
        let query = LeadListQuery {
            cursor: Some("zzz-not-a-cursor".into()),
            ..LeadListQuery::default()
        };
        let err = QueryPlan::compile(site(), &query, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn matching_cursor_is_attached_as_seek() {
        let cursor = Cursor::CreatedDesc {
            created_at: Utc::now(),
            id: leadops_core::LeadId::new(),
        };
        let query = LeadListQuery {
            cursor: Some(cursor.encode()),
            ..LeadListQuery::default()
        };
        let plan = QueryPlan::compile(site(), &query, Utc::now()).unwrap();
        assert_eq!(plan.seek(), Some(&cursor));

        let unpositioned = plan.without_seek();
        assert!(unpositioned.seek().is_none());
        assert_eq!(unpositioned.predicates(), plan.predicates());
    }

    #[test]
    fn inverted_priority_range_is_rejected() {
        let query = LeadListQuery {
            priority_min: Some(90),
            priority_max: Some(10),
            ..LeadListQuery::default()
        };
        assert!(matches!(
            QueryPlan::compile(site(), &query, Utc::now()),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn due_windows_resolve_against_the_supplied_now() {
        let now = Utc::now();
        let s = site();
        let query = LeadListQuery {
            next_action_due: Some(NextActionDue::Next7Days),
            archived: ArchivedFilter::Any,
            ..LeadListQuery::default()
        };
        let plan = QueryPlan::compile(s, &query, now).unwrap();
        assert_eq!(
            plan.predicates(),
            &[Predicate::NextActionBetween {
                from: now,
                to: now + Duration::days(7)
            }]
        );

        // Compiling twice with the same now yields the same plan.
        let again = QueryPlan::compile(s, &query, now).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn filters_compose() {
        let query = LeadListQuery {
            status_in: vec![LeadStatus::New, LeadStatus::Contacted],
            kind_in: vec!["auto".into()],
            priority_min: Some(50),
            search: Some("dana@example.com".into()),
            limit: Some(500),
            ..LeadListQuery::default()
        };
        let plan = QueryPlan::compile(site(), &query, Utc::now()).unwrap();

        assert_eq!(plan.limit(), 200);
        assert!(plan
            .predicates()
            .contains(&Predicate::EmailEquals("dana@example.com".into())));
        assert!(plan
            .predicates()
            .contains(&Predicate::StatusIn(vec![LeadStatus::New, LeadStatus::Contacted])));
    }
}
