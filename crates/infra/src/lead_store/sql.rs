//! Plan → SQL rendering for the Postgres backend.
//!
//! Pure string/parameter construction, kept separate from execution so it can
//! be tested without a database. Placeholders are numbered in emission order;
//! `params` lines up with them one-to-one. Count SQL is rendered from the
//! filter predicates only — the seek clause never appears in it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use leadops_query::{Cursor, Predicate, QueryPlan, SortKey};

/// A typed bind value, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    TextArray(Vec<String>),
    Int(i32),
    Timestamp(DateTime<Utc>),
    Numeric(Decimal),
}

/// Rendered SQL plus its bind list.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

const LEAD_COLUMNS: &str = "id, site_id, kind, status, sub_status, reason_code, \
     full_name, phone, email, region, \
     name_normalized, phone_digits, email_normalized, \
     priority_score, priority_reason, \
     estimated_monthly_premium, estimated_commission, \
     source_page, \
     last_activity_at, last_activity_type, next_action_at, next_action_type, \
     archived_at, version, created_at, updated_at";

struct Builder {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl Builder {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn next_placeholder(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn push_predicate(&mut self, predicate: &Predicate) {
        let clause = match predicate {
            Predicate::ArchivedIsNull => "archived_at is null".to_string(),
            Predicate::ArchivedIsNotNull => "archived_at is not null".to_string(),
            Predicate::StatusIn(statuses) => {
                let p = self.next_placeholder(SqlParam::TextArray(
                    statuses.iter().map(|s| s.as_str().to_string()).collect(),
                ));
                format!("status = any({p})")
            }
            Predicate::SubStatusIn(subs) => {
                let p = self.next_placeholder(SqlParam::TextArray(subs.clone()));
                format!("sub_status = any({p})")
            }
            Predicate::KindIn(kinds) => {
                let p = self.next_placeholder(SqlParam::TextArray(kinds.clone()));
                format!("kind = any({p})")
            }
            Predicate::RegionIn(regions) => {
                let p = self.next_placeholder(SqlParam::TextArray(regions.clone()));
                format!("region = any({p})")
            }
            Predicate::PriorityAtLeast(min) => {
                let p = self.next_placeholder(SqlParam::Int(*min));
                format!("priority_score >= {p}")
            }
            Predicate::PriorityAtMost(max) => {
                let p = self.next_placeholder(SqlParam::Int(*max));
                format!("priority_score <= {p}")
            }
            Predicate::CreatedAtOrAfter(from) => {
                let p = self.next_placeholder(SqlParam::Timestamp(*from));
                format!("created_at >= {p}")
            }
            Predicate::CreatedBefore(to) => {
                let p = self.next_placeholder(SqlParam::Timestamp(*to));
                format!("created_at < {p}")
            }
            Predicate::NextActionSet => "next_action_at is not null".to_string(),
            Predicate::NextActionBefore(bound) => {
                let p = self.next_placeholder(SqlParam::Timestamp(*bound));
                format!("next_action_at < {p}")
            }
            Predicate::NextActionBetween { from, to } => {
                let pf = self.next_placeholder(SqlParam::Timestamp(*from));
                let pt = self.next_placeholder(SqlParam::Timestamp(*to));
                format!("next_action_at >= {pf} and next_action_at < {pt}")
            }
            Predicate::EmailEquals(email) => {
                let p = self.next_placeholder(SqlParam::Text(email.clone()));
                format!("email_normalized = {p}")
            }
            Predicate::PhoneContains(digits) => {
                let p = self.next_placeholder(SqlParam::Text(format!("%{digits}%")));
                format!("phone_digits like {p}")
            }
            Predicate::NameContains(needle) => {
                let p = self.next_placeholder(SqlParam::Text(format!("%{needle}%")));
                format!("name_normalized like {p}")
            }
        };
        self.clauses.push(clause);
    }

    fn push_seek(&mut self, cursor: &Cursor) {
        let clause = match cursor {
            Cursor::CreatedDesc { created_at, id } => {
                let pc = self.next_placeholder(SqlParam::Timestamp(*created_at));
                let pi = self.next_placeholder(SqlParam::Uuid(*id.as_uuid()));
                format!("(created_at, id) < ({pc}, {pi})")
            }
            Cursor::PriorityDesc {
                priority_score,
                created_at,
                id,
            } => {
                let pp = self.next_placeholder(SqlParam::Int(*priority_score));
                let pc = self.next_placeholder(SqlParam::Timestamp(*created_at));
                let pi = self.next_placeholder(SqlParam::Uuid(*id.as_uuid()));
                format!("(priority_score, created_at, id) < ({pp}, {pc}, {pi})")
            }
            Cursor::LastActivityDesc {
                last_activity_at,
                created_at,
                id,
            } => {
                let pl = self.next_placeholder(SqlParam::Timestamp(*last_activity_at));
                let pc = self.next_placeholder(SqlParam::Timestamp(*created_at));
                let pi = self.next_placeholder(SqlParam::Uuid(*id.as_uuid()));
                format!("(last_activity_at, created_at, id) < ({pl}, {pc}, {pi})")
            }
            Cursor::NextActionAsc { next_action_at, id } => {
                let pn = self.next_placeholder(SqlParam::Timestamp(*next_action_at));
                let pi = self.next_placeholder(SqlParam::Uuid(*id.as_uuid()));
                format!("(next_action_at, id) > ({pn}, {pi})")
            }
            Cursor::EstPremiumDesc {
                estimated_monthly_premium,
                created_at,
                id,
            } => {
                let pe =
                    self.next_placeholder(SqlParam::Numeric(*estimated_monthly_premium));
                let pc = self.next_placeholder(SqlParam::Timestamp(*created_at));
                let pi = self.next_placeholder(SqlParam::Uuid(*id.as_uuid()));
                format!("(estimated_monthly_premium, created_at, id) < ({pe}, {pc}, {pi})")
            }
        };
        self.clauses.push(clause);
    }
}

fn order_by(sort: SortKey) -> &'static str {
    match sort {
        SortKey::CreatedDesc => "order by created_at desc, id desc",
        SortKey::PriorityDesc => "order by priority_score desc, created_at desc, id desc",
        SortKey::LastActivityDesc => {
            "order by last_activity_at desc nulls last, created_at desc, id desc"
        }
        SortKey::NextActionAsc => "order by next_action_at asc nulls last, id asc",
        SortKey::EstPremiumDesc => {
            "order by estimated_monthly_premium desc nulls last, created_at desc, id desc"
        }
    }
}

/// Render the page query: filters, seek, order, limit.
pub fn render_list(plan: &QueryPlan) -> SqlQuery {
    let mut b = Builder::new();

    let site = b.next_placeholder(SqlParam::Uuid(*plan.site_id().as_uuid()));
    b.clauses.push(format!("site_id = {site}"));

    for predicate in plan.predicates() {
        b.push_predicate(predicate);
    }
    if let Some(cursor) = plan.seek() {
        b.push_seek(cursor);
    }

    let where_sql = b.clauses.join(" and ");
    let order_sql = order_by(plan.sort());
    let limit = b.next_placeholder(SqlParam::Int(plan.limit() as i32));

    SqlQuery {
        sql: format!(
            "select {LEAD_COLUMNS} from leads where {where_sql} {order_sql} limit {limit}"
        ),
        params: b.params,
    }
}

/// Render the count query from the filter predicates only.
pub fn render_count(plan: &QueryPlan) -> SqlQuery {
    let mut b = Builder::new();

    let site = b.next_placeholder(SqlParam::Uuid(*plan.site_id().as_uuid()));
    b.clauses.push(format!("site_id = {site}"));

    for predicate in plan.predicates() {
        b.push_predicate(predicate);
    }

    let where_sql = b.clauses.join(" and ");

    SqlQuery {
        sql: format!("select count(*) from leads where {where_sql}"),
        params: b.params,
    }
}
