//! Opaque cursor codec for keyset pagination.
//!
//! A cursor pins a position in one sort key's total order: the primary sort
//! value(s) of the last row a client saw, ending in the row id. It is
//! serialized as URL-safe unpadded base64 over JSON and must be treated as a
//! black box by clients. A cursor minted under one sort key is meaningless —
//! and rejected — under another.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use leadops_core::{CoreError, LeadId};
use leadops_leads::Lead;

use crate::sort::SortKey;

/// Decode failure. Deliberately carries no detail: a bad cursor is a client
/// error, not a window into the wire format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid cursor")]
pub struct CursorError;

impl From<CursorError> for CoreError {
    fn from(_: CursorError) -> Self {
        CoreError::validation("invalid cursor")
    }
}

/// A position in one sort key's total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sort")]
pub enum Cursor {
    #[serde(rename = "created_at_desc")]
    CreatedDesc {
        created_at: DateTime<Utc>,
        id: LeadId,
    },
    #[serde(rename = "priority_desc")]
    PriorityDesc {
        priority_score: i32,
        created_at: DateTime<Utc>,
        id: LeadId,
    },
    #[serde(rename = "last_activity_desc")]
    LastActivityDesc {
        last_activity_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        id: LeadId,
    },
    #[serde(rename = "next_action_asc")]
    NextActionAsc {
        next_action_at: DateTime<Utc>,
        id: LeadId,
    },
    #[serde(rename = "est_premium_desc")]
    EstPremiumDesc {
        estimated_monthly_premium: Decimal,
        created_at: DateTime<Utc>,
        id: LeadId,
    },
}

impl Cursor {
    /// The sort key this cursor was minted under.
    pub fn sort_key(&self) -> SortKey {
        match self {
            Cursor::CreatedDesc { .. } => SortKey::CreatedDesc,
            Cursor::PriorityDesc { .. } => SortKey::PriorityDesc,
            Cursor::LastActivityDesc { .. } => SortKey::LastActivityDesc,
            Cursor::NextActionAsc { .. } => SortKey::NextActionAsc,
            Cursor::EstPremiumDesc { .. } => SortKey::EstPremiumDesc,
        }
    }

    /// Mint the cursor that resumes after `lead` under `sort`.
    ///
    /// Returns `None` when the sort key's nullable primary is null on this
    /// row: the seek tuple would be unexpressible, so pagination terminates
    /// here by design rather than risking an invalid seek.
    pub fn after(sort: SortKey, lead: &Lead) -> Option<Cursor> {
        match sort {
            SortKey::CreatedDesc => Some(Cursor::CreatedDesc {
                created_at: lead.created_at,
                id: lead.id,
            }),
            SortKey::PriorityDesc => Some(Cursor::PriorityDesc {
                priority_score: lead.priority_score,
                created_at: lead.created_at,
                id: lead.id,
            }),
            SortKey::LastActivityDesc => lead.last_activity_at.map(|last_activity_at| {
                Cursor::LastActivityDesc {
                    last_activity_at,
                    created_at: lead.created_at,
                    id: lead.id,
                }
            }),
            SortKey::NextActionAsc => lead.next_action_at.map(|next_action_at| {
                Cursor::NextActionAsc {
                    next_action_at,
                    id: lead.id,
                }
            }),
            SortKey::EstPremiumDesc => {
                lead.estimated_monthly_premium
                    .map(|estimated_monthly_premium| Cursor::EstPremiumDesc {
                        estimated_monthly_premium,
                        created_at: lead.created_at,
                        id: lead.id,
                    })
            }
        }
    }

    /// Whether `lead` sits strictly after this cursor in its sort order.
    ///
    /// Mirrors a SQL row comparison against the cursor tuple (`<` for
    /// descending keys, `>` for ascending): the cursor row itself and
    /// everything already returned is excluded, and rows whose nullable
    /// primary is null are never admitted — exactly like a SQL comparison
    /// with NULL.
    pub fn seek_admits(&self, lead: &Lead) -> bool {
        use core::cmp::Ordering::*;

        match self {
            Cursor::CreatedDesc { created_at, id } => {
                let cmp = lead
                    .created_at
                    .cmp(created_at)
                    .then_with(|| lead.id.cmp(id));
                cmp == Less
            }
            Cursor::PriorityDesc {
                priority_score,
                created_at,
                id,
            } => {
                let cmp = lead
                    .priority_score
                    .cmp(priority_score)
                    .then_with(|| lead.created_at.cmp(created_at))
                    .then_with(|| lead.id.cmp(id));
                cmp == Less
            }
            Cursor::LastActivityDesc {
                last_activity_at,
                created_at,
                id,
            } => match lead.last_activity_at {
                None => false,
                Some(at) => {
                    let cmp = at
                        .cmp(last_activity_at)
                        .then_with(|| lead.created_at.cmp(created_at))
                        .then_with(|| lead.id.cmp(id));
                    cmp == Less
                }
            },
            Cursor::NextActionAsc { next_action_at, id } => match lead.next_action_at {
                None => false,
                Some(at) => {
                    let cmp = at.cmp(next_action_at).then_with(|| lead.id.cmp(id));
                    cmp == Greater
                }
            },
            Cursor::EstPremiumDesc {
                estimated_monthly_premium,
                created_at,
                id,
            } => match lead.estimated_monthly_premium {
                None => false,
                Some(premium) => {
                    let cmp = premium
                        .cmp(estimated_monthly_premium)
                        .then_with(|| lead.created_at.cmp(created_at))
                        .then_with(|| lead.id.cmp(id));
                    cmp == Less
                }
            },
        }
    }

    /// Serialize to the opaque wire form.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("cursor serialization is infallible");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Parse the opaque wire form. Any malformed or tampered input is an
    /// invalid cursor — never a panic, never an empty result.
    pub fn decode(raw: &str) -> Result<Cursor, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| CursorError)?;
        serde_json::from_slice(&bytes).map_err(|_| CursorError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use leadops_core::SiteId;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn id(n: u128) -> LeadId {
        LeadId::from_uuid(Uuid::from_u128(n))
    }

    #[test]
    fn all_variants_round_trip() {
        let cursors = vec![
            Cursor::CreatedDesc {
                created_at: Utc::now(),
                id: LeadId::new(),
            },
            Cursor::PriorityDesc {
                priority_score: 85,
                created_at: Utc::now(),
                id: LeadId::new(),
            },
            Cursor::LastActivityDesc {
                last_activity_at: Utc::now(),
                created_at: Utc::now(),
                id: LeadId::new(),
            },
            Cursor::NextActionAsc {
                next_action_at: Utc::now(),
                id: LeadId::new(),
            },
            Cursor::EstPremiumDesc {
                estimated_monthly_premium: Decimal::new(12_999, 2),
                created_at: Utc::now(),
                id: LeadId::new(),
            },
        ];

        for cursor in cursors {
            let decoded = Cursor::decode(&cursor.encode()).unwrap();
            assert_eq!(decoded, cursor);
            assert_eq!(decoded.sort_key(), cursor.sort_key());
        }
    }

    #[test]
    fn garbage_is_rejected_not_panicked() {
        assert_eq!(Cursor::decode("!!!not-base64!!!"), Err(CursorError));
        // Valid base64, wrong payload.
        let raw = URL_SAFE_NO_PAD.encode(br#"{"sort":"sideways","id":1}"#);
        assert_eq!(Cursor::decode(&raw), Err(CursorError));
        // Truncation tampering.
        let good = Cursor::CreatedDesc {
            created_at: Utc::now(),
            id: LeadId::new(),
        }
        .encode();
        assert_eq!(Cursor::decode(&good[..good.len() / 2]), Err(CursorError));
    }

    #[test]
    fn decode_failure_maps_to_validation() {
        let err: CoreError = CursorError.into();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn mint_skips_null_primaries() {
        let lead = Lead::new(SiteId::new(), "auto", "Dana");
        assert!(Cursor::after(SortKey::CreatedDesc, &lead).is_some());
        assert!(Cursor::after(SortKey::LastActivityDesc, &lead).is_none());
        assert!(Cursor::after(SortKey::NextActionAsc, &lead).is_none());
        assert!(Cursor::after(SortKey::EstPremiumDesc, &lead).is_none());
    }

    #[test]
    fn seek_excludes_the_cursor_row_itself() {
        let mut lead = Lead::new(SiteId::new(), "auto", "Dana");
        lead.created_at = ts(1_700_000_000_000);
        let cursor = Cursor::after(SortKey::CreatedDesc, &lead).unwrap();
        assert!(!cursor.seek_admits(&lead));

        let mut older = lead.clone();
        older.id = id(1);
        older.created_at = ts(1_600_000_000_000);
        assert!(cursor.seek_admits(&older));

        let mut newer = lead.clone();
        newer.id = id(2);
        newer.created_at = ts(1_800_000_000_000);
        assert!(!cursor.seek_admits(&newer));
    }

    #[test]
    fn seek_never_admits_null_primary_rows() {
        let cursor = Cursor::NextActionAsc {
            next_action_at: ts(1_700_000_000_000),
            id: id(7),
        };
        let unset = Lead::new(SiteId::new(), "auto", "Dana");
        assert!(!cursor.seek_admits(&unset));
    }

    proptest! {
        #[test]
        fn round_trip_law_holds(
            ms in 0i64..4_102_444_800_000,
            score in -1_000i32..100_000,
            raw_id in any::<u128>(),
        ) {
            let cursor = Cursor::PriorityDesc {
                priority_score: score,
                created_at: ts(ms),
                id: id(raw_id),
            };
            prop_assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
        }

        #[test]
        fn premium_cursors_round_trip_decimals(
            mantissa in -1_000_000_000i64..1_000_000_000,
            scale in 0u32..6,
            ms in 0i64..4_102_444_800_000,
        ) {
            let cursor = Cursor::EstPremiumDesc {
                estimated_monthly_premium: Decimal::new(mantissa, scale),
                created_at: ts(ms),
                id: LeadId::new(),
            };
            prop_assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
        }
    }
}
