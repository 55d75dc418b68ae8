//! Job queue storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use leadops_core::{CoreError, CoreResult, SiteId};

use super::types::{Job, JobId, JobKind, JobState};

/// Durable job queue abstraction.
///
/// The claim is the heart of the contract: selecting a job and transitioning
/// it `queued → running` are a single atomic operation, so no two workers can
/// ever claim the same job and there is no window where a job appears queued
/// to one worker and running to another.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enqueue a new job (producer side).
    async fn enqueue(&self, job: Job) -> CoreResult<JobId>;

    /// Fetch a job, scoped to its site.
    async fn get(&self, site_id: SiteId, job_id: JobId) -> CoreResult<Option<Job>>;

    /// Atomically claim the oldest queued job (optionally of one kind) and
    /// transition it to `running`, incrementing `attempts`. Returns `None`
    /// when the queue is empty.
    async fn claim_next(&self, kind: Option<&JobKind>) -> CoreResult<Option<Job>>;

    /// Record success. Only valid on a `running` job; a terminal job is never
    /// modified (`Conflict`).
    async fn complete(&self, job_id: JobId, result: serde_json::Value) -> CoreResult<()>;

    /// Record failure with error detail. Same transition guard as
    /// [`JobStore::complete`]. Failure is terminal — nothing requeues here.
    async fn fail(&self, job_id: JobId, error: String) -> CoreResult<()>;

    /// Return jobs stuck in `running` longer than `older_than` to `queued`.
    ///
    /// A worker that crashes mid-handler leaves its claim stuck; this is the
    /// explicit reclaim path. The threshold is the operator's call — nothing
    /// in the engine invokes this on its own or picks a default.
    async fn reclaim_stale(&self, older_than: Duration) -> CoreResult<Vec<JobId>>;
}

/// In-memory job store for tests/dev.
///
/// The single mutex is the atomicity that `FOR UPDATE SKIP LOCKED` provides
/// in the Postgres backend: a claim observes and transitions the job in one
/// critical section.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> CoreResult<JobId> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(CoreError::conflict(format!("job {} already exists", job.id)));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, site_id: SiteId, job_id: JobId) -> CoreResult<Option<Job>> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .get(&job_id)
            .filter(|j| j.site_id == site_id)
            .cloned())
    }

    async fn claim_next(&self, kind: Option<&JobKind>) -> CoreResult<Option<Job>> {
        let mut jobs = self.jobs.lock().unwrap();

        // Oldest queued first; id is the deterministic tie-break.
        let next = jobs
            .values()
            .filter(|j| j.state == JobState::Queued)
            .filter(|j| kind.is_none_or(|k| &j.kind == k))
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        match next {
            None => Ok(None),
            Some(id) => {
                let job = jobs.get_mut(&id).expect("job disappeared under lock");
                job.mark_running(Utc::now());
                Ok(Some(job.clone()))
            }
        }
    }

    async fn complete(&self, job_id: JobId, result: serde_json::Value) -> CoreResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(CoreError::NotFound)?;
        if job.state != JobState::Running {
            return Err(CoreError::conflict(format!(
                "job {} is {}, not running",
                job_id,
                job.state.as_str()
            )));
        }
        job.mark_ready(result, Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: JobId, error: String) -> CoreResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(CoreError::NotFound)?;
        if job.state != JobState::Running {
            return Err(CoreError::conflict(format!(
                "job {} is {}, not running",
                job_id,
                job.state.as_str()
            )));
        }
        job.mark_failed(error, Utc::now());
        Ok(())
    }

    async fn reclaim_stale(&self, older_than: Duration) -> CoreResult<Vec<JobId>> {
        let mut jobs = self.jobs.lock().unwrap();
        let cutoff = Utc::now() - older_than;

        let mut reclaimed = Vec::new();
        for job in jobs.values_mut() {
            if job.state == JobState::Running && job.updated_at < cutoff {
                job.state = JobState::Queued;
                job.updated_at = Utc::now();
                reclaimed.push(job.id);
            }
        }
        reclaimed.sort();
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn job(site: SiteId) -> Job {
        Job::new(site, JobKind::lead_export(), serde_json::json!({}))
    }

    #[tokio::test]
    async fn claim_transitions_the_oldest_queued_job() {
        let store = InMemoryJobStore::new();
        let site = SiteId::new();

        let mut first = job(site);
        first.created_at = Utc::now() - Duration::minutes(2);
        let first_id = first.id;
        store.enqueue(first).await.unwrap();
        store.enqueue(job(site)).await.unwrap();

        let claimed = store.claim_next(None).await.unwrap().unwrap();
        assert_eq!(claimed.id, first_id);
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn claim_respects_the_kind_filter() {
        let store = InMemoryJobStore::new();
        let site = SiteId::new();
        store
            .enqueue(Job::new(site, JobKind::new("other"), serde_json::json!({})))
            .await
            .unwrap();

        assert!(store
            .claim_next(Some(&JobKind::lead_export()))
            .await
            .unwrap()
            .is_none());
        assert!(store.claim_next(None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn terminal_states_are_never_left() {
        let store = InMemoryJobStore::new();
        let site = SiteId::new();
        store.enqueue(job(site)).await.unwrap();

        let claimed = store.claim_next(None).await.unwrap().unwrap();
        store
            .complete(claimed.id, serde_json::json!({"ok": true}))
            .await
            .unwrap();

        // A second completion, a failure, or anything else is a conflict.
        assert!(matches!(
            store.complete(claimed.id, serde_json::json!({})).await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            store.fail(claimed.id, "late".into()).await,
            Err(CoreError::Conflict(_))
        ));

        let stored = store.get(site, claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.state, JobState::Ready);
    }

    #[tokio::test]
    async fn jobs_are_invisible_across_sites() {
        let store = InMemoryJobStore::new();
        let site = SiteId::new();
        let other = SiteId::new();
        let id = store.enqueue(job(site)).await.unwrap();

        assert!(store.get(other, id).await.unwrap().is_none());
        assert!(store.get(site, id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn at_most_one_claim_under_concurrency() {
        const WORKERS: usize = 8;
        const JOBS: usize = 40;

        let store = InMemoryJobStore::arc();
        let site = SiteId::new();
        for _ in 0..JOBS {
            store.enqueue(job(site)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..WORKERS {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(j) = store.claim_next(None).await.unwrap() {
                    claimed.push(j.id);
                    tokio::task::yield_now().await;
                }
                claimed
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }

        // Every job claimed exactly once, none skipped, none doubled.
        assert_eq!(all.len(), JOBS);
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), JOBS);
    }

    #[tokio::test]
    async fn reclaim_stale_requeues_only_old_running_jobs() {
        let store = InMemoryJobStore::new();
        let site = SiteId::new();
        store.enqueue(job(site)).await.unwrap();

        let claimed = store.claim_next(None).await.unwrap().unwrap();

        // Fresh claim: not stale yet.
        assert!(store
            .reclaim_stale(Duration::minutes(10))
            .await
            .unwrap()
            .is_empty());

        // Pretend the worker died an hour ago.
        {
            let mut jobs = store.jobs.lock().unwrap();
            jobs.get_mut(&claimed.id).unwrap().updated_at = Utc::now() - Duration::hours(1);
        }

        let reclaimed = store.reclaim_stale(Duration::minutes(10)).await.unwrap();
        assert_eq!(reclaimed, vec![claimed.id]);

        let requeued = store.get(site, claimed.id).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Queued);
        // Attempts are preserved: the next claim is visibly attempt 2.
        assert_eq!(requeued.attempts, 1);
    }
}
