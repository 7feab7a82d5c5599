use std::collections::HashMap;

use uuid::Uuid;

use crate::job::Job;
use crate::model::Page;

/// Keeps the displayed state of one job from moving backwards.
///
/// Responses may arrive duplicated or out of order. A response is accepted
/// only if its status ranks at or after the displayed one, and once a
/// terminal status is displayed nothing with a different status replaces it.
#[derive(Debug, Default, Clone)]
pub struct StatusGuard {
    expected: Option<Uuid>,
    shown: Option<Job>,
}

impl StatusGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A guard that only ever accepts responses for `job_id`.
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            expected: Some(job_id),
            shown: None,
        }
    }

    pub fn current(&self) -> Option<&Job> {
        self.shown.as_ref()
    }

    /// The displayed job once it has reached a terminal status.
    pub fn terminal(&self) -> Option<&Job> {
        self.shown.as_ref().filter(|job| job.is_terminal())
    }

    /// Offers a response; returns true if it replaced the displayed state.
    pub fn observe(&mut self, job: Job) -> bool {
        if self.expected.is_some_and(|id| id != job.id) {
            return false;
        }
        if let Some(shown) = &self.shown {
            if shown.id != job.id {
                return false;
            }
            if shown.is_terminal() && (job.status != shown.status || job == *shown) {
                return false;
            }
            if job.status.rank() < shown.status.rank() {
                return false;
            }
        }
        self.shown = Some(job);
        true
    }
}

/// [`StatusGuard`]s for every job shown by a list view.
#[derive(Debug, Default)]
pub struct StatusBoard {
    guards: HashMap<Uuid, StatusGuard>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces stale entries of `page` with the state already displayed.
    pub fn merge(&mut self, mut page: Page<Job>) -> Page<Job> {
        for job in page.items.iter_mut() {
            let guard = self
                .guards
                .entry(job.id)
                .or_insert_with(|| StatusGuard::for_job(job.id));
            if !guard.observe(job.clone()) {
                if let Some(shown) = guard.current() {
                    *job = shown.clone();
                }
            }
        }
        page
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}
