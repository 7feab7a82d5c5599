//! Per-tenant upload quotas: total stored bytes and files per calendar month.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::job_repo::TenantUsage;

pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 10 * 1024 * 1024 * 1024;
pub const DEFAULT_MAX_FILES_PER_MONTH: u64 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Storage quota exceeded: {used} of {max} bytes used, upload needs {requested} more")]
    Storage { used: u64, requested: u64, max: u64 },

    #[error("Monthly file limit reached: {max} files per month")]
    FilesPerMonth { max: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: u64,
    #[serde(default = "default_max_files_per_month")]
    pub max_files_per_month: u64,
}

fn default_max_storage_bytes() -> u64 {
    DEFAULT_MAX_STORAGE_BYTES
}

fn default_max_files_per_month() -> u64 {
    DEFAULT_MAX_FILES_PER_MONTH
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            max_files_per_month: DEFAULT_MAX_FILES_PER_MONTH,
        }
    }
}

impl QuotaLimits {
    /// Checks whether an upload of `requested` bytes fits. `usage.files_since`
    /// counts the jobs created this month.
    pub fn check(&self, usage: &TenantUsage, requested: u64) -> Result<(), QuotaError> {
        if usage.storage_bytes.saturating_add(requested) > self.max_storage_bytes {
            return Err(QuotaError::Storage {
                used: usage.storage_bytes,
                requested,
                max: self.max_storage_bytes,
            });
        }
        if usage.files_since >= self.max_files_per_month {
            return Err(QuotaError::FilesPerMonth {
                max: self.max_files_per_month,
            });
        }
        Ok(())
    }
}

/// Default limits plus per-tenant overrides keyed by tenant id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(flatten)]
    pub defaults: QuotaLimits,
    #[serde(default)]
    pub tenants: HashMap<Uuid, QuotaLimits>,
}

impl QuotaConfig {
    pub fn limits_for(&self, tenant_id: Uuid) -> QuotaLimits {
        self.tenants
            .get(&tenant_id)
            .copied()
            .unwrap_or(self.defaults)
    }
}

/// One quota line of a usage report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuotaLine {
    pub used: u64,
    pub max: u64,
    pub used_percent: f64,
}

impl QuotaLine {
    fn new(used: u64, max: u64) -> Self {
        let used_percent = if max == 0 {
            0.0
        } else {
            used as f64 / max as f64 * 100.0
        };
        Self {
            used,
            max,
            used_percent,
        }
    }
}

/// Quota usage of one tenant, as served by `GET /quota/usage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub storage: QuotaLine,
    pub files_per_month: QuotaLine,
    pub max_file_size: u64,
}

impl QuotaUsage {
    pub fn new(usage: &TenantUsage, limits: &QuotaLimits, max_file_size: u64) -> Self {
        Self {
            storage: QuotaLine::new(usage.storage_bytes, limits.max_storage_bytes),
            files_per_month: QuotaLine::new(usage.files_since, limits.max_files_per_month),
            max_file_size,
        }
    }
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    today
        .with_day(1)
        .unwrap_or(today)
        .and_time(NaiveTime::MIN)
        .and_utc()
}
