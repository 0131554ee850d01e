//! Retention selection.
//!
//! Each threshold independently selects the smallest set of backups whose
//! removal satisfies it, and the union of those sets is deleted.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};

use fleet_core::{Backup, BackupPolicy};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Indices into `backups` (sorted newest-first) that the policy removes.
pub fn select_for_deletion(
    backups: &[Backup],
    policy: &BackupPolicy,
    now: DateTime<Utc>,
) -> BTreeSet<usize> {
    let mut selected = BTreeSet::new();

    if let Some(max_count) = policy.max_count {
        selected.extend(max_count..backups.len());
    }

    if let Some(days) = policy.max_age_days {
        let cutoff = now - TimeDelta::days(i64::from(days));
        selected.extend(
            backups
                .iter()
                .enumerate()
                .filter(|(_, b)| b.timestamp < cutoff)
                .map(|(i, _)| i),
        );
    }

    if let Some(max_mb) = policy.max_total_size_mb {
        let budget = max_mb.saturating_mul(BYTES_PER_MB);
        let mut total: u64 = backups.iter().map(|b| b.size_bytes).sum();
        for (i, backup) in backups.iter().enumerate().rev() {
            if total <= budget {
                break;
            }
            total -= backup.size_bytes;
            selected.insert(i);
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fleet_core::BackupId;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    /// `ages_days` newest-first.
    fn backups(ages_days: &[i64], size_bytes: u64) -> Vec<Backup> {
        ages_days
            .iter()
            .enumerate()
            .map(|(i, age)| Backup {
                id: BackupId::new("n", &format!("b{i}")),
                node: "n".to_string(),
                version_label: format!("1.0.{i}"),
                timestamp: now() - TimeDelta::days(*age),
                location: format!("/backups/n/b{i}"),
                size_bytes,
            })
            .collect()
    }

    #[test]
    fn count_keeps_newest() {
        let set = backups(&[0, 1, 2, 3, 4, 5, 6, 7], 10);
        let policy = BackupPolicy::unbounded().with_max_count(5);
        let selected = select_for_deletion(&set, &policy, now());
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![5, 6, 7]);
    }

    #[test]
    fn age_removes_only_expired() {
        let set = backups(&[0, 10, 31, 45], 10);
        let policy = BackupPolicy::unbounded().with_max_age_days(30);
        let selected = select_for_deletion(&set, &policy, now());
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn size_removes_oldest_until_under_budget() {
        // Four 400 KiB backups = 1.6 MiB against a 1 MiB budget: drop the two oldest.
        let set = backups(&[0, 1, 2, 3], 400 * 1024);
        let policy = BackupPolicy::unbounded().with_max_total_size_mb(1);
        let selected = select_for_deletion(&set, &policy, now());
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn thresholds_union() {
        let set = backups(&[0, 1, 40, 2, 3], 10);
        let policy = BackupPolicy::unbounded()
            .with_max_count(4)
            .with_max_age_days(30);
        let selected = select_for_deletion(&set, &policy, now());
        assert_eq!(selected.into_iter().collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn nothing_selected_within_limits() {
        let set = backups(&[0, 1, 2], 10);
        assert!(select_for_deletion(&set, &BackupPolicy::default(), now()).is_empty());
        assert!(select_for_deletion(&[], &BackupPolicy::default(), now()).is_empty());
    }
}
