//! Time-ordered, user-grouped cohort split
//!
//! Users are ordered by signup time (their earliest record) and cut into
//! train / validation / test cohorts in that order. Every row follows its
//! user, so no user's history is shared between partitions and validation
//! and test users never sign up before training users.

use chrono::{DateTime, Utc};
use churn_core::config::validate_split_fractions;
use churn_core::floor_fraction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::dataset::Record;
use crate::errors::Result;

/// First and last signup time of a cohort
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupPeriod {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

/// Row masks and user cohorts produced by [`time_ordered_split`]
#[derive(Clone, Debug)]
pub struct UserSplit {
    pub train_mask: Vec<bool>,
    pub val_mask: Vec<bool>,
    pub test_mask: Vec<bool>,
    pub train_users: HashSet<String>,
    pub val_users: HashSet<String>,
    pub test_users: HashSet<String>,
    pub train_period: Option<SignupPeriod>,
    pub val_period: Option<SignupPeriod>,
    pub test_period: Option<SignupPeriod>,
}

impl UserSplit {
    pub fn user_count(&self) -> usize {
        self.train_users.len() + self.val_users.len() + self.test_users.len()
    }

    /// Number of rows in (train, val, test)
    pub fn row_counts(&self) -> (usize, usize, usize) {
        let count = |mask: &[bool]| mask.iter().filter(|&&m| m).count();
        (
            count(&self.train_mask),
            count(&self.val_mask),
            count(&self.test_mask),
        )
    }
}

/// Split records into train / validation / test cohorts by signup time
///
/// With `n` users sorted by signup (ties by user id),
/// `val_start = floor((1 - test_frac - val_frac) * n)` and
/// `test_start = floor((1 - test_frac) * n)`. Small `n` may leave the
/// validation or test cohort empty; that is reported, not treated as an error.
pub fn time_ordered_split(records: &[Record], test_frac: f64, val_frac: f64) -> Result<UserSplit> {
    validate_split_fractions(test_frac, val_frac)?;

    let mut signup: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for record in records {
        signup
            .entry(record.user_id.as_str())
            .and_modify(|ts| *ts = (*ts).min(record.timestamp))
            .or_insert(record.timestamp);
    }

    let mut users: Vec<(DateTime<Utc>, &str)> = signup.into_iter().map(|(u, ts)| (ts, u)).collect();
    users.sort_unstable();

    let n_users = users.len();
    let test_start = floor_fraction(1.0 - test_frac, n_users);
    let val_start = floor_fraction(1.0 - test_frac - val_frac, n_users).min(test_start);

    let cohort = |range: std::ops::Range<usize>| -> (HashSet<String>, Option<SignupPeriod>) {
        let slice = &users[range];
        let users = slice.iter().map(|(_, u)| u.to_string()).collect();
        let period = match (slice.first(), slice.last()) {
            (Some(first), Some(last)) => Some(SignupPeriod {
                first: first.0,
                last: last.0,
            }),
            _ => None,
        };
        (users, period)
    };

    let (train_users, train_period) = cohort(0..val_start);
    let (val_users, val_period) = cohort(val_start..test_start);
    let (test_users, test_period) = cohort(test_start..n_users);

    let membership = |users: &HashSet<String>| -> Vec<bool> {
        records.iter().map(|r| users.contains(&r.user_id)).collect()
    };

    let split = UserSplit {
        train_mask: membership(&train_users),
        val_mask: membership(&val_users),
        test_mask: membership(&test_users),
        train_users,
        val_users,
        test_users,
        train_period,
        val_period,
        test_period,
    };

    log_split(&split, records.len());
    Ok(split)
}

fn log_split(split: &UserSplit, total_rows: usize) {
    let (train_rows, val_rows, test_rows) = split.row_counts();
    info!(
        "Users: total={}, train={}, val={}, test={}",
        split.user_count(),
        split.train_users.len(),
        split.val_users.len(),
        split.test_users.len()
    );
    info!(
        "Rows: total={}, train={}, val={}, test={}",
        total_rows, train_rows, val_rows, test_rows
    );

    for (name, period) in [
        ("Train", split.train_period),
        ("Val", split.val_period),
        ("Test", split.test_period),
    ] {
        match period {
            Some(p) => info!("{} period: {} to {}", name, p.first, p.last),
            None => info!("{} period: empty cohort", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn record(user: &str, day: i64) -> Record {
        Record {
            user_id: user.to_string(),
            timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            label: 0,
            features: vec![],
        }
    }

    /// `n_users` users with `rows_per_user` records each; user `i` signs up on day `i`
    fn panel(n_users: usize, rows_per_user: usize) -> Vec<Record> {
        let mut records = Vec::new();
        for row in 0..rows_per_user {
            for user in 0..n_users {
                records.push(record(&format!("user-{user:03}"), (user + row) as i64));
            }
        }
        records
    }

    #[test]
    fn test_boundaries_follow_signup_order() -> Result<()> {
        let records = panel(20, 5);
        let split = time_ordered_split(&records, 0.2, 0.1)?;

        assert_eq!(split.train_users.len(), 14);
        assert_eq!(split.val_users.len(), 2);
        assert_eq!(split.test_users.len(), 4);

        assert!(split.train_users.contains("user-000"));
        assert!(split.val_users.contains("user-014"));
        assert!(split.test_users.contains("user-019"));

        let train = split.train_period.unwrap();
        let val = split.val_period.unwrap();
        let test = split.test_period.unwrap();
        assert!(train.last <= val.first);
        assert!(val.last <= test.first);
        Ok(())
    }

    #[test]
    fn test_end_to_end_fractions() -> Result<()> {
        let records = panel(20, 5);
        assert_eq!(records.len(), 100);

        let split = time_ordered_split(&records, 0.2, 0.1)?;
        let n = split.user_count() as f64;

        assert!(split.train_users.len() as f64 / n > 0.65);
        assert!((split.val_users.len() as f64 / n) < 0.15);
        assert!((split.test_users.len() as f64 / n) < 0.25);

        let (train_rows, val_rows, test_rows) = split.row_counts();
        assert_eq!(train_rows + val_rows + test_rows, 100);
        Ok(())
    }

    #[test]
    fn test_boundaries_use_plain_floor() -> Result<()> {
        // (1 - 0.3) * 90 evaluates just below 63
        let records = panel(90, 1);
        let split = time_ordered_split(&records, 0.3, 0.1)?;

        assert_eq!(split.test_users.len(), 28);
        assert_eq!(split.train_users.len() + split.val_users.len(), 62);
        assert!(split.test_users.contains("user-062"));
        Ok(())
    }

    #[test]
    fn test_signup_uses_minimum_timestamp() -> Result<()> {
        // "late" has a late first row but an early second row
        let records = vec![
            record("early", 1),
            record("late", 10),
            record("late", 0),
            record("middle", 5),
        ];
        let split = time_ordered_split(&records, 1.0 / 3.0, 1.0 / 3.0)?;

        assert!(split.train_users.contains("late"));
        assert!(split.val_users.contains("early"));
        assert!(split.test_users.contains("middle"));
        assert_eq!(split.train_mask, vec![false, true, true, false]);
        Ok(())
    }

    #[test]
    fn test_degenerate_split_yields_empty_cohorts() -> Result<()> {
        let records = vec![record("only", 0), record("only", 1)];
        let split = time_ordered_split(&records, 0.2, 0.1)?;

        // floor(0.8 * 1) == 0, so the lone user lands in the test cohort
        assert!(split.train_users.is_empty());
        assert!(split.val_users.is_empty());
        assert_eq!(split.test_users.len(), 1);
        assert!(split.train_period.is_none());
        assert_eq!(split.test_mask, vec![true, true]);
        Ok(())
    }

    #[test]
    fn test_invalid_fractions_rejected() {
        let records = panel(4, 1);
        let err = time_ordered_split(&records, 0.7, 0.5).unwrap_err();
        assert!(err.is_configuration());
        assert!(time_ordered_split(&records, -0.1, 0.1).unwrap_err().is_configuration());
    }

    #[test]
    fn test_split_is_deterministic() -> Result<()> {
        let records = panel(37, 3);
        let a = time_ordered_split(&records, 0.25, 0.15)?;
        let b = time_ordered_split(&records, 0.25, 0.15)?;

        assert_eq!(a.train_users, b.train_users);
        assert_eq!(a.val_users, b.val_users);
        assert_eq!(a.test_users, b.test_users);
        assert_eq!(a.train_mask, b.train_mask);
        Ok(())
    }

    proptest! {
        #[test]
        fn cohorts_partition_users_and_rows(
            days in prop::collection::vec((0usize..30, 0i64..60), 1..120),
            test_frac in 0.0f64..=1.0,
            val_share in 0.0f64..0.99,
        ) {
            let val_frac = (1.0 - test_frac) * val_share;
            let records: Vec<Record> = days
                .iter()
                .map(|&(user, day)| record(&format!("u{user}"), day))
                .collect();
            let n_users = records.iter().map(|r| r.user_id.as_str()).collect::<HashSet<_>>().len();

            let split = time_ordered_split(&records, test_frac, val_frac).unwrap();

            prop_assert_eq!(split.user_count(), n_users);
            prop_assert!(split.train_users.is_disjoint(&split.val_users));
            prop_assert!(split.train_users.is_disjoint(&split.test_users));
            prop_assert!(split.val_users.is_disjoint(&split.test_users));

            for i in 0..records.len() {
                let memberships = [split.train_mask[i], split.val_mask[i], split.test_mask[i]]
                    .iter()
                    .filter(|&&m| m)
                    .count();
                prop_assert_eq!(memberships, 1);
            }
        }
    }
}
