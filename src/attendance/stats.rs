use crate::models::AttendanceRecord;

/// Derived counts for one date; always recomputed, never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttendanceStats {
    pub present: usize,
    pub absent: usize,
    pub unmarked: usize,
}

impl AttendanceStats {
    /// Count `records` against a roster of `roster_len` children
    ///
    /// Callers pass only records that belong to roster children, so
    /// `present + absent + unmarked == roster_len`.
    pub fn compute<'a, I>(roster_len: usize, records: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendanceRecord>,
    {
        let (present, absent) = records
            .into_iter()
            .fold((0, 0), |(p, a), r| if r.present { (p + 1, a) } else { (p, a + 1) });

        Self {
            present,
            absent,
            unmarked: roster_len.saturating_sub(present + absent),
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.absent + self.unmarked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn record(child: &str, present: bool) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("r-{}", child),
            child_id: child.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            present,
            marked_by: "admin-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_add_up_to_roster() {
        let records = vec![record("amy", true), record("ben", false), record("cat", true)];
        let stats = AttendanceStats::compute(5, &records);
        assert_eq!(
            stats,
            AttendanceStats {
                present: 2,
                absent: 1,
                unmarked: 2
            }
        );
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn empty_roster() {
        let none: Vec<AttendanceRecord> = Vec::new();
        assert_eq!(AttendanceStats::compute(0, &none), AttendanceStats::default());
    }
}
