//! Pure progress arithmetic over a user's visit log in one hierarchy.
//!
//! Everything here degrades to zero/empty values: a learner without visits is
//! the normal starting state, not an error.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::model::{PageVisit, SectionId};

/// Format used by the research exports for last-access timestamps.
pub const LAST_ACCESS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Truncating integer percentage of `visited` over `total`; 0 for an empty tree.
#[must_use]
pub fn percent_complete(visited: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = visited.saturating_mul(100) / total;
    u32::try_from(pct).unwrap_or(u32::MAX)
}

/// Progress figures for one user in one hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    total_sections: usize,
    visited_sections: usize,
    last_access: Option<DateTime<Utc>>,
    first_access: Option<DateTime<Utc>>,
    last_section: Option<SectionId>,
}

impl ProgressSnapshot {
    /// Build a snapshot from the visits a user made inside one hierarchy.
    ///
    /// `total_sections` counts the root's descendants; visits to the root
    /// itself never count towards completion.
    #[must_use]
    pub fn from_visits(root: SectionId, total_sections: usize, visits: &[PageVisit]) -> Self {
        let visited_sections = visits
            .iter()
            .map(|v| v.section_id)
            .filter(|id| *id != root)
            .collect::<HashSet<_>>()
            .len();

        let latest = visits.iter().max_by_key(|v| v.last_visit);
        let first_access = visits.iter().map(|v| v.first_visit).min();

        Self {
            total_sections,
            visited_sections,
            last_access: latest.map(|v| v.last_visit),
            first_access,
            last_section: latest.map(|v| v.section_id),
        }
    }

    #[must_use]
    pub fn empty(total_sections: usize) -> Self {
        Self::from_visits(SectionId::new(0), total_sections, &[])
    }

    #[must_use]
    pub fn total_sections(&self) -> usize {
        self.total_sections
    }

    #[must_use]
    pub fn visited_sections(&self) -> usize {
        self.visited_sections
    }

    #[must_use]
    pub fn percent_complete(&self) -> u32 {
        percent_complete(self.visited_sections, self.total_sections)
    }

    #[must_use]
    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.last_access
    }

    /// `last_access` rendered for reports, or an empty string.
    #[must_use]
    pub fn last_access_formatted(&self) -> String {
        self.last_access
            .map(|dt| dt.format(LAST_ACCESS_FORMAT).to_string())
            .unwrap_or_default()
    }

    /// Whole minutes between the first recorded visit and the latest one.
    ///
    /// This is the wall-clock span of the visit log: idle gaps between
    /// visits are counted too.
    #[must_use]
    pub fn time_spent(&self) -> i64 {
        match (self.first_access, self.last_access) {
            (Some(start), Some(end)) => end.signed_duration_since(start).num_minutes().max(0),
            _ => 0,
        }
    }

    /// Section of the most recent visit, if any.
    #[must_use]
    pub fn last_section(&self) -> Option<SectionId> {
        self.last_section
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use crate::time::fixed_now;
    use chrono::Duration;

    const ROOT: SectionId = SectionId::new(1);

    fn visit(section: u64, first_min: i64, last_min: i64) -> PageVisit {
        PageVisit {
            user_id: UserId::new(1),
            section_id: SectionId::new(section),
            first_visit: fixed_now() + Duration::minutes(first_min),
            last_visit: fixed_now() + Duration::minutes(last_min),
        }
    }

    #[test]
    fn no_visits_means_zero_everything() {
        let snap = ProgressSnapshot::from_visits(ROOT, 4, &[]);
        assert_eq!(snap.percent_complete(), 0);
        assert_eq!(snap.last_access(), None);
        assert_eq!(snap.last_access_formatted(), "");
        assert_eq!(snap.time_spent(), 0);
        assert_eq!(snap.last_section(), None);
    }

    #[test]
    fn empty_tree_never_divides_by_zero() {
        let snap = ProgressSnapshot::from_visits(ROOT, 0, &[visit(1, 0, 5)]);
        assert_eq!(snap.percent_complete(), 0);
    }

    #[test]
    fn two_section_tree_examples() {
        let half = ProgressSnapshot::from_visits(ROOT, 2, &[visit(2, 0, 1)]);
        assert_eq!(half.percent_complete(), 50);

        let full = ProgressSnapshot::from_visits(ROOT, 2, &[visit(2, 0, 1), visit(3, 2, 3)]);
        assert_eq!(full.percent_complete(), 100);
    }

    #[test]
    fn percent_truncates() {
        assert_eq!(percent_complete(1, 3), 33);
        assert_eq!(percent_complete(2, 3), 66);
        assert_eq!(percent_complete(29, 100), 29);
    }

    #[test]
    fn percent_is_monotonic_in_distinct_visits() {
        let total = 7;
        let mut visits = Vec::new();
        let mut previous = 0;
        for section in 2..=8 {
            visits.push(visit(section, 0, 1));
            // revisit does not change the distinct count
            visits.push(visit(section, 1, 2));
            let pct = ProgressSnapshot::from_visits(ROOT, total, &visits).percent_complete();
            assert!(pct >= previous);
            previous = pct;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn root_visits_do_not_count() {
        let snap = ProgressSnapshot::from_visits(ROOT, 2, &[visit(1, 0, 1)]);
        assert_eq!(snap.percent_complete(), 0);
        assert_eq!(snap.last_section(), Some(ROOT));
    }

    #[test]
    fn last_access_and_location_follow_latest_visit() {
        let visits = [visit(2, 0, 30), visit(3, 5, 90), visit(4, 10, 20)];
        let snap = ProgressSnapshot::from_visits(ROOT, 3, &visits);
        assert_eq!(snap.last_access(), Some(fixed_now() + Duration::minutes(90)));
        assert_eq!(snap.last_section(), Some(SectionId::new(3)));
        assert_eq!(snap.last_access_formatted(), "2023-11-14T23:43:20");
    }

    #[test]
    fn time_spent_is_the_span_including_gaps() {
        let visits = [visit(2, 0, 1), visit(3, 120, 125)];
        let snap = ProgressSnapshot::from_visits(ROOT, 3, &visits);
        assert_eq!(snap.time_spent(), 125);
    }
}
