//! Student status classification.
//!
//! `enrolled` is everyone accepted with at least one grade record. `current` is
//! computed by exclusion against all three terminal sets, so it stays correct
//! even when those sets overlap; `former` is the rest of `enrolled`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{AnalysisError, Result, TerminalConflict};
use crate::loader::Dataset;
use crate::models::{AcceptedRow, GradeRow, StudentId, TerminalStatus};

#[derive(Debug, Clone, Default)]
pub struct Cohorts {
    pub enrolled: BTreeSet<StudentId>,
    pub current: BTreeSet<StudentId>,
    pub former: BTreeSet<StudentId>,
}

impl Cohorts {
    pub fn classify(dataset: &Dataset) -> Self {
        let enrolled = enrolled(&dataset.students, &dataset.grades);
        let current = current(
            &enrolled,
            &dataset.alumni,
            &dataset.unretained,
            &dataset.expelled,
        );
        let former = former(&enrolled, &current);

        debug!(
            enrolled = enrolled.len(),
            current = current.len(),
            former = former.len(),
            "Cohorts classified"
        );

        Self {
            enrolled,
            current,
            former,
        }
    }
}

pub fn enrolled(
    accepted: &BTreeMap<StudentId, AcceptedRow>,
    grades: &[GradeRow],
) -> BTreeSet<StudentId> {
    grades
        .iter()
        .map(|g| g.sid)
        .filter(|sid| accepted.contains_key(sid))
        .collect()
}

pub fn current(
    enrolled: &BTreeSet<StudentId>,
    alumni: &BTreeSet<StudentId>,
    unretained: &BTreeSet<StudentId>,
    expelled: &BTreeSet<StudentId>,
) -> BTreeSet<StudentId> {
    enrolled
        .iter()
        .copied()
        .filter(|sid| !alumni.contains(sid) && !unretained.contains(sid) && !expelled.contains(sid))
        .collect()
}

pub fn former(enrolled: &BTreeSet<StudentId>, current: &BTreeSet<StudentId>) -> BTreeSet<StudentId> {
    enrolled.difference(current).copied().collect()
}

/// Fails with every id that shows up in more than one terminal set.
pub fn check_disjoint(
    alumni: &BTreeSet<StudentId>,
    unretained: &BTreeSet<StudentId>,
    expelled: &BTreeSet<StudentId>,
) -> Result<()> {
    let mut memberships: BTreeMap<StudentId, Vec<TerminalStatus>> = BTreeMap::new();

    for (status, set) in [
        (TerminalStatus::Alumni, alumni),
        (TerminalStatus::Unretained, unretained),
        (TerminalStatus::Expelled, expelled),
    ] {
        for sid in set {
            memberships.entry(*sid).or_default().push(status);
        }
    }

    let conflicts: Vec<TerminalConflict> = memberships
        .into_iter()
        .filter(|(_, statuses)| statuses.len() > 1)
        .map(|(sid, statuses)| TerminalConflict { sid, statuses })
        .collect();

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(AnalysisError::DataIntegrity { conflicts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[StudentId]) -> BTreeSet<StudentId> {
        ids.iter().copied().collect()
    }

    fn accepted(ids: &[StudentId]) -> BTreeMap<StudentId, AcceptedRow> {
        ids.iter()
            .map(|&sid| {
                (
                    sid,
                    AcceptedRow {
                        acc_term_id: "2020A".to_string(),
                        sid,
                        first_name: "Avery".to_string(),
                        last_name: "Lee".to_string(),
                        major: "CS".to_string(),
                    },
                )
            })
            .collect()
    }

    fn grade(sid: StudentId) -> GradeRow {
        GradeRow {
            term_id: "2020A".to_string(),
            course: "CS101".to_string(),
            sid,
            fid: 10,
            grade: "A".to_string(),
        }
    }

    #[test]
    fn enrolled_requires_a_grade_record() {
        let grades = vec![grade(1), grade(1), grade(3), grade(99)];
        let result = enrolled(&accepted(&[1, 2, 3]), &grades);

        assert_eq!(result, set(&[1, 3]));
    }

    #[test]
    fn current_excludes_every_terminal_set() {
        let enrolled = set(&[1, 2, 3, 4, 5]);
        let result = current(&enrolled, &set(&[1]), &set(&[2]), &set(&[3, 42]));

        assert_eq!(result, set(&[4, 5]));
    }

    #[test]
    fn enrolled_is_disjoint_union_of_current_and_former() {
        // 6 sits in two terminal sets on purpose.
        let enrolled = set(&[1, 2, 3, 4, 5, 6, 7]);
        let current = current(&enrolled, &set(&[1, 6]), &set(&[2, 6]), &set(&[3]));
        let former = former(&enrolled, &current);

        assert!(current.is_disjoint(&former));
        let union: BTreeSet<StudentId> = current.union(&former).copied().collect();
        assert_eq!(union, enrolled);
        assert_eq!(former, set(&[1, 2, 3, 6]));
    }

    #[test]
    fn check_disjoint_accepts_clean_sets() {
        assert!(check_disjoint(&set(&[1, 2]), &set(&[3]), &set(&[4])).is_ok());
        assert!(check_disjoint(&set(&[]), &set(&[]), &set(&[])).is_ok());
    }

    #[test]
    fn check_disjoint_reports_each_overlap() {
        let err = check_disjoint(&set(&[1, 2]), &set(&[2, 3]), &set(&[1, 2])).unwrap_err();

        let AnalysisError::DataIntegrity { conflicts } = err else {
            panic!("expected an integrity error");
        };
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].sid, 1);
        assert_eq!(
            conflicts[0].statuses,
            vec![TerminalStatus::Alumni, TerminalStatus::Expelled]
        );
        assert_eq!(conflicts[1].sid, 2);
        assert_eq!(conflicts[1].statuses.len(), 3);
    }

    #[test]
    fn classify_uses_dataset_tables() {
        let dataset = Dataset {
            students: accepted(&[1, 2, 3]),
            grades: vec![grade(1), grade(2)],
            alumni: set(&[1]),
            ..Default::default()
        };

        let cohorts = Cohorts::classify(&dataset);
        assert_eq!(cohorts.enrolled, set(&[1, 2]));
        assert_eq!(cohorts.current, set(&[2]));
        assert_eq!(cohorts.former, set(&[1]));
    }
}
