use thiserror::Error;

use crate::models::{StudentId, TerminalStatus};

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// A student id found in more than one terminal status set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConflict {
    pub sid: StudentId,
    pub statuses: Vec<TerminalStatus>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{} student(s) appear in more than one terminal set: {}", .conflicts.len(), describe_conflicts(.conflicts))]
    DataIntegrity { conflicts: Vec<TerminalConflict> },

    #[error("unknown grade letter {0:?}; expected one of A, B, C, D, F")]
    UnknownGrade(String),

    #[error("grade record for student {sid} references unknown course {course:?}")]
    UnknownCourse { course: String, sid: StudentId },

    #[error("GPA {0} is outside the range [0, 4]")]
    OutOfRange(f64),

    #[error("first-term scope requires an acceptance term")]
    MissingAcceptanceTerm,

    #[error("student {0} appears more than once in accepted")]
    DuplicateStudent(StudentId),

    #[error("course {0:?} appears more than once in courses")]
    DuplicateCourse(String),

    #[error("course {course:?} has non-numeric credits {value:?}")]
    InvalidCredits { course: String, value: String },

    #[error("histogram edges must be strictly increasing with at least two entries")]
    InvalidBinEdges,
}

fn describe_conflicts(conflicts: &[TerminalConflict]) -> String {
    const SHOWN: usize = 5;

    let mut parts: Vec<String> = conflicts
        .iter()
        .take(SHOWN)
        .map(|conflict| {
            let statuses: Vec<&str> = conflict.statuses.iter().map(|s| s.as_str()).collect();
            format!("{} in {}", conflict.sid, statuses.join("+"))
        })
        .collect();

    if conflicts.len() > SHOWN {
        parts.push(format!("and {} more", conflicts.len() - SHOWN));
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_message_lists_conflicts() {
        let err = AnalysisError::DataIntegrity {
            conflicts: vec![TerminalConflict {
                sid: 7,
                statuses: vec![TerminalStatus::Alumni, TerminalStatus::Expelled],
            }],
        };

        assert_eq!(
            err.to_string(),
            "1 student(s) appear in more than one terminal set: 7 in alumni+expelled"
        );
    }

    #[test]
    fn integrity_message_truncates_long_lists() {
        let conflicts = (1..=8)
            .map(|sid| TerminalConflict {
                sid,
                statuses: vec![TerminalStatus::Alumni, TerminalStatus::Unretained],
            })
            .collect();
        let message = AnalysisError::DataIntegrity { conflicts }.to_string();

        assert!(message.starts_with("8 student(s)"));
        assert!(message.ends_with("and 3 more"));
    }
}
