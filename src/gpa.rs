use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::validate_edges;
use crate::error::{AnalysisError, Result};
use crate::loader::Dataset;
use crate::models::{Course, FirstTermGpa, GpaBin, Grade, GradeRow, HistogramBucket, StudentId};

pub type GpaTable = BTreeMap<StudentId, Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermScope {
    All,
    FirstTerm,
}

pub fn grade_point(letter: &str) -> Result<f64> {
    Ok(letter.parse::<Grade>()?.points())
}

/// Credit-weighted GPA over the rows in `scope`, rounded to two places.
///
/// Returns `Ok(None)` when no credit-bearing rows fall in scope.
pub fn compute_gpa<'a, I>(
    student_grades: I,
    courses: &HashMap<String, Course>,
    scope: TermScope,
    acceptance_term: Option<&str>,
) -> Result<Option<f64>>
where
    I: IntoIterator<Item = &'a GradeRow>,
{
    let first_term = match scope {
        TermScope::All => None,
        TermScope::FirstTerm => Some(acceptance_term.ok_or(AnalysisError::MissingAcceptanceTerm)?),
    };

    let mut total_grade_points = 0.0;
    let mut total_credits = 0.0;

    for row in student_grades {
        if let Some(term) = first_term {
            if row.term_id != term {
                continue;
            }
        }

        let credits = courses
            .get(&row.course)
            .ok_or_else(|| AnalysisError::UnknownCourse {
                course: row.course.clone(),
                sid: row.sid,
            })?
            .credits;

        total_grade_points += credits * grade_point(&row.grade)?;
        total_credits += credits;
    }

    if total_credits == 0.0 {
        return Ok(None);
    }

    Ok(Some(round_to(total_grade_points / total_credits, 2)))
}

pub fn gpa_bin(gpa: f64) -> Result<GpaBin> {
    if !(0.0..=4.0).contains(&gpa) {
        return Err(AnalysisError::OutOfRange(gpa));
    }

    let bin = match gpa {
        g if g < 1.0 => GpaBin::ZeroToOne,
        g if g < 2.0 => GpaBin::OneToTwo,
        g if g < 3.0 => GpaBin::TwoToThree,
        _ => GpaBin::ThreeToFour,
    };
    Ok(bin)
}

/// GPA for every student with at least one grade record.
///
/// First-term scope only covers students present in `accepted`, since the
/// acceptance term comes from there.
pub fn gpa_by_student(dataset: &Dataset, scope: TermScope) -> Result<GpaTable> {
    let mut by_student: BTreeMap<StudentId, Vec<&GradeRow>> = BTreeMap::new();
    for row in &dataset.grades {
        by_student.entry(row.sid).or_default().push(row);
    }

    let mut gpas = BTreeMap::new();
    for (sid, rows) in by_student {
        let acceptance_term = match scope {
            TermScope::All => None,
            TermScope::FirstTerm => match dataset.students.get(&sid) {
                Some(student) => Some(student.acc_term_id.as_str()),
                None => continue,
            },
        };

        let gpa = compute_gpa(rows, &dataset.courses, scope, acceptance_term)?;
        gpas.insert(sid, gpa);
    }

    debug!(?scope, students = gpas.len(), "GPA computed");
    Ok(gpas)
}

pub fn first_term_rows(first_term: &GpaTable) -> Vec<FirstTermGpa> {
    first_term
        .iter()
        .map(|(&sid, &first_term_gpa)| FirstTermGpa {
            sid,
            first_term_gpa,
        })
        .collect()
}

/// Counts values into buckets `[e0, e1), [e1, e2), ..., [e(n-1), en]`.
///
/// Values outside the edges are not counted.
pub fn histogram(values: &[f64], edges: &[f64]) -> Result<Vec<HistogramBucket>> {
    validate_edges(edges)?;

    let mut buckets: Vec<HistogramBucket> = edges
        .windows(2)
        .map(|pair| HistogramBucket {
            lower: pair[0],
            upper: pair[1],
            count: 0,
        })
        .collect();

    let first = edges[0];
    let last = edges[edges.len() - 1];

    for &value in values {
        if !(first..=last).contains(&value) {
            continue;
        }
        let index = if value == last {
            buckets.len() - 1
        } else {
            edges.partition_point(|edge| *edge <= value) - 1
        };
        buckets[index].count += 1;
    }

    Ok(buckets)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
