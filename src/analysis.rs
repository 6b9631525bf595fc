use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::cohort::Cohorts;
use crate::error::{AnalysisError, Result};
use crate::gpa::{gpa_bin, histogram, round_to, GpaTable};
use crate::loader::Dataset;
use crate::models::{
    BinGraduation, CurrentGpaReport, DepartmentShare, FacultyId, GpaBin, Grade, InstructorGrades,
    MajorGraduation, MajorShare, StatusCounts, StudentGpa, StudentId, TermsToGraduation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    FewestA,
    MostA,
}

pub fn status_counts(dataset: &Dataset, cohorts: &Cohorts) -> StatusCounts {
    StatusCounts {
        accepted: dataset.students.len(),
        enrolled: cohorts.enrolled.len(),
        current: cohorts.current.len(),
        former: cohorts.former.len(),
        unretained: dataset.unretained.len(),
        expelled: dataset.expelled.len(),
        alumni: dataset.alumni.len(),
    }
}

pub fn major_distribution(dataset: &Dataset, cohorts: &Cohorts) -> Vec<MajorShare> {
    let total = cohorts.current.len();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for sid in &cohorts.current {
        if let Some(student) = dataset.students.get(sid) {
            *counts.entry(student.major.as_str()).or_insert(0) += 1;
        }
    }

    let mut shares: Vec<MajorShare> = counts
        .into_iter()
        .map(|(major, n_students)| MajorShare {
            major: major.to_string(),
            n_students,
            prop: round_to(n_students as f64 / total as f64, 4),
        })
        .collect();

    shares.sort_by(|a, b| by_prop_desc(a.prop, b.prop).then_with(|| a.major.cmp(&b.major)));
    shares
}

/// Share of `term_id`'s course enrollments taken in each department.
pub fn department_enrollment(dataset: &Dataset, term_id: &str) -> Result<Vec<DepartmentShare>> {
    let mut total = 0usize;
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for row in dataset.grades.iter().filter(|g| g.term_id == term_id) {
        let course = dataset
            .courses
            .get(&row.course)
            .ok_or_else(|| AnalysisError::UnknownCourse {
                course: row.course.clone(),
                sid: row.sid,
            })?;
        *counts.entry(course.dept.as_str()).or_insert(0) += 1;
        total += 1;
    }

    let mut shares: Vec<DepartmentShare> = counts
        .into_iter()
        .map(|(dept, n_students)| DepartmentShare {
            dept: dept.to_string(),
            n_students,
            prop: round_to(n_students as f64 / total as f64, 4),
        })
        .collect();

    shares.sort_by(|a, b| by_prop_desc(a.prop, b.prop).then_with(|| a.dept.cmp(&b.dept)));
    Ok(shares)
}

/// Graduation rate among former students of each major.
///
/// Every major with an enrolled student is listed; a major whose students are
/// all still current has no rate.
pub fn graduation_by_major(dataset: &Dataset, cohorts: &Cohorts) -> Vec<MajorGraduation> {
    let mut tallies: BTreeMap<&str, (usize, usize)> = BTreeMap::new();

    for sid in &cohorts.enrolled {
        let Some(student) = dataset.students.get(sid) else {
            continue;
        };
        let entry = tallies.entry(student.major.as_str()).or_insert((0, 0));
        if cohorts.former.contains(sid) {
            entry.1 += 1;
            if dataset.alumni.contains(sid) {
                entry.0 += 1;
            }
        }
    }

    tallies
        .into_iter()
        .map(|(major, (n_alumni, n_former))| MajorGraduation {
            major: major.to_string(),
            n_alumni,
            n_former,
            grad_rate: ratio(n_alumni, n_former, 4),
        })
        .collect()
}

pub fn terms_to_graduation(dataset: &Dataset) -> Vec<TermsToGraduation> {
    let mut terms_by_alumnus: BTreeMap<StudentId, BTreeSet<&str>> = BTreeMap::new();
    for row in dataset.grades.iter().filter(|g| dataset.alumni.contains(&g.sid)) {
        terms_by_alumnus
            .entry(row.sid)
            .or_default()
            .insert(row.term_id.as_str());
    }

    let mut frequency: BTreeMap<usize, usize> = BTreeMap::new();
    for terms in terms_by_alumnus.values() {
        *frequency.entry(terms.len()).or_insert(0) += 1;
    }

    frequency
        .into_iter()
        .map(|(n_terms, n_alumni)| TermsToGraduation { n_terms, n_alumni })
        .collect()
}

/// Current students with their all-terms GPA, lowest first.
///
/// Students without a defined GPA sort last and are left out of the
/// distribution.
pub fn current_gpa_report(
    dataset: &Dataset,
    cohorts: &Cohorts,
    all_terms: &GpaTable,
    edges: &[f64],
) -> Result<CurrentGpaReport> {
    let mut students: Vec<StudentGpa> = cohorts
        .current
        .iter()
        .filter_map(|sid| {
            let gpa = all_terms.get(sid)?;
            let student = dataset.students.get(sid)?;
            Some(StudentGpa {
                sid: *sid,
                first_name: student.first_name.clone(),
                last_name: student.last_name.clone(),
                major: student.major.clone(),
                gpa: *gpa,
            })
        })
        .collect();

    students.sort_by(|a, b| by_missing_last(a.gpa, b.gpa).then_with(|| a.sid.cmp(&b.sid)));

    let perfect_count = students.iter().filter(|s| s.gpa == Some(4.0)).count();
    let mut report = CurrentGpaReport {
        students,
        perfect_count,
        distribution: Vec::new(),
    };
    report.distribution = histogram(&report.gpa_values(), edges)?;

    Ok(report)
}

/// Letter-grade mix per instructor, ordered by fid.
pub fn instructor_grade_distribution(dataset: &Dataset) -> Result<Vec<InstructorGrades>> {
    let mut counts: BTreeMap<FacultyId, [usize; 5]> = BTreeMap::new();
    for row in &dataset.grades {
        let grade: Grade = row.grade.parse()?;
        counts.entry(row.fid).or_insert([0; 5])[grade.index()] += 1;
    }

    let mut distribution = Vec::with_capacity(counts.len());
    for (fid, counts) in counts {
        let Some(instructor) = dataset.faculty.get(&fid) else {
            warn!(fid, grades = counts.iter().sum::<usize>(), "Skipping grades for unknown instructor");
            continue;
        };

        let n: usize = counts.iter().sum();
        let prop = |grade: Grade| round_to(counts[grade.index()] as f64 / n as f64, 2);

        distribution.push(InstructorGrades {
            fid,
            first_name: instructor.first_name.clone(),
            last_name: instructor.last_name.clone(),
            dept: instructor.dept.clone(),
            n,
            counts,
            prop_a: prop(Grade::A),
            prop_b: prop(Grade::B),
            prop_c: prop(Grade::C),
            prop_d: prop(Grade::D),
            prop_f: prop(Grade::F),
        });
    }

    Ok(distribution)
}

pub fn rank_instructors(
    distribution: &[InstructorGrades],
    min_grades: usize,
    order: RankOrder,
    limit: usize,
) -> Vec<InstructorGrades> {
    let mut ranked: Vec<InstructorGrades> = distribution
        .iter()
        .filter(|i| i.n >= min_grades)
        .cloned()
        .collect();

    ranked.sort_by(|a, b| {
        let by_a = match order {
            RankOrder::FewestA => a.prop_a.partial_cmp(&b.prop_a),
            RankOrder::MostA => b.prop_a.partial_cmp(&a.prop_a),
        };
        by_a.unwrap_or(Ordering::Equal).then_with(|| a.fid.cmp(&b.fid))
    });
    ranked.truncate(limit);
    ranked
}

/// Graduation rate among former students, grouped by first-term GPA bin.
///
/// All four bins are listed; students without a first-term GPA are not counted.
pub fn graduation_by_first_term_bin(
    dataset: &Dataset,
    cohorts: &Cohorts,
    first_term: &GpaTable,
) -> Result<Vec<BinGraduation>> {
    let mut tallies: BTreeMap<GpaBin, (usize, usize)> =
        GpaBin::ALL.iter().map(|bin| (*bin, (0, 0))).collect();

    for sid in &cohorts.former {
        let Some(Some(gpa)) = first_term.get(sid) else {
            continue;
        };
        let entry = tallies.entry(gpa_bin(*gpa)?).or_insert((0, 0));
        entry.1 += 1;
        if dataset.alumni.contains(sid) {
            entry.0 += 1;
        }
    }

    Ok(tallies
        .into_iter()
        .map(|(gpa_bin, (n_alumni, n_former))| BinGraduation {
            gpa_bin,
            n_alumni,
            n_former,
            grad_rate: ratio(n_alumni, n_former, 4),
        })
        .collect())
}

fn ratio(numerator: usize, denominator: usize, places: i32) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(round_to(numerator as f64 / denominator as f64, places))
    }
}

fn by_prop_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn by_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
