use std::fmt::Write;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::analysis::{self, RankOrder};
use crate::cohort::{self, Cohorts};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::gpa::{self, TermScope};
use crate::loader::Dataset;
use crate::models::{
    BinGraduation, CurrentGpaReport, DepartmentShare, FirstTermGpa, HistogramBucket,
    InstructorGrades, MajorGraduation, MajorShare, StatusCounts, TermsToGraduation,
};

const BAR_WIDTH: usize = 40;

/// Outcome of one report; a failure is kept so the other reports still run.
#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Ready(T),
    Failed(String),
}

impl<T> Section<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Section::Ready(value) => Some(value),
            Section::Failed(_) => None,
        }
    }
}

pub fn run_section<T>(name: &str, build: impl FnOnce() -> Result<T>) -> Section<T> {
    info!(report = name, "Running report");
    match build() {
        Ok(value) => Section::Ready(value),
        Err(err) => {
            error!(report = name, error = %err, "Report failed");
            Section::Failed(err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportBundle {
    pub generated_at: DateTime<Utc>,
    pub enrollment_term: String,
    pub table_counts: Vec<(&'static str, usize)>,
    pub integrity_warning: Option<String>,
    pub status: StatusCounts,
    pub majors: Vec<MajorShare>,
    pub departments: Section<Vec<DepartmentShare>>,
    pub graduation_by_major: Vec<MajorGraduation>,
    pub terms_to_graduation: Vec<TermsToGraduation>,
    pub current_gpa: Section<CurrentGpaReport>,
    pub instructors_fewest_a: Section<Vec<InstructorGrades>>,
    pub instructors_most_a: Section<Vec<InstructorGrades>>,
    pub first_term_gpa: Section<Vec<FirstTermGpa>>,
    pub graduation_by_first_term_gpa: Section<Vec<BinGraduation>>,
}

impl ReportBundle {
    pub fn failed_sections(&self) -> Vec<&'static str> {
        [
            ("departments", self.departments.ready().is_none()),
            ("current-gpa", self.current_gpa.ready().is_none()),
            ("instructors-fewest-a", self.instructors_fewest_a.ready().is_none()),
            ("instructors-most-a", self.instructors_most_a.ready().is_none()),
            ("first-term-gpa", self.first_term_gpa.ready().is_none()),
            ("first-term-graduation", self.graduation_by_first_term_gpa.ready().is_none()),
        ]
        .into_iter()
        .filter(|(_, failed)| *failed)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Checks the terminal sets, halting only when `strict_integrity` is set.
pub fn check_integrity(dataset: &Dataset, config: &AnalysisConfig) -> anyhow::Result<Option<String>> {
    match cohort::check_disjoint(&dataset.alumni, &dataset.unretained, &dataset.expelled) {
        Ok(()) => Ok(None),
        Err(err) if config.strict_integrity => bail!(err),
        Err(err) => {
            warn!(error = %err, "Terminal status sets overlap; continuing");
            Ok(Some(err.to_string()))
        }
    }
}

pub fn build_bundle(dataset: &Dataset, config: &AnalysisConfig) -> anyhow::Result<ReportBundle> {
    let integrity_warning = check_integrity(dataset, config)?;
    let cohorts = Cohorts::classify(dataset);

    let all_terms = gpa::gpa_by_student(dataset, TermScope::All);
    let first_term = gpa::gpa_by_student(dataset, TermScope::FirstTerm);
    let instructors = analysis::instructor_grade_distribution(dataset);

    let departments = run_section("departments", || {
        analysis::department_enrollment(dataset, &config.enrollment_term)
    });

    let current_gpa = match &all_terms {
        Ok(table) => run_section("current-gpa", || {
            analysis::current_gpa_report(dataset, &cohorts, table, &config.histogram_edges)
        }),
        Err(err) => Section::Failed(err.to_string()),
    };

    let ranking = |order: RankOrder| match &instructors {
        Ok(distribution) => Section::Ready(analysis::rank_instructors(
            distribution,
            config.min_instructor_grades,
            order,
            config.ranking_limit,
        )),
        Err(err) => Section::Failed(err.to_string()),
    };
    if let Err(err) = &instructors {
        error!(report = "instructors", error = %err, "Report failed");
    }

    let (first_term_gpa, graduation_by_first_term_gpa) = match &first_term {
        Ok(table) => (
            Section::Ready(gpa::first_term_rows(table)),
            run_section("first-term-graduation", || {
                analysis::graduation_by_first_term_bin(dataset, &cohorts, table)
            }),
        ),
        Err(err) => {
            error!(report = "first-term", error = %err, "Report failed");
            (
                Section::Failed(err.to_string()),
                Section::Failed(err.to_string()),
            )
        }
    };

    Ok(ReportBundle {
        generated_at: Utc::now(),
        enrollment_term: config.enrollment_term.clone(),
        table_counts: dataset.table_counts(),
        integrity_warning,
        status: analysis::status_counts(dataset, &cohorts),
        majors: analysis::major_distribution(dataset, &cohorts),
        departments,
        graduation_by_major: analysis::graduation_by_major(dataset, &cohorts),
        terms_to_graduation: analysis::terms_to_graduation(dataset),
        current_gpa,
        instructors_fewest_a: ranking(RankOrder::FewestA),
        instructors_most_a: ranking(RankOrder::MostA),
        first_term_gpa,
        graduation_by_first_term_gpa,
    })
}

pub fn build_report(bundle: &ReportBundle, preview_rows: usize) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Records Report");
    let _ = writeln!(output, "Generated {}", bundle.generated_at.format("%Y-%m-%d %H:%M UTC"));

    if let Some(warning) = &bundle.integrity_warning {
        let _ = writeln!(output);
        let _ = writeln!(output, "> Data integrity warning: {warning}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tables");
    for (table, records) in &bundle.table_counts {
        let _ = writeln!(output, "- {table}: {records} records");
    }

    let status = &bundle.status;
    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Count by Status");
    for (label, count) in [
        ("accepted", status.accepted),
        ("enrolled", status.enrolled),
        ("current", status.current),
        ("former", status.former),
        ("unretained", status.unretained),
        ("expelled", status.expelled),
        ("alumni", status.alumni),
    ] {
        let _ = writeln!(output, "- {label}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Students by Major");
    if bundle.majors.is_empty() {
        let _ = writeln!(output, "No current students.");
    }
    for share in &bundle.majors {
        let _ = writeln!(
            output,
            "- {}: {} students ({:.4})",
            share.major, share.n_students, share.prop
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Course Enrollments by Department ({})", bundle.enrollment_term);
    write_section(&mut output, &bundle.departments, |output, shares| {
        if shares.is_empty() {
            let _ = writeln!(output, "No enrollments recorded for this term.");
        }
        for share in shares {
            let _ = writeln!(
                output,
                "- {}: {} enrollments ({:.4})",
                share.dept, share.n_students, share.prop
            );
        }
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Graduation Rates by Major");
    for rate in &bundle.graduation_by_major {
        let _ = writeln!(
            output,
            "- {}: {} of {} former students graduated ({})",
            rate.major,
            rate.n_alumni,
            rate.n_former,
            format_rate(rate.grad_rate)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Terms Required for Graduation");
    if bundle.terms_to_graduation.is_empty() {
        let _ = writeln!(output, "No alumni with grade records.");
    }
    for entry in &bundle.terms_to_graduation {
        let _ = writeln!(output, "- {} terms: {} alumni", entry.n_terms, entry.n_alumni);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Current Student GPA");
    write_section(&mut output, &bundle.current_gpa, |output, report| {
        let _ = writeln!(output, "Perfect 4.0 GPAs: {}", report.perfect_count);
        let _ = writeln!(output);
        let _ = writeln!(output, "Lowest GPAs:");
        for student in report.students.iter().take(preview_rows) {
            let _ = writeln!(
                output,
                "- {} {} ({}, {}): {}",
                student.first_name,
                student.last_name,
                student.sid,
                student.major,
                format_gpa(student.gpa)
            );
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "```");
        output.push_str(&render_histogram(&report.distribution));
        let _ = writeln!(output, "```");
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Instructors Awarding the Fewest A Grades");
    write_section(&mut output, &bundle.instructors_fewest_a, write_instructors);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Instructors Awarding the Most A Grades");
    write_section(&mut output, &bundle.instructors_most_a, write_instructors);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Graduation Rates by First-Term GPA");
    write_section(&mut output, &bundle.graduation_by_first_term_gpa, |output, rates| {
        for rate in rates {
            let _ = writeln!(
                output,
                "- {}: {} of {} former students graduated ({})",
                rate.gpa_bin,
                rate.n_alumni,
                rate.n_former,
                format_rate(rate.grad_rate)
            );
        }
    });

    output
}

fn write_section<T>(output: &mut String, section: &Section<T>, write: impl FnOnce(&mut String, &T)) {
    match section {
        Section::Ready(value) => write(output, value),
        Section::Failed(reason) => {
            let _ = writeln!(output, "Report unavailable: {reason}");
        }
    }
}

fn write_instructors(output: &mut String, instructors: &Vec<InstructorGrades>) {
    if instructors.is_empty() {
        let _ = writeln!(output, "No instructors meet the minimum grade count.");
    }
    for instructor in instructors {
        let _ = writeln!(
            output,
            "- {} {} ({}, {}): N={} A={:.2} B={:.2} C={:.2} D={:.2} F={:.2}",
            instructor.first_name,
            instructor.last_name,
            instructor.fid,
            instructor.dept,
            instructor.n,
            instructor.prop_a,
            instructor.prop_b,
            instructor.prop_c,
            instructor.prop_d,
            instructor.prop_f
        );
    }
}

/// Horizontal bars scaled to the fullest bucket.
pub fn render_histogram(buckets: &[HistogramBucket]) -> String {
    let mut output = String::new();
    let peak = buckets.iter().map(|b| b.count).max().unwrap_or(0);

    for bucket in buckets {
        let width = if peak == 0 {
            0
        } else {
            (bucket.count * BAR_WIDTH).div_ceil(peak)
        };
        let _ = writeln!(
            output,
            "{:>4.2}-{:<4.2} | {:<width$} {}",
            bucket.lower,
            bucket.upper,
            "#".repeat(width),
            bucket.count,
            width = BAR_WIDTH
        );
    }

    output
}

pub fn format_rate(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{r:.4}"))
}

pub fn format_gpa(gpa: Option<f64>) -> String {
    gpa.map_or_else(|| "n/a".to_string(), |g| format!("{g:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::models::{AcceptedRow, Course, FacultyRow, GradeRow};

    fn dataset() -> Dataset {
        let student = AcceptedRow {
            acc_term_id: "2021A".to_string(),
            sid: 1,
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            major: "CS".to_string(),
        };
        let course = Course {
            dept: "CS".to_string(),
            course: "CS101".to_string(),
            prereq: None,
            credits: 3.0,
        };
        let faculty = FacultyRow {
            fid: 10,
            first_name: "Kiara".to_string(),
            last_name: "Patel".to_string(),
            dept: "CS".to_string(),
        };

        Dataset {
            students: [(1, student)].into_iter().collect(),
            courses: [("CS101".to_string(), course)].into_iter().collect(),
            faculty: [(10, faculty)].into_iter().collect(),
            grades: vec![GradeRow {
                term_id: "2021A".to_string(),
                course: "CS101".to_string(),
                sid: 1,
                fid: 10,
                grade: "A".to_string(),
            }],
            ..Default::default()
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            min_instructor_grades: 1,
            ..Default::default()
        }
    }

    #[test]
    fn bundle_runs_every_report() {
        let bundle = build_bundle(&dataset(), &config()).unwrap();

        assert_eq!(bundle.status.current, 1);
        assert_eq!(bundle.majors.len(), 1);
        assert_eq!(bundle.departments.ready().unwrap().len(), 1);
        assert_eq!(bundle.current_gpa.ready().unwrap().perfect_count, 1);
        assert_eq!(bundle.instructors_most_a.ready().unwrap().len(), 1);
        assert_eq!(bundle.first_term_gpa.ready().unwrap()[0].first_term_gpa, Some(4.0));
        assert!(bundle.integrity_warning.is_none());
        assert!(bundle.failed_sections().is_empty());
    }

    #[test]
    fn failed_report_does_not_stop_the_others() {
        let mut data = dataset();
        data.grades[0].grade = "W".to_string();

        let bundle = build_bundle(&data, &config()).unwrap();

        assert!(matches!(bundle.current_gpa, Section::Failed(_)));
        assert!(matches!(bundle.instructors_fewest_a, Section::Failed(_)));
        assert_eq!(
            bundle.failed_sections(),
            vec![
                "current-gpa",
                "instructors-fewest-a",
                "instructors-most-a",
                "first-term-gpa",
                "first-term-graduation"
            ]
        );
        assert!(bundle.departments.ready().is_some());
        assert_eq!(bundle.terms_to_graduation.len(), 0);

        let markdown = build_report(&bundle, 10);
        assert!(markdown.contains("Report unavailable: unknown grade letter \"W\""));
        assert!(markdown.contains("## Course Enrollments by Department (2021A)"));
    }

    #[test]
    fn overlapping_terminal_sets_warn_or_halt() {
        let mut data = dataset();
        data.alumni.insert(1);
        data.expelled.insert(1);

        let bundle = build_bundle(&data, &config()).unwrap();
        assert!(bundle.integrity_warning.unwrap().contains("1 in alumni+expelled"));

        let strict = AnalysisConfig {
            strict_integrity: true,
            ..config()
        };
        let err = build_bundle(&data, &strict).unwrap_err();
        assert!(err.downcast_ref::<AnalysisError>().is_some());
    }

    #[test]
    fn markdown_lists_sections() {
        let bundle = build_bundle(&dataset(), &config()).unwrap();
        let markdown = build_report(&bundle, 10);

        assert!(markdown.starts_with("# Student Records Report"));
        assert!(markdown.contains("- enrolled: 1"));
        assert!(markdown.contains("- CS: 1 students (1.0000)"));
        assert!(markdown.contains("Perfect 4.0 GPAs: 1"));
        assert!(markdown.contains("- [3,4]: 0 of 0 former students graduated (n/a)"));
    }

    #[test]
    fn bundle_serializes_sections_with_status() {
        let bundle = build_bundle(&dataset(), &config()).unwrap();
        let json: serde_json::Value = serde_json::to_value(&bundle).unwrap();

        assert_eq!(json["departments"]["status"], "ready");
        assert_eq!(json["departments"]["data"][0]["dept"], "CS");
        assert_eq!(json["graduation_by_first_term_gpa"]["data"][3]["gpa_bin"], "[3,4]");
    }

    #[test]
    fn histogram_bars_scale_to_peak() {
        let buckets = vec![
            HistogramBucket {
                lower: 0.0,
                upper: 2.0,
                count: 1,
            },
            HistogramBucket {
                lower: 2.0,
                upper: 4.0,
                count: 4,
            },
        ];
        let rendered = render_histogram(&buckets);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].matches('#').count(), BAR_WIDTH / 4);
        assert_eq!(lines[1].matches('#').count(), BAR_WIDTH);
        assert!(lines[1].ends_with(" 4"));
    }

    #[test]
    fn missing_values_render_as_na() {
        assert_eq!(format_rate(None), "n/a");
        assert_eq!(format_rate(Some(0.5)), "0.5000");
        assert_eq!(format_gpa(Some(3.6)), "3.60");
    }
}
