use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub type StudentId = i64;
pub type FacultyId = i64;

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptedRow {
    pub acc_term_id: String,
    pub sid: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub major: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusRow {
    pub sid: StudentId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseRow {
    pub dept: String,
    pub course: String,
    pub prereq: Option<String>,
    pub credits: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacultyRow {
    pub fid: FacultyId,
    pub first_name: String,
    pub last_name: String,
    pub dept: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeRow {
    pub term_id: String,
    pub course: String,
    pub sid: StudentId,
    pub fid: FacultyId,
    pub grade: String,
}

#[derive(Debug, Clone)]
pub struct Course {
    pub dept: String,
    pub course: String,
    pub prereq: Option<String>,
    pub credits: f64,
}

/// Letter grades; anything else in the grades table is an error, never a blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn points(self) -> f64 {
        match self {
            Grade::A => 4.0,
            Grade::B => 3.0,
            Grade::C => 2.0,
            Grade::D => 1.0,
            Grade::F => 0.0,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Grade::A => 0,
            Grade::B => 1,
            Grade::C => 2,
            Grade::D => 3,
            Grade::F => 4,
        }
    }
}

impl FromStr for Grade {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            other => Err(AnalysisError::UnknownGrade(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Alumni,
    Unretained,
    Expelled,
}

impl TerminalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Alumni => "alumni",
            TerminalStatus::Unretained => "unretained",
            TerminalStatus::Expelled => "expelled",
        }
    }
}

/// The four first-term GPA ranges; the last one is closed so 4.0 lands in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GpaBin {
    #[serde(rename = "[0,1)")]
    ZeroToOne,
    #[serde(rename = "[1,2)")]
    OneToTwo,
    #[serde(rename = "[2,3)")]
    TwoToThree,
    #[serde(rename = "[3,4]")]
    ThreeToFour,
}

impl GpaBin {
    pub const ALL: [GpaBin; 4] = [
        GpaBin::ZeroToOne,
        GpaBin::OneToTwo,
        GpaBin::TwoToThree,
        GpaBin::ThreeToFour,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GpaBin::ZeroToOne => "[0,1)",
            GpaBin::OneToTwo => "[1,2)",
            GpaBin::TwoToThree => "[2,3)",
            GpaBin::ThreeToFour => "[3,4]",
        }
    }
}

impl fmt::Display for GpaBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusCounts {
    pub accepted: usize,
    pub enrolled: usize,
    pub current: usize,
    pub former: usize,
    pub unretained: usize,
    pub expelled: usize,
    pub alumni: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MajorShare {
    pub major: String,
    pub n_students: usize,
    pub prop: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepartmentShare {
    pub dept: String,
    pub n_students: usize,
    pub prop: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MajorGraduation {
    pub major: String,
    pub n_alumni: usize,
    pub n_former: usize,
    pub grad_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TermsToGraduation {
    pub n_terms: usize,
    pub n_alumni: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentGpa {
    pub sid: StudentId,
    pub first_name: String,
    pub last_name: String,
    pub major: String,
    pub gpa: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentGpaReport {
    pub students: Vec<StudentGpa>,
    pub perfect_count: usize,
    pub distribution: Vec<HistogramBucket>,
}

impl CurrentGpaReport {
    /// Defined GPA values, in report order, for callers rendering their own histogram.
    pub fn gpa_values(&self) -> Vec<f64> {
        self.students.iter().filter_map(|s| s.gpa).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstructorGrades {
    pub fid: FacultyId,
    pub first_name: String,
    pub last_name: String,
    pub dept: String,
    #[serde(rename = "N")]
    pub n: usize,
    pub counts: [usize; 5],
    #[serde(rename = "propA")]
    pub prop_a: f64,
    #[serde(rename = "propB")]
    pub prop_b: f64,
    #[serde(rename = "propC")]
    pub prop_c: f64,
    #[serde(rename = "propD")]
    pub prop_d: f64,
    #[serde(rename = "propF")]
    pub prop_f: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FirstTermGpa {
    pub sid: StudentId,
    pub first_term_gpa: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinGraduation {
    pub gpa_bin: GpaBin,
    pub n_alumni: usize,
    pub n_former: usize,
    pub grad_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_points_follow_letter_scale() {
        let letters = [Grade::A, Grade::B, Grade::C, Grade::D, Grade::F];
        let points: Vec<f64> = letters.iter().map(|g| g.points()).collect();
        assert_eq!(points, vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn unknown_letters_are_rejected() {
        assert!(matches!(
            "E".parse::<Grade>(),
            Err(AnalysisError::UnknownGrade(letter)) if letter == "E"
        ));
        assert!("a".parse::<Grade>().is_err());
        assert!("".parse::<Grade>().is_err());
        assert_eq!(" B ".parse::<Grade>().unwrap(), Grade::B);
    }

    #[test]
    fn bin_labels_serialize_as_ranges() {
        let json = serde_json::to_string(&GpaBin::ThreeToFour).unwrap();
        assert_eq!(json, "\"[3,4]\"");
        assert_eq!(GpaBin::ZeroToOne.to_string(), "[0,1)");
    }
}
