use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::models::{
    AcceptedRow, Course, CourseRow, FacultyId, FacultyRow, GradeRow, StatusRow, StudentId,
};

/// The seven base tables of one run, keyed for lookup and never mutated after loading.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub students: BTreeMap<StudentId, AcceptedRow>,
    pub courses: HashMap<String, Course>,
    pub faculty: HashMap<FacultyId, FacultyRow>,
    pub grades: Vec<GradeRow>,
    pub alumni: BTreeSet<StudentId>,
    pub expelled: BTreeSet<StudentId>,
    pub unretained: BTreeSet<StudentId>,
}

#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub accepted: Vec<AcceptedRow>,
    pub alumni: Vec<StatusRow>,
    pub courses: Vec<CourseRow>,
    pub expelled: Vec<StatusRow>,
    pub faculty: Vec<FacultyRow>,
    pub grades: Vec<GradeRow>,
    pub unretained: Vec<StatusRow>,
}

impl Dataset {
    pub fn from_tables(tables: RawTables) -> Result<Self> {
        let mut students = BTreeMap::new();
        for row in tables.accepted {
            let sid = row.sid;
            if students.insert(sid, row).is_some() {
                return Err(AnalysisError::DuplicateStudent(sid));
            }
        }

        let mut courses = HashMap::new();
        for row in tables.courses {
            let course = parse_course(row)?;
            let code = course.course.clone();
            if courses.insert(code.clone(), course).is_some() {
                return Err(AnalysisError::DuplicateCourse(code));
            }
        }

        let faculty = tables.faculty.into_iter().map(|f| (f.fid, f)).collect();

        Ok(Self {
            students,
            courses,
            faculty,
            grades: tables.grades,
            alumni: status_set(tables.alumni),
            expelled: status_set(tables.expelled),
            unretained: status_set(tables.unretained),
        })
    }

    pub fn table_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("accepted", self.students.len()),
            ("alumni", self.alumni.len()),
            ("courses", self.courses.len()),
            ("expelled", self.expelled.len()),
            ("faculty", self.faculty.len()),
            ("grades", self.grades.len()),
            ("unretained", self.unretained.len()),
        ]
    }
}

fn status_set(rows: Vec<StatusRow>) -> BTreeSet<StudentId> {
    rows.into_iter().map(|row| row.sid).collect()
}

fn parse_course(row: CourseRow) -> Result<Course> {
    let credits: f64 = row
        .credits
        .trim()
        .parse()
        .map_err(|_| AnalysisError::InvalidCredits {
            course: row.course.clone(),
            value: row.credits.clone(),
        })?;

    if !credits.is_finite() || credits < 0.0 {
        return Err(AnalysisError::InvalidCredits {
            course: row.course,
            value: row.credits,
        });
    }

    let prereq = row.prereq.filter(|p| !p.trim().is_empty());

    Ok(Course {
        dept: row.dept,
        course: row.course,
        prereq,
        credits,
    })
}

pub fn load_dataset(data_dir: &Path) -> anyhow::Result<Dataset> {
    info!(data_dir = %data_dir.display(), "Loading student records");

    let tables = RawTables {
        accepted: read_table(data_dir, "accepted")?,
        alumni: read_table(data_dir, "alumni")?,
        courses: read_table(data_dir, "courses")?,
        expelled: read_table(data_dir, "expelled")?,
        faculty: read_table(data_dir, "faculty")?,
        grades: read_table(data_dir, "grades")?,
        unretained: read_table(data_dir, "unretained")?,
    };

    let dataset = Dataset::from_tables(tables).context("base tables are inconsistent")?;
    for (table, records) in dataset.table_counts() {
        info!(table, records, "Table loaded");
    }

    Ok(dataset)
}

fn read_table<T: DeserializeOwned>(data_dir: &Path, name: &str) -> anyhow::Result<Vec<T>> {
    let path = data_dir.join(format!("{name}.csv"));
    debug!(path = %path.display(), "Reading table");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        let row = result.with_context(|| format!("malformed row in {}", path.display()))?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_tables(dir: &Path) {
        let files = [
            (
                "accepted",
                "acc_term_id,sid,first_name,last_name,major\n2020A,1,Avery,Lee,CS\n2020B,2,Jules,Moreno,Math\n",
            ),
            ("alumni", "sid\n1\n"),
            (
                "courses",
                "dept,course,prereq,credits\nCS,CS101,,3\nMATH,MAT120,MAT110,4\n",
            ),
            ("expelled", "sid\n"),
            ("faculty", "fid,first_name,last_name,dept\n10,Kiara,Patel,CS\n"),
            (
                "grades",
                "term_id,course,sid,fid,grade\n2020A,CS101,1,10,A\n2020B,MAT120,2,10,B\n",
            ),
            ("unretained", "sid\n2\n"),
        ];

        for (name, content) in files {
            fs::write(dir.join(format!("{name}.csv")), content).unwrap();
        }
    }

    #[test]
    fn loads_all_seven_tables() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());

        let dataset = load_dataset(dir.path()).unwrap();

        assert_eq!(dataset.students.len(), 2);
        assert_eq!(dataset.grades.len(), 2);
        assert!(dataset.alumni.contains(&1));
        assert!(dataset.unretained.contains(&2));
        assert!(dataset.expelled.is_empty());

        let cs101 = &dataset.courses["CS101"];
        assert_eq!(cs101.credits, 3.0);
        assert!(cs101.prereq.is_none());
        assert_eq!(dataset.courses["MAT120"].prereq.as_deref(), Some("MAT110"));
    }

    #[test]
    fn missing_table_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());
        fs::remove_file(dir.path().join("faculty.csv")).unwrap();

        let err = load_dataset(dir.path()).unwrap_err();
        assert!(err.to_string().contains("faculty.csv"));
    }

    #[test]
    fn table_counts_follow_table_order() {
        let dir = tempfile::tempdir().unwrap();
        write_tables(dir.path());

        let dataset = load_dataset(dir.path()).unwrap();
        let names: Vec<&str> = dataset.table_counts().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec!["accepted", "alumni", "courses", "expelled", "faculty", "grades", "unretained"]
        );
    }

    #[test]
    fn credits_must_be_numeric() {
        let tables = RawTables {
            courses: vec![CourseRow {
                dept: "CS".to_string(),
                course: "CS101".to_string(),
                prereq: None,
                credits: "three".to_string(),
            }],
            ..Default::default()
        };

        assert!(matches!(
            Dataset::from_tables(tables),
            Err(AnalysisError::InvalidCredits { course, .. }) if course == "CS101"
        ));
    }

    #[test]
    fn duplicate_students_are_rejected() {
        let row = AcceptedRow {
            acc_term_id: "2020A".to_string(),
            sid: 4,
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            major: "CS".to_string(),
        };
        let tables = RawTables {
            accepted: vec![row.clone(), row],
            ..Default::default()
        };

        assert!(matches!(
            Dataset::from_tables(tables),
            Err(AnalysisError::DuplicateStudent(4))
        ));
    }
}
