use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semester identifier as issued by the result service (e.g. `221` for Spring 2022).
///
/// Ordering is chronological: ids that parse as integers compare numerically and
/// sort before any non-numeric id, which fall back to lexicographic order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemesterId(String);

impl SemesterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn numeric(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl Ord for SemesterId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SemesterId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SemesterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Term {
    Spring,
    Summer,
    Fall,
}

impl Term {
    /// Finds a term name anywhere in `text`, case-insensitively.
    pub fn parse(text: &str) -> Option<Term> {
        let lower = text.to_ascii_lowercase();
        if lower.contains("spring") {
            Some(Term::Spring)
        } else if lower.contains("summer") {
            Some(Term::Summer)
        } else if lower.contains("fall") || lower.contains("autumn") {
            Some(Term::Fall)
        } else {
            None
        }
    }

    /// Term digit used as the last character of service semester ids.
    pub fn from_code(code: char) -> Option<Term> {
        match code {
            '1' => Some(Term::Spring),
            '2' => Some(Term::Summer),
            '3' => Some(Term::Fall),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Term::Spring => "Spring",
            Term::Summer => "Summer",
            Term::Fall => "Fall",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterDescriptor {
    pub id: SemesterId,
    pub name: String,
    pub year: i32,
    pub term: Option<Term>,
}

/// Letter grades on the four-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
    #[serde(rename = "I")]
    Incomplete,
}

/// Point thresholds, highest first. `from_point` walks this table.
const POINT_TABLE: [(Grade, f64); 10] = [
    (Grade::APlus, 4.00),
    (Grade::A, 3.75),
    (Grade::AMinus, 3.50),
    (Grade::BPlus, 3.25),
    (Grade::B, 3.00),
    (Grade::BMinus, 2.75),
    (Grade::CPlus, 2.50),
    (Grade::C, 2.25),
    (Grade::D, 2.00),
    (Grade::F, 0.00),
];

impl Grade {
    pub fn parse(text: &str) -> Option<Grade> {
        let grade = match text.trim().to_ascii_uppercase().as_str() {
            "A+" => Grade::APlus,
            "A" => Grade::A,
            "A-" => Grade::AMinus,
            "B+" => Grade::BPlus,
            "B" => Grade::B,
            "B-" => Grade::BMinus,
            "C+" => Grade::CPlus,
            "C" => Grade::C,
            "D" => Grade::D,
            "F" => Grade::F,
            "I" => Grade::Incomplete,
            _ => return None,
        };
        Some(grade)
    }

    pub fn letter(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::Incomplete => "I",
        }
    }

    pub fn point(&self) -> f64 {
        POINT_TABLE
            .iter()
            .find(|(grade, _)| grade == self)
            .map(|(_, point)| *point)
            .unwrap_or(0.0)
    }

    /// Nearest letter at or below `point`.
    pub fn from_point(point: f64) -> Grade {
        POINT_TABLE
            .iter()
            .find(|(_, threshold)| point >= *threshold)
            .map(|(grade, _)| *grade)
            .unwrap_or(Grade::F)
    }

    /// F and I still weigh into averages but are left out of displayed credits.
    pub fn excluded_from_display(&self) -> bool {
        matches!(self, Grade::F | Grade::Incomplete)
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub course_code: Option<String>,
    /// Service-side id, used to group retakes when the code is missing.
    pub course_id: Option<String>,
    pub course_name: String,
    pub credit: Option<f64>,
    #[serde(rename = "gradeLetter")]
    pub grade: Option<Grade>,
    pub grade_point: Option<f64>,
    pub semester_id: SemesterId,
    pub is_retake: bool,
    pub is_best_attempt: bool,
    pub retake_count: u32,
}

impl CourseRecord {
    pub fn new(
        course_code: Option<&str>,
        course_name: &str,
        credit: Option<f64>,
        grade: Option<Grade>,
        grade_point: Option<f64>,
        semester_id: SemesterId,
    ) -> Self {
        Self {
            course_code: course_code.map(str::to_string),
            course_id: None,
            course_name: course_name.to_string(),
            credit,
            grade,
            grade_point,
            semester_id,
            is_retake: false,
            is_best_attempt: false,
            retake_count: 0,
        }
    }

    /// Credit and grade point, if both are present and finite.
    pub fn scored(&self) -> Option<(f64, f64)> {
        match (self.credit, self.grade_point) {
            (Some(credit), Some(point)) if credit.is_finite() && point.is_finite() => {
                Some((credit, point))
            }
            _ => None,
        }
    }

    /// Grouping key for retake detection: normalized code, else the service id.
    pub fn retake_key(&self) -> Option<String> {
        let normalize = |raw: &str| -> Option<String> {
            let key: String = raw
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .map(|c| c.to_ascii_uppercase())
                .collect();
            (!key.is_empty()).then_some(key)
        };

        self.course_code
            .as_deref()
            .and_then(normalize)
            .or_else(|| {
                self.course_id
                    .as_deref()
                    .and_then(normalize)
                    .map(|id| format!("#{id}"))
            })
    }

    pub fn display_code(&self) -> &str {
        self.course_code
            .as_deref()
            .or(self.course_id.as_deref())
            .unwrap_or("-")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingSemester {
    pub id: SemesterId,
    pub name: String,
}

/// Course lists keyed by semester, with the gap advisory kept beside them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterResults {
    pub semesters: BTreeMap<SemesterId, Vec<CourseRecord>>,
    pub missing_semesters: Vec<MissingSemester>,
}

impl SemesterResults {
    pub fn insert(&mut self, id: SemesterId, courses: Vec<CourseRecord>) {
        self.semesters.insert(id, courses);
    }
}

/// Weighted average with both credit totals. Used for semester GPA and CGPA alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaSummary {
    pub value: f64,
    pub total_credits_display: f64,
    pub total_credits_calculated: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub program_name: Option<String>,
    #[serde(default)]
    pub department_name: Option<String>,
    #[serde(default)]
    pub campus_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSummary {
    pub id: SemesterId,
    pub name: String,
    pub gpa: GpaSummary,
    pub course_count: usize,
    pub stated_sgpa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetakeSummary {
    pub course_code: String,
    pub course_name: String,
    /// Attempts best-first.
    pub attempts: Vec<CourseRecord>,
}

/// Everything the presentation layer needs for one student.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student_id: String,
    pub student_info: Option<StudentInfo>,
    pub semester_results_by_semester_id: BTreeMap<SemesterId, Vec<CourseRecord>>,
    pub semesters: Vec<SemesterSummary>,
    pub missing_semesters: Vec<MissingSemester>,
    pub cgpa: f64,
    pub total_credits_display: f64,
    pub total_credits_calculated: f64,
    pub retakes: Vec<RetakeSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_order_numerically() {
        let mut ids: Vec<SemesterId> = ["99", "100", "2", "abc"]
            .iter()
            .map(|id| SemesterId::new(*id))
            .collect();
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(SemesterId::as_str).collect();
        assert_eq!(ordered, vec!["2", "99", "100", "abc"]);
    }

    #[test]
    fn grade_points_follow_table() {
        assert_eq!(Grade::APlus.point(), 4.0);
        assert_eq!(Grade::A.point(), 3.75);
        assert_eq!(Grade::D.point(), 2.0);
        assert_eq!(Grade::F.point(), 0.0);
        assert_eq!(Grade::Incomplete.point(), 0.0);
    }

    #[test]
    fn point_maps_to_letter_at_or_below() {
        assert_eq!(Grade::from_point(4.0), Grade::APlus);
        assert_eq!(Grade::from_point(3.8), Grade::A);
        assert_eq!(Grade::from_point(3.49), Grade::BPlus);
        assert_eq!(Grade::from_point(2.1), Grade::D);
        assert_eq!(Grade::from_point(1.5), Grade::F);
    }

    #[test]
    fn grade_parse_is_case_insensitive() {
        assert_eq!(Grade::parse(" a+ "), Some(Grade::APlus));
        assert_eq!(Grade::parse("b-"), Some(Grade::BMinus));
        assert_eq!(Grade::parse("E"), None);
    }

    #[test]
    fn retake_key_prefers_code_then_id() {
        let mut course = CourseRecord::new(
            Some("cse 101"),
            "Intro",
            Some(3.0),
            Some(Grade::A),
            Some(3.75),
            SemesterId::new("221"),
        );
        assert_eq!(course.retake_key().as_deref(), Some("CSE101"));

        course.course_code = None;
        assert_eq!(course.retake_key(), None);

        course.course_id = Some("5521".to_string());
        assert_eq!(course.retake_key().as_deref(), Some("#5521"));
    }

    #[test]
    fn scored_rejects_nan() {
        let course = CourseRecord::new(
            Some("MAT101"),
            "Math",
            Some(f64::NAN),
            Some(Grade::B),
            Some(3.0),
            SemesterId::new("221"),
        );
        assert!(course.scored().is_none());
    }

    #[test]
    fn term_codes_map_to_terms() {
        assert_eq!(Term::from_code('1'), Some(Term::Spring));
        assert_eq!(Term::from_code('3'), Some(Term::Fall));
        assert_eq!(Term::parse("Result of Summer, 2023"), Some(Term::Summer));
    }
}
