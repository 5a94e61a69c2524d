//! Parser for transcript tables pasted from the student portal.
//!
//! Input is loose text: tab- or space-aligned columns, semester banners,
//! repeated column headers and SGPA footers. Lines that cannot be read as a
//! course are dropped and counted, never fatal.

use regex::Regex;
use serde::Serialize;

use crate::cgpa;
use crate::error::Result;
use crate::models::{CourseRecord, Grade, SemesterDescriptor, SemesterId, Term};

const DEFAULT_SEMESTER_NAME: &str = "Manual Entry";
const MAX_CREDIT: f64 = 6.0;
const SGPA_TOLERANCE: f64 = 0.01;

/// What a single line of pasted text turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    SemesterHeader { term: Term, year: i32 },
    ColumnHeader,
    Divider,
    Course(CourseRecord),
    Summary { sgpa: Option<f64>, credits: Option<f64> },
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSemester {
    pub descriptor: SemesterDescriptor,
    pub courses: Vec<CourseRecord>,
    pub stated_sgpa: Option<f64>,
    pub stated_credits: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SgpaDiscrepancy {
    pub semester_id: SemesterId,
    pub stated: f64,
    pub computed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub semesters: Vec<ParsedSemester>,
    pub accepted: usize,
    pub rejected: usize,
    pub discrepancies: Vec<SgpaDiscrepancy>,
}

/// Compiled patterns for transcript text. Build once, reuse for every paste.
#[derive(Debug, Clone)]
pub struct TranscriptParser {
    result_of_header: Regex,
    term_year_header: Regex,
    wide_gap: Regex,
    course_fallback: Regex,
    sgpa: Regex,
    total_credits: Regex,
}

impl TranscriptParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            result_of_header: Regex::new(r"(?i)result\s+of\s+(spring|summer|fall)\s*[,\-]?\s*(\d{4})")?,
            term_year_header: Regex::new(
                r"(?i)^\s*(?:semester\s*:?\s*)?(spring|summer|fall)\b[^\t\d]{0,30}?((?:19|20)\d{2})\b",
            )?,
            wide_gap: Regex::new(r"\s{2,}")?,
            course_fallback: Regex::new(
                r"(?i)^\s*(?:(\d{1,3})[.)]?\s+)?([A-Z]{2,}[\s\-]?\d{2,4}[A-Z]?)\s+(.+?)\s+(\d+(?:\.\d+)?)\s+(A\+|A-|A|B\+|B-|B|C\+|C|D|F|I)(?:\s+(\d+(?:\.\d+)?))?\s*$",
            )?,
            sgpa: Regex::new(r"(?i)\bs?gpa\b[^\d]{0,5}(\d+(?:\.\d+)?)")?,
            total_credits: Regex::new(r"(?i)total\s+credits?[^\d]{0,5}(\d+(?:\.\d+)?)")?,
        })
    }

    /// Parses a whole paste into semester groups.
    ///
    /// Semesters get sequential ids (`1`, `2`, ...) in order of appearance.
    /// Courses found before any banner, or in a paste with no banners at all,
    /// land in a default "Manual Entry" semester.
    pub fn parse(&self, text: &str) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut current = new_semester(1, None);

        for line in text.lines() {
            match self.classify_line(line, &current.descriptor.id) {
                LineKind::SemesterHeader { term, year } => {
                    let next_id = if current.courses.is_empty() {
                        outcome.semesters.len() + 1
                    } else {
                        outcome.semesters.len() + 2
                    };
                    let next = new_semester(next_id, Some((term, year)));
                    let previous = std::mem::replace(&mut current, next);
                    flush(&mut outcome, previous);
                }
                LineKind::Course(course) => {
                    outcome.accepted += 1;
                    current.courses.push(course);
                }
                LineKind::Summary { sgpa, credits } => {
                    current.stated_sgpa = sgpa.or(current.stated_sgpa);
                    current.stated_credits = credits.or(current.stated_credits);
                }
                LineKind::Rejected => {
                    tracing::debug!(line = line.trim(), "Skipping unrecognized line");
                    outcome.rejected += 1;
                }
                LineKind::ColumnHeader | LineKind::Divider => {}
            }
        }
        flush(&mut outcome, current);

        if outcome.rejected > 0 {
            tracing::info!(
                accepted = outcome.accepted,
                rejected = outcome.rejected,
                "Some transcript lines could not be read as courses"
            );
        }
        outcome
    }

    pub fn classify_line(&self, line: &str, semester: &SemesterId) -> LineKind {
        let trimmed = line.trim();

        if let Some((term, year)) = self.semester_header(trimmed) {
            return LineKind::SemesterHeader { term, year };
        }
        if is_column_header(trimmed) {
            return LineKind::ColumnHeader;
        }
        if is_divider(trimmed) {
            return LineKind::Divider;
        }
        if let Some(course) = self.parse_course_line(line, semester) {
            return LineKind::Course(course);
        }
        if let Some((sgpa, credits)) = self.summary(trimmed) {
            return LineKind::Summary { sgpa, credits };
        }
        LineKind::Rejected
    }

    /// Reads one course row, or `None` if the row fails any acceptance rule.
    pub fn parse_course_line(&self, line: &str, semester: &SemesterId) -> Option<CourseRecord> {
        let has_letter = line.chars().any(|c| c.is_ascii_alphabetic());
        let has_digit = line.chars().any(|c| c.is_ascii_digit());
        if !has_letter || !has_digit {
            return None;
        }

        let mut fields = self.split_fields(line)?;

        // A leading number is a serial only in 5- or 6-column rows
        if matches!(fields.len(), 5 | 6) && fields[0].chars().all(|c| c.is_ascii_digit()) {
            fields.remove(0);
        }

        let code = fields.first()?.clone();
        if code.len() < 2 || !code.chars().any(|c| c.is_ascii_alphabetic()) {
            return None;
        }

        let rest = &fields[1..];
        let (title_end, credit, grade, point) = read_tail(rest)?;

        if !(credit > 0.0 && credit <= MAX_CREDIT) {
            return None;
        }
        if let Some(point) = point {
            if !(0.0..=4.0).contains(&point) {
                return None;
            }
        }

        let title = rest[..title_end].join(" ");
        let title = if title.is_empty() { code.clone() } else { title };

        Some(CourseRecord::new(
            Some(&code),
            &title,
            Some(credit),
            Some(grade),
            Some(point.unwrap_or_else(|| grade.point())),
            semester.clone(),
        ))
    }

    /// Tabs, then runs of two or more spaces, then the anchored pattern.
    fn split_fields(&self, line: &str) -> Option<Vec<String>> {
        let collect = |parts: Vec<&str>| -> Vec<String> {
            parts
                .into_iter()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        };

        if line.contains('\t') {
            let fields = collect(line.split('\t').collect());
            if fields.len() >= 4 {
                return Some(fields);
            }
        }

        let fields = collect(self.wide_gap.split(line.trim()).collect());
        if fields.len() >= 4 {
            return Some(fields);
        }

        let caps = self.course_fallback.captures(line)?;
        let fields: Vec<String> = (1..=6)
            .filter_map(|i| caps.get(i))
            .map(|m| m.as_str().trim().to_string())
            .collect();
        (fields.len() >= 4).then_some(fields)
    }

    fn semester_header(&self, line: &str) -> Option<(Term, i32)> {
        let caps = self
            .result_of_header
            .captures(line)
            .or_else(|| self.term_year_header.captures(line))?;
        let term = Term::parse(caps.get(1)?.as_str())?;
        let year = caps.get(2)?.as_str().parse().ok()?;
        Some((term, year))
    }

    fn summary(&self, line: &str) -> Option<(Option<f64>, Option<f64>)> {
        let lower = line.to_ascii_lowercase();
        if !lower.contains("gpa") && !lower.contains("total") {
            return None;
        }

        let capture = |re: &Regex| -> Option<f64> {
            re.captures(line)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        };

        let sgpa = capture(&self.sgpa).filter(|value| (0.0..=4.0).contains(value));
        let credits = capture(&self.total_credits);
        if sgpa.is_none() && credits.is_none() {
            return None;
        }
        Some((sgpa, credits))
    }
}

/// Finds credit, grade and optional point at the end of a row.
/// Returns the index where the title stops.
fn read_tail(rest: &[String]) -> Option<(usize, f64, Grade, Option<f64>)> {
    let number = |s: &String| s.parse::<f64>().ok().filter(|v| v.is_finite());

    if let [.., credit, grade, point] = rest {
        if let (Some(credit), Some(grade), Some(point)) = (number(credit), Grade::parse(grade), number(point)) {
            return Some((rest.len() - 3, credit, grade, Some(point)));
        }
    }
    if let [.., credit, grade] = rest {
        if let (Some(credit), Some(grade)) = (number(credit), Grade::parse(grade)) {
            return Some((rest.len() - 2, credit, grade, None));
        }
    }
    None
}

fn is_column_header(line: &str) -> bool {
    if line.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = line.to_ascii_lowercase();
    let course_columns =
        lower.contains("course") && (lower.contains("title") || lower.contains("code") || lower.contains("name"));
    let grade_columns = lower.contains("credit") && lower.contains("grade");
    course_columns || grade_columns
}

fn is_divider(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '=' | '_' | '*' | '|' | '+' | '~' | '.') || c.is_whitespace())
}

fn new_semester(index: usize, header: Option<(Term, i32)>) -> ParsedSemester {
    let (name, year, term) = match header {
        Some((term, year)) => (format!("{term} {year}"), year, Some(term)),
        None => (DEFAULT_SEMESTER_NAME.to_string(), 0, None),
    };
    ParsedSemester {
        descriptor: SemesterDescriptor {
            id: SemesterId::new(index.to_string()),
            name,
            year,
            term,
        },
        courses: Vec::new(),
        stated_sgpa: None,
        stated_credits: None,
    }
}

fn flush(outcome: &mut ParseOutcome, semester: ParsedSemester) {
    if semester.courses.is_empty() {
        return;
    }

    if let Some(stated) = semester.stated_sgpa {
        let computed = cgpa::semester_gpa(&semester.courses).value;
        if (computed - stated).abs() > SGPA_TOLERANCE {
            tracing::warn!(
                semester = %semester.descriptor.name,
                stated,
                computed,
                "Stated SGPA differs from computed value"
            );
            outcome.discrepancies.push(SgpaDiscrepancy {
                semester_id: semester.descriptor.id.clone(),
                stated,
                computed,
            });
        }
    }

    outcome.semesters.push(semester);
}
