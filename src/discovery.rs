use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::models::{CourseRecord, MissingSemester, SemesterDescriptor, SemesterId, SemesterResults};

/// Supplies one semester's course list for a student.
///
/// Implementations never fail: any fetch problem comes back as an empty list,
/// indistinguishable from a semester with no recorded results.
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn fetch_semester_results(
        &self,
        semester: &SemesterId,
        student_id: &str,
    ) -> Vec<CourseRecord>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryOrder {
    /// Oldest first, starting at the enrollment semester encoded in the student id
    AscendingFromEnrollment,
    /// Newest first over the whole catalog
    DescendingLegacy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOutcome {
    pub results: SemesterResults,
    pub order: DiscoveryOrder,
    /// Semesters actually queried, in query order
    pub visited: Vec<SemesterId>,
    /// The empty run that ended discovery, if it reached the limit
    pub terminal_empty_run: Vec<SemesterId>,
}

/// Per-run bookkeeping. Created fresh inside every `discover` call.
#[derive(Debug, Default)]
struct EmptyRun {
    current: Vec<SemesterId>,
}

impl EmptyRun {
    fn record_empty(&mut self, id: SemesterId) -> usize {
        self.current.push(id);
        self.current.len()
    }

    fn reset(&mut self) {
        self.current.clear();
    }
}

/// Enrollment semester from the leading segment of an id like `221-15-4567`.
pub fn enrollment_semester(student_id: &str, catalog: &[SemesterDescriptor]) -> Option<SemesterId> {
    let prefix = student_id.trim().split('-').next()?;
    if prefix.len() != 3 || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    catalog
        .iter()
        .find(|semester| semester.id.as_str() == prefix)
        .map(|semester| semester.id.clone())
}

/// Semesters to visit, in visiting order.
pub fn processing_order<'a>(
    student_id: &str,
    catalog: &'a [SemesterDescriptor],
) -> (DiscoveryOrder, Vec<&'a SemesterDescriptor>) {
    let mut sorted: Vec<&SemesterDescriptor> = catalog.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    match enrollment_semester(student_id, catalog) {
        Some(start) => {
            let order = sorted.into_iter().filter(|s| s.id >= start).collect();
            (DiscoveryOrder::AscendingFromEnrollment, order)
        }
        None => {
            tracing::debug!(student_id, "No enrollment prefix match, walking catalog newest first");
            sorted.reverse();
            (DiscoveryOrder::DescendingLegacy, sorted)
        }
    }
}

/// Queries semesters one at a time until `empty_run_limit` consecutive
/// semesters come back empty, then flags gaps among the semesters that had results.
pub async fn discover(
    source: &dyn ResultSource,
    student_id: &str,
    catalog: &[SemesterDescriptor],
    empty_run_limit: usize,
) -> DiscoveryOutcome {
    let (order, semesters) = processing_order(student_id, catalog);
    let mut results = SemesterResults::default();
    let mut visited = Vec::new();
    let mut empty_run = EmptyRun::default();
    let mut terminal_empty_run = Vec::new();

    for semester in semesters {
        visited.push(semester.id.clone());
        let courses = source.fetch_semester_results(&semester.id, student_id).await;

        if courses.is_empty() {
            let run = empty_run.record_empty(semester.id.clone());
            tracing::debug!(semester = %semester.id, consecutive_empty = run, "No results");
            if run >= empty_run_limit {
                tracing::info!(
                    student_id,
                    semester = %semester.id,
                    "Stopping discovery after {} empty semesters in a row",
                    run
                );
                terminal_empty_run = std::mem::take(&mut empty_run.current);
                break;
            }
        } else {
            tracing::debug!(semester = %semester.id, courses = courses.len(), "Loaded results");
            empty_run.reset();
            results.insert(semester.id.clone(), courses);
        }
    }

    let valid: Vec<SemesterId> = results.semesters.keys().cloned().collect();
    results.missing_semesters = detect_gaps(&valid, &terminal_empty_run, catalog);
    if !results.missing_semesters.is_empty() {
        tracing::warn!(
            student_id,
            missing = results.missing_semesters.len(),
            "Some semesters between loaded results came back empty"
        );
    }

    DiscoveryOutcome {
        results,
        order,
        visited,
        terminal_empty_run,
    }
}

/// Catalog semesters lying strictly between two adjacent valid ids.
///
/// Ids inside the run that ended discovery are treated as beyond enrollment
/// and never reported.
pub fn detect_gaps(
    valid: &[SemesterId],
    terminal_empty_run: &[SemesterId],
    catalog: &[SemesterDescriptor],
) -> Vec<MissingSemester> {
    let mut numeric: Vec<i64> = valid.iter().filter_map(SemesterId::numeric).collect();
    numeric.sort_unstable();
    numeric.dedup();

    let skipped: HashSet<&SemesterId> = terminal_empty_run.iter().collect();
    let mut catalog_sorted: Vec<&SemesterDescriptor> = catalog.iter().collect();
    catalog_sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut missing = Vec::new();
    for pair in numeric.windows(2) {
        let (low, high) = (pair[0], pair[1]);
        if high - low <= 1 {
            continue;
        }
        for semester in &catalog_sorted {
            let Some(id) = semester.id.numeric() else {
                continue;
            };
            if id > low && id < high && !skipped.contains(&semester.id) {
                missing.push(MissingSemester {
                    id: semester.id.clone(),
                    name: semester.name.clone(),
                });
            }
        }
    }
    missing
}
