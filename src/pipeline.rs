use std::collections::HashMap;

use anyhow::Context;

use crate::cgpa;
use crate::client::ResultClient;
use crate::discovery::{self, DiscoveryOrder};
use crate::models::{
    SemesterDescriptor, SemesterId, SemesterResults, SemesterSummary, StudentInfo, StudentReport,
};
use crate::parser::{ParseOutcome, TranscriptParser};
use crate::retake;
use crate::roster::RosterEntry;

#[derive(Debug)]
pub struct FetchedReport {
    pub report: StudentReport,
    pub order: DiscoveryOrder,
    pub visited: usize,
}

#[derive(Debug)]
pub struct ManualReport {
    pub report: StudentReport,
    pub parse: ParseOutcome,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub roster: RosterEntry,
    pub outcome: anyhow::Result<StudentReport>,
}

/// Student info, discovery, retake resolution and CGPA for one student.
pub async fn run_fetch_pipeline(
    client: &ResultClient,
    catalog: &[SemesterDescriptor],
    student_id: &str,
    empty_run_limit: usize,
) -> anyhow::Result<FetchedReport> {
    let info = client
        .fetch_student_info(student_id)
        .await
        .with_context(|| format!("failed to load student info for {student_id}"))?;

    let outcome = discovery::discover(client, student_id, catalog, empty_run_limit).await;
    tracing::info!(
        student_id,
        semesters = outcome.results.semesters.len(),
        missing = outcome.results.missing_semesters.len(),
        "Discovery finished"
    );

    let names: HashMap<SemesterId, String> = catalog
        .iter()
        .map(|semester| (semester.id.clone(), semester.name.clone()))
        .collect();

    Ok(FetchedReport {
        report: build_student_report(student_id, Some(info), &outcome.results, &names, &HashMap::new()),
        order: outcome.order,
        visited: outcome.visited.len(),
    })
}

/// Runs every roster entry one after another. A failed student is recorded
/// and the batch moves on.
pub async fn run_batch(
    client: &ResultClient,
    catalog: &[SemesterDescriptor],
    roster: Vec<RosterEntry>,
    empty_run_limit: usize,
) -> Vec<BatchEntry> {
    let mut entries = Vec::with_capacity(roster.len());
    for (position, entry) in roster.into_iter().enumerate() {
        tracing::info!(student_id = %entry.student_id, position = position + 1, "Processing student");
        let outcome = run_fetch_pipeline(client, catalog, &entry.student_id, empty_run_limit)
            .await
            .map(|fetched| fetched.report);
        if let Err(e) = &outcome {
            tracing::error!(student_id = %entry.student_id, error = %e, "Student failed");
        }
        entries.push(BatchEntry { roster: entry, outcome });
    }
    entries
}

/// Parses pasted transcript text and computes the same report offline.
pub fn run_manual_pipeline(parser: &TranscriptParser, text: &str) -> anyhow::Result<ManualReport> {
    let parse = parser.parse(text);
    if parse.semesters.is_empty() {
        anyhow::bail!(
            "no courses found in the pasted text ({} lines rejected)",
            parse.rejected
        );
    }

    let mut results = SemesterResults::default();
    let mut names = HashMap::new();
    let mut stated = HashMap::new();
    for semester in &parse.semesters {
        let id = semester.descriptor.id.clone();
        names.insert(id.clone(), semester.descriptor.name.clone());
        if let Some(sgpa) = semester.stated_sgpa {
            stated.insert(id.clone(), sgpa);
        }
        results.insert(id, semester.courses.clone());
    }

    let report = build_student_report("manual", None, &results, &names, &stated);
    Ok(ManualReport { report, parse })
}

/// Assembles the presentation record from a result set.
///
/// Per-semester GPAs use each semester's full course list as displayed;
/// the CGPA counts only the best attempt of every retaken course.
pub fn build_student_report(
    student_id: &str,
    student_info: Option<StudentInfo>,
    results: &SemesterResults,
    names: &HashMap<SemesterId, String>,
    stated_sgpa: &HashMap<SemesterId, f64>,
) -> StudentReport {
    let resolved = retake::resolve_retakes(results);
    let overall = resolved.cgpa();

    let semesters = resolved
        .semesters
        .iter()
        .map(|(id, courses)| SemesterSummary {
            id: id.clone(),
            name: names
                .get(id)
                .cloned()
                .unwrap_or_else(|| format!("Semester {id}")),
            gpa: cgpa::semester_gpa(courses),
            course_count: courses.len(),
            stated_sgpa: stated_sgpa.get(id).copied(),
        })
        .collect();

    StudentReport {
        student_id: student_id.to_string(),
        student_info,
        retakes: resolved.retakes(),
        semesters,
        missing_semesters: results.missing_semesters.clone(),
        cgpa: overall.value,
        total_credits_display: overall.total_credits_display,
        total_credits_calculated: overall.total_credits_calculated,
        semester_results_by_semester_id: resolved.semesters,
    }
}
