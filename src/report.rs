use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::StudentReport;
use crate::parser::ParseOutcome;
use crate::pipeline::BatchEntry;

pub fn render_json(report: &StudentReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

pub fn build_report(report: &StudentReport, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let name = report
        .student_info
        .as_ref()
        .and_then(|info| info.student_name.as_deref())
        .unwrap_or("Student");

    let _ = writeln!(output, "# Academic Result Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) on {}",
        name, report.student_id, generated_on
    );
    if let Some(program) = report
        .student_info
        .as_ref()
        .and_then(|info| info.program_name.as_deref())
    {
        let _ = writeln!(output, "Program: {}", program);
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- CGPA: {:.2}", report.cgpa);
    let _ = writeln!(output, "- Credits earned: {:.2}", report.total_credits_display);
    if report.total_credits_calculated > report.total_credits_display {
        let _ = writeln!(
            output,
            "- Credits attempted (incl. F/I): {:.2}",
            report.total_credits_calculated
        );
    }
    let _ = writeln!(output, "- Semesters with results: {}", report.semesters.len());

    if !report.missing_semesters.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Missing Semesters");
        let _ = writeln!(
            output,
            "No results came back for these semesters although later ones did. The CGPA may be incomplete."
        );
        for missing in &report.missing_semesters {
            let _ = writeln!(output, "- {} ({})", missing.name, missing.id);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semesters");

    if report.semesters.is_empty() {
        let _ = writeln!(output, "No results recorded.");
    }

    for semester in &report.semesters {
        let _ = writeln!(output);
        let _ = write!(
            output,
            "### {} - GPA {:.2} ({:.2} credits)",
            semester.name, semester.gpa.value, semester.gpa.total_credits_display
        );
        match semester.stated_sgpa {
            Some(stated) => {
                let _ = writeln!(output, ", stated {:.2}", stated);
            }
            None => {
                let _ = writeln!(output);
            }
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "| Code | Course | Credit | Grade | Point | Note |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");

        let courses = report
            .semester_results_by_semester_id
            .get(&semester.id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for course in courses {
            let note = match (course.is_retake, course.is_best_attempt) {
                (true, true) => "retake, counted",
                (true, false) => "retake, not counted",
                _ => "",
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                course.display_code(),
                course.course_name,
                fmt_number(course.credit),
                course.grade.map(|g| g.letter()).unwrap_or("-"),
                fmt_number(course.grade_point),
                note
            );
        }
    }

    if !report.retakes.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Retaken Courses");
        for retake in &report.retakes {
            let attempts: Vec<String> = retake
                .attempts
                .iter()
                .map(|attempt| {
                    format!(
                        "{} in {}",
                        attempt.grade.map(|g| g.letter()).unwrap_or("-"),
                        attempt.semester_id
                    )
                })
                .collect();
            let _ = writeln!(
                output,
                "- {} {}: {} (best counted)",
                retake.course_code,
                retake.course_name,
                attempts.join(", ")
            );
        }
    }

    output
}

/// Soft diagnostics from a pasted transcript.
pub fn build_parse_notes(parse: &ParseOutcome) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Parse Notes");
    let _ = writeln!(
        output,
        "- {} courses read, {} lines skipped",
        parse.accepted, parse.rejected
    );
    for discrepancy in &parse.discrepancies {
        let _ = writeln!(
            output,
            "- Semester {}: stated SGPA {:.2}, computed {:.2}",
            discrepancy.semester_id, discrepancy.stated, discrepancy.computed
        );
    }
    output
}

pub fn build_batch_summary(entries: &[BatchEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Batch Summary");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Student | Label | CGPA | Credits | Missing | Status |");
    let _ = writeln!(output, "|---|---|---|---|---|---|");

    for entry in entries {
        let label = entry.roster.label.as_deref().unwrap_or("");
        match &entry.outcome {
            Ok(report) => {
                let _ = writeln!(
                    output,
                    "| {} | {} | {:.2} | {:.2} | {} | ok |",
                    entry.roster.student_id,
                    label,
                    report.cgpa,
                    report.total_credits_display,
                    report.missing_semesters.len()
                );
            }
            Err(e) => {
                let _ = writeln!(
                    output,
                    "| {} | {} | - | - | - | failed: {} |",
                    entry.roster.student_id, label, e
                );
            }
        }
    }

    output
}

fn fmt_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseRecord, Grade, MissingSemester, SemesterId, SemesterResults};
    use crate::pipeline::build_student_report;
    use crate::roster::RosterEntry;
    use std::collections::HashMap;

    fn sample_report() -> StudentReport {
        let course = |code: &str, semester: &str, grade: Grade| {
            CourseRecord::new(
                Some(code),
                "Programming",
                Some(3.0),
                Some(grade),
                Some(grade.point()),
                SemesterId::new(semester),
            )
        };

        let mut results = SemesterResults::default();
        results.insert(SemesterId::new("221"), vec![course("CSE101", "221", Grade::F)]);
        results.insert(SemesterId::new("223"), vec![course("CSE101", "223", Grade::AMinus)]);
        results.missing_semesters.push(MissingSemester {
            id: SemesterId::new("222"),
            name: "Summer 2022".to_string(),
        });

        let mut names = HashMap::new();
        names.insert(SemesterId::new("221"), "Spring 2022".to_string());
        names.insert(SemesterId::new("223"), "Fall 2022".to_string());
        build_student_report("221-15-1", None, &results, &names, &HashMap::new())
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    #[test]
    fn markdown_lists_summary_gaps_and_retakes() {
        let text = build_report(&sample_report(), date());
        assert!(text.contains("Generated for Student (221-15-1) on 2026-02-02"));
        assert!(text.contains("- CGPA: 3.50"));
        assert!(text.contains("## Missing Semesters"));
        assert!(text.contains("- Summer 2022 (222)"));
        assert!(text.contains("### Spring 2022 - GPA 0.00 (0.00 credits)"));
        assert!(text.contains("retake, not counted"));
        assert!(text.contains("- CSE101 Programming: A- in 223, F in 221 (best counted)"));
    }

    #[test]
    fn json_uses_stable_field_names() {
        let json = render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["cgpa"], serde_json::json!(3.5));
        assert_eq!(value["totalCreditsDisplay"], serde_json::json!(3.0));
        assert!(value["semesterResultsBySemesterId"]["221"].is_array());
        assert_eq!(value["missingSemesters"][0]["id"], "222");
        assert_eq!(
            value["semesterResultsBySemesterId"]["223"][0]["gradeLetter"],
            "A-"
        );
    }

    #[test]
    fn batch_summary_shows_failures() {
        let entries = vec![
            BatchEntry {
                roster: RosterEntry {
                    student_id: "221-15-1".to_string(),
                    label: Some("Avery".to_string()),
                },
                outcome: Ok(sample_report()),
            },
            BatchEntry {
                roster: RosterEntry {
                    student_id: "221-15-2".to_string(),
                    label: None,
                },
                outcome: Err(anyhow::anyhow!("HTTP 404")),
            },
        ];
        let text = build_batch_summary(&entries);
        assert!(text.contains("| 221-15-1 | Avery | 3.50 | 3.00 | 1 | ok |"));
        assert!(text.contains("| 221-15-2 |  | - | - | - | failed: HTTP 404 |"));
    }
}
