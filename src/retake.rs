use std::collections::{BTreeMap, HashMap};

use crate::cgpa;
use crate::models::{CourseRecord, GpaSummary, RetakeSummary, SemesterId, SemesterResults};

/// Position of one attempt inside the per-semester course lists.
type Location = (SemesterId, usize);

/// Annotated copy of a result set after retake resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedResults {
    /// Every attempt, flags set, still filed under its own semester.
    pub semesters: BTreeMap<SemesterId, Vec<CourseRecord>>,
    counted: Vec<Location>,
    retakes: Vec<Vec<Location>>,
}

impl ResolvedResults {
    /// Attempts that weigh into the CGPA: best attempts and codeless records.
    pub fn counted(&self) -> impl Iterator<Item = &CourseRecord> + '_ {
        self.counted.iter().filter_map(|loc| self.lookup(loc))
    }

    pub fn cgpa(&self) -> GpaSummary {
        cgpa::cgpa(self.counted())
    }

    /// Groups with more than one attempt, best attempt first.
    pub fn retakes(&self) -> Vec<RetakeSummary> {
        self.retakes
            .iter()
            .filter_map(|group| {
                let attempts: Vec<CourseRecord> =
                    group.iter().filter_map(|loc| self.lookup(loc)).cloned().collect();
                let best = attempts.first()?;
                Some(RetakeSummary {
                    course_code: best.display_code().to_string(),
                    course_name: best.course_name.clone(),
                    attempts,
                })
            })
            .collect()
    }

    fn lookup(&self, (semester, index): &Location) -> Option<&CourseRecord> {
        self.semesters.get(semester).and_then(|courses| courses.get(*index))
    }
}

/// Collapses repeated attempts of a course into one counted attempt.
///
/// Semesters are walked in ascending id order and courses in list order. Within
/// a group the highest grade point wins; equal points keep the earlier attempt.
/// Records without a code or service id are counted on their own.
/// The input is left untouched.
pub fn resolve_retakes(results: &SemesterResults) -> ResolvedResults {
    let mut semesters = results.semesters.clone();

    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<Location>> = Vec::new();
    let mut counted: Vec<Location> = Vec::new();

    for (semester, courses) in semesters.iter() {
        for (index, course) in courses.iter().enumerate() {
            let location = (semester.clone(), index);
            match course.retake_key() {
                Some(key) => {
                    let slot = *group_index.entry(key).or_insert_with(|| {
                        groups.push(Vec::new());
                        groups.len() - 1
                    });
                    groups[slot].push(location);
                }
                None => counted.push(location),
            }
        }
    }

    for location in &counted {
        if let Some(course) = course_mut(&mut semesters, location) {
            course.is_best_attempt = true;
            course.is_retake = false;
            course.retake_count = 0;
        }
    }

    let mut retakes = Vec::new();
    for mut group in groups {
        // sort_by is stable, so equal points keep encounter order
        group.sort_by(|a, b| point_of(&semesters, b).total_cmp(&point_of(&semesters, a)));

        let retake_count = group.len().saturating_sub(1) as u32;
        let is_retake = group.len() > 1;
        for (rank, location) in group.iter().enumerate() {
            if let Some(course) = course_mut(&mut semesters, location) {
                course.is_best_attempt = rank == 0;
                course.is_retake = is_retake;
                course.retake_count = retake_count;
            }
        }

        if let Some(best) = group.first() {
            counted.push(best.clone());
        }
        if is_retake {
            tracing::debug!(
                course = group
                    .first()
                    .and_then(|loc| semesters.get(&loc.0).and_then(|c| c.get(loc.1)))
                    .map(|c| c.display_code())
                    .unwrap_or("-"),
                attempts = group.len(),
                "Resolved retaken course"
            );
            retakes.push(group);
        }
    }

    counted.sort();

    ResolvedResults {
        semesters,
        counted,
        retakes,
    }
}

fn point_of(semesters: &BTreeMap<SemesterId, Vec<CourseRecord>>, (semester, index): &Location) -> f64 {
    semesters
        .get(semester)
        .and_then(|courses| courses.get(*index))
        .and_then(|course| course.grade_point)
        .filter(|point| point.is_finite())
        .unwrap_or(f64::NEG_INFINITY)
}

fn course_mut<'a>(
    semesters: &'a mut BTreeMap<SemesterId, Vec<CourseRecord>>,
    (semester, index): &Location,
) -> Option<&'a mut CourseRecord> {
    semesters.get_mut(semester).and_then(|courses| courses.get_mut(*index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Grade;

    fn attempt(code: Option<&str>, semester: &str, credit: f64, point: f64) -> CourseRecord {
        CourseRecord::new(
            code,
            "Course",
            Some(credit),
            Some(Grade::from_point(point)),
            Some(point),
            SemesterId::new(semester),
        )
    }

    fn results(entries: Vec<(&str, Vec<CourseRecord>)>) -> SemesterResults {
        let mut results = SemesterResults::default();
        for (id, courses) in entries {
            results.insert(SemesterId::new(id), courses);
        }
        results
    }

    #[test]
    fn best_attempt_wins_and_others_are_flagged() {
        let input = results(vec![
            ("221", vec![attempt(Some("CSE101"), "221", 3.0, 2.0)]),
            ("222", vec![attempt(Some("CSE101"), "222", 3.0, 3.75)]),
        ]);

        let resolved = resolve_retakes(&input);
        let first = &resolved.semesters[&SemesterId::new("221")][0];
        let second = &resolved.semesters[&SemesterId::new("222")][0];

        assert!(!first.is_best_attempt);
        assert!(second.is_best_attempt);
        assert!(first.is_retake && second.is_retake);
        assert_eq!(first.retake_count, 1);
        assert_eq!(second.retake_count, 1);

        let counted: Vec<&CourseRecord> = resolved.counted().collect();
        assert_eq!(counted.len(), 1);
        assert_eq!(counted[0].grade_point, Some(3.75));
        assert_eq!(resolved.cgpa().value, 3.75);
        assert_eq!(resolved.cgpa().total_credits_calculated, 3.0);
    }

    #[test]
    fn equal_points_keep_earliest_semester() {
        let input = results(vec![
            ("223", vec![attempt(Some("MAT101"), "223", 3.0, 3.0)]),
            ("221", vec![attempt(Some("MAT101"), "221", 3.0, 3.0)]),
        ]);

        for _ in 0..3 {
            let resolved = resolve_retakes(&input);
            assert!(resolved.semesters[&SemesterId::new("221")][0].is_best_attempt);
            assert!(!resolved.semesters[&SemesterId::new("223")][0].is_best_attempt);
        }
    }

    #[test]
    fn codeless_records_are_always_counted() {
        let input = results(vec![
            ("221", vec![attempt(None, "221", 3.0, 4.0)]),
            ("222", vec![attempt(None, "222", 3.0, 2.0)]),
        ]);

        let resolved = resolve_retakes(&input);
        assert_eq!(resolved.counted().count(), 2);
        assert!(resolved.retakes().is_empty());
        assert_eq!(resolved.cgpa().value, 3.0);
    }

    #[test]
    fn codeless_records_group_by_service_id() {
        let with_id = |semester: &str, point: f64| {
            let mut record = attempt(None, semester, 3.0, point);
            record.course_id = Some("8812".to_string());
            record
        };
        let input = results(vec![
            ("221", vec![with_id("221", 2.0), attempt(None, "221", 3.0, 4.0)]),
            ("222", vec![with_id("222", 3.5)]),
        ]);

        let resolved = resolve_retakes(&input);
        assert_eq!(resolved.counted().count(), 2);
        assert!(!resolved.semesters[&SemesterId::new("221")][0].is_best_attempt);
        assert!(resolved.semesters[&SemesterId::new("221")][1].is_best_attempt);
        assert!(resolved.semesters[&SemesterId::new("222")][0].is_best_attempt);
        assert_eq!(resolved.semesters[&SemesterId::new("222")][0].retake_count, 1);
        assert_eq!(resolved.retakes().len(), 1);
        assert_eq!(resolved.cgpa().value, 3.75);
        assert_eq!(resolved.cgpa().total_credits_calculated, 6.0);
    }

    #[test]
    fn single_attempts_are_best_without_retake() {
        let input = results(vec![("221", vec![attempt(Some("ENG101"), "221", 3.0, 3.5)])]);
        let resolved = resolve_retakes(&input);
        let course = &resolved.semesters[&SemesterId::new("221")][0];
        assert!(course.is_best_attempt);
        assert!(!course.is_retake);
        assert_eq!(course.retake_count, 0);
    }

    #[test]
    fn input_is_not_mutated() {
        let input = results(vec![
            ("221", vec![attempt(Some("CSE101"), "221", 3.0, 2.0)]),
            ("222", vec![attempt(Some("CSE101"), "222", 3.0, 3.75)]),
        ]);
        let snapshot = input.clone();
        let _ = resolve_retakes(&input);
        assert_eq!(input, snapshot);
    }

    #[test]
    fn retake_summary_lists_attempts_best_first() {
        let input = results(vec![
            ("221", vec![attempt(Some("CSE101"), "221", 3.0, 0.0)]),
            ("222", vec![attempt(Some("CSE-101"), "222", 3.0, 2.5)]),
            ("223", vec![attempt(Some("CSE 101"), "223", 3.0, 3.25)]),
        ]);

        let retakes = resolve_retakes(&input).retakes();
        assert_eq!(retakes.len(), 1);
        let points: Vec<Option<f64>> = retakes[0].attempts.iter().map(|a| a.grade_point).collect();
        assert_eq!(points, vec![Some(3.25), Some(2.5), Some(0.0)]);
        assert!(retakes[0].attempts.iter().all(|a| a.retake_count == 2));
    }

    #[test]
    fn failed_first_attempt_drops_out_of_cgpa() {
        let input = results(vec![
            (
                "221",
                vec![
                    attempt(Some("PHY101"), "221", 3.0, 0.0),
                    attempt(Some("CSE101"), "221", 3.0, 4.0),
                ],
            ),
            ("222", vec![attempt(Some("PHY101"), "222", 3.0, 3.0)]),
        ]);

        let summary = resolve_retakes(&input).cgpa();
        assert_eq!(summary.total_credits_calculated, 6.0);
        assert_eq!(summary.value, 3.5);
    }
}
