use crate::models::{CourseRecord, GpaSummary};

/// GPA of one semester's course list.
///
/// Every record with numeric credit and grade point weighs into the average,
/// F and I included. Those two are only left out of `total_credits_display`.
/// Records with missing or non-finite numbers are skipped.
pub fn semester_gpa(courses: &[CourseRecord]) -> GpaSummary {
    summarize(courses.iter())
}

/// CGPA over the counted attempts produced by retake resolution.
pub fn cgpa<'a, I>(counted: I) -> GpaSummary
where
    I: IntoIterator<Item = &'a CourseRecord>,
{
    summarize(counted.into_iter())
}

fn summarize<'a>(courses: impl Iterator<Item = &'a CourseRecord>) -> GpaSummary {
    let mut weighted_points = 0.0;
    let mut credits_calculated = 0.0;
    let mut credits_display = 0.0;

    for course in courses {
        let Some((credit, point)) = course.scored() else {
            continue;
        };

        weighted_points += credit * point;
        credits_calculated += credit;

        if !course.grade.is_some_and(|grade| grade.excluded_from_display()) {
            credits_display += credit;
        }
    }

    let value = if credits_calculated > 0.0 {
        round2(weighted_points / credits_calculated)
    } else {
        0.0
    };

    GpaSummary {
        value,
        total_credits_display: round2(credits_display),
        total_credits_calculated: round2(credits_calculated),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
