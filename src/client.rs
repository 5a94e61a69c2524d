//! HTTP client for the remote result service.
//!
//! Raw payloads use several spellings for the same field and send numbers as
//! either JSON numbers or strings. Everything is normalized here so the rest
//! of the crate only sees canonical [`CourseRecord`]s.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::{Config, RetryConfig};
use crate::discovery::ResultSource;
use crate::error::{Error, Result};
use crate::models::{CourseRecord, Grade, SemesterDescriptor, SemesterId, StudentInfo, Term};
use crate::retry::with_retry;

const USER_AGENT: &str = concat!("transcript-cgpa/", env!("CARGO_PKG_VERSION"));

pub struct ResultClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ResultClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            retry: config.retry.clone(),
        })
    }

    /// Full semester catalog. An empty or non-list payload is an error.
    pub async fn fetch_semester_list(&self) -> Result<Vec<SemesterDescriptor>> {
        let url = format!("{}/result/semesterList", self.base_url);
        let payload = with_retry(&self.retry, || self.get_json(&url)).await?;

        let Value::Array(entries) = payload else {
            return Err(Error::InvalidPayload(format!("semester list from {url} is not a list")));
        };

        let mut catalog = Vec::with_capacity(entries.len());
        for entry in entries {
            let raw: RawSemester = serde_json::from_value(entry)?;
            match raw.into_descriptor() {
                Some(descriptor) => catalog.push(descriptor),
                None => tracing::warn!("Skipping semester entry without an id"),
            }
        }

        if catalog.is_empty() {
            return Err(Error::InvalidPayload(format!("semester list from {url} is empty")));
        }
        catalog.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(semesters = catalog.len(), "Loaded semester catalog");
        Ok(catalog)
    }

    /// Student profile. Anything but a JSON object is an error.
    pub async fn fetch_student_info(&self, student_id: &str) -> Result<StudentInfo> {
        let url = format!("{}/result/studentInfo", self.base_url);
        let query = [("studentId", student_id)];
        let payload = with_retry(&self.retry, || self.get_json_with(&url, &query)).await?;

        if !payload.is_object() {
            return Err(Error::InvalidPayload(format!(
                "student info for {student_id} is not an object"
            )));
        }
        let mut info: StudentInfo = serde_json::from_value(payload)?;
        if info.student_id.is_none() {
            info.student_id = Some(student_id.to_string());
        }
        Ok(info)
    }

    /// One semester's courses, surfacing transport errors. [`ResultSource`]
    /// wraps this and folds failures into an empty list.
    pub async fn try_fetch_semester_results(
        &self,
        semester: &SemesterId,
        student_id: &str,
    ) -> Result<Vec<CourseRecord>> {
        let url = format!("{}/result", self.base_url);
        let query = [
            ("grecaptcha", ""),
            ("semesterId", semester.as_str()),
            ("studentId", student_id),
        ];

        let entries = with_retry(&self.retry, || async {
            match self.get_json_with(&url, &query).await? {
                Value::Array(entries) => Ok(entries),
                other => Err(Error::MalformedBody {
                    url: url.clone(),
                    message: format!("expected a list, got {}", json_kind(&other)),
                }),
            }
        })
        .await?;

        let courses = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawCourse>(entry) {
                Ok(raw) => Some(raw.normalize(semester)),
                Err(e) => {
                    tracing::warn!(semester = %semester, error = %e, "Dropping unreadable course entry");
                    None
                }
            })
            .collect();
        Ok(courses)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        self.get_json_with(url, &[]).await
    }

    async fn get_json_with(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self.http.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(Error::EmptyBody { url: url.to_string() });
        }

        serde_json::from_str(&body).map_err(|e| Error::MalformedBody {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ResultSource for ResultClient {
    async fn fetch_semester_results(
        &self,
        semester: &SemesterId,
        student_id: &str,
    ) -> Vec<CourseRecord> {
        match self.try_fetch_semester_results(semester, student_id).await {
            Ok(courses) => courses,
            Err(e) => {
                tracing::warn!(semester = %semester, error = %e, "Treating failed semester fetch as empty");
                Vec::new()
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSemester {
    #[serde(default, deserialize_with = "lenient_string")]
    semester_id: Option<String>,
    #[serde(default)]
    semester_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    semester_year: Option<f64>,
}

impl RawSemester {
    fn into_descriptor(self) -> Option<SemesterDescriptor> {
        let id = SemesterId::new(self.semester_id?);
        if id.as_str().is_empty() {
            return None;
        }

        let term = self
            .semester_name
            .as_deref()
            .and_then(Term::parse)
            .or_else(|| id.as_str().chars().last().and_then(Term::from_code));
        let year = self.semester_year.map(|y| y as i32).unwrap_or_default();
        let name = match (&self.semester_name, term) {
            (Some(name), _) if year > 0 && !name.contains(&year.to_string()) => format!("{name} {year}"),
            (Some(name), _) => name.clone(),
            (None, Some(term)) if year > 0 => format!("{term} {year}"),
            (None, _) => format!("Semester {id}"),
        };

        Some(SemesterDescriptor { id, name, year, term })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCourse {
    #[serde(default, deserialize_with = "lenient_string")]
    custom_course_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    course_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    course_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    course_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    course_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    total_credit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    credit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    grade_letter: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    grade: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    point_equivalent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    grade_point: Option<f64>,
}

impl RawCourse {
    // Service spellings win over the short ones when a payload carries both.
    fn normalize(self, semester: &SemesterId) -> CourseRecord {
        let letter = [self.grade_letter, self.grade]
            .into_iter()
            .flatten()
            .find_map(|raw| Grade::parse(&raw));
        let point = [self.point_equivalent, self.grade_point]
            .into_iter()
            .flatten()
            .find(|p| p.is_finite());
        let (grade, grade_point) = match (letter, point) {
            (Some(grade), Some(point)) => (Some(grade), Some(point)),
            (Some(grade), None) => (Some(grade), Some(grade.point())),
            (None, Some(point)) => (Some(Grade::from_point(point)), Some(point)),
            (None, None) => (None, None),
        };

        let non_empty = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let course_code = non_empty(self.custom_course_id).or_else(|| non_empty(self.course_code));
        let course_id = non_empty(self.course_id);
        let course_name = non_empty(self.course_title)
            .or_else(|| non_empty(self.course_name))
            .or_else(|| course_code.clone())
            .unwrap_or_default();
        let credit = [self.total_credit, self.credit]
            .into_iter()
            .flatten()
            .find(|c| c.is_finite() && *c >= 0.0);

        CourseRecord {
            course_code,
            course_id,
            course_name,
            credit,
            grade,
            grade_point,
            semester_id: semester.clone(),
            is_retake: false,
            is_best_attempt: false,
            retake_count: 0,
        }
    }
}

/// Number or numeric string; anything unparseable becomes `None`.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// String or number, kept as text.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
