//! Typed report fields.
//!
//! Ingestion only collects raw strings into a [`FieldBag`]. The types here
//! turn that bag into validated values once the whole request has been read,
//! so a parse failure can still trigger cleanup of the staged file.

use crate::error::{Error, Result};
use crate::fields::FieldBag;
use crate::upload::public_path_for;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const STUDENT_NAME_MAX: usize = 100;
const CONTROL_NUMBER_MAX: usize = 15;
const MAJOR_MAX: usize = 100;
const REPORT_TITLE_MAX: usize = 255;
const WORK_AREA_MAX: usize = 100;

/// Fields of a report being created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReport {
    pub student_name: String,
    pub control_number: String,
    pub major: Option<String>,
    pub report_title: Option<String>,
    pub work_area: Option<String>,
    pub company_id: i64,
    pub semester_id: i64,
    pub keywords: Vec<i64>,
    /// Storage key of the uploaded document, relative to the uploads root.
    pub pdf_route: String,
}

impl NewReport {
    pub fn from_fields(fields: &FieldBag, pdf_route: String) -> Result<Self> {
        Ok(Self {
            student_name: required_text(fields, "student_name", STUDENT_NAME_MAX)?,
            control_number: required_text(fields, "control_number", CONTROL_NUMBER_MAX)?,
            major: optional_text(fields, "major", MAJOR_MAX)?,
            report_title: optional_text(fields, "report_title", REPORT_TITLE_MAX)?,
            work_area: optional_text(fields, "work_area", WORK_AREA_MAX)?,
            company_id: required_int(fields, "company_id")?,
            semester_id: required_int(fields, "semester_id")?,
            keywords: keywords(fields)?.unwrap_or_default(),
            pdf_route,
        })
    }
}

/// Partial changes to an existing report.
///
/// `pdf_route: None` means no new file was uploaded and the stored document
/// stays as it is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub report_id: i64,
    pub student_name: Option<String>,
    pub control_number: Option<String>,
    pub major: Option<String>,
    pub report_title: Option<String>,
    pub work_area: Option<String>,
    pub company_id: Option<i64>,
    pub semester_id: Option<i64>,
    pub keywords: Option<Vec<i64>>,
    pub pdf_route: Option<String>,
}

impl ReportUpdate {
    pub fn from_fields(report_id: i64, fields: &FieldBag, pdf_route: Option<String>) -> Result<Self> {
        Ok(Self {
            report_id,
            student_name: optional_text(fields, "student_name", STUDENT_NAME_MAX)?,
            control_number: optional_text(fields, "control_number", CONTROL_NUMBER_MAX)?,
            major: optional_text(fields, "major", MAJOR_MAX)?,
            report_title: optional_text(fields, "report_title", REPORT_TITLE_MAX)?,
            work_area: optional_text(fields, "work_area", WORK_AREA_MAX)?,
            company_id: optional_int(fields, "company_id")?,
            semester_id: optional_int(fields, "semester_id")?,
            keywords: keywords(fields)?,
            pdf_route,
        })
    }

    /// True if nothing but the id is set.
    pub fn is_empty(&self) -> bool {
        self.student_name.is_none()
            && self.control_number.is_none()
            && self.major.is_none()
            && self.report_title.is_none()
            && self.work_area.is_none()
            && self.company_id.is_none()
            && self.semester_id.is_none()
            && self.keywords.is_none()
            && self.pdf_route.is_none()
    }
}

/// A stored report as returned by the repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub report_id: i64,
    pub student_name: String,
    pub control_number: String,
    pub major: Option<String>,
    pub report_title: Option<String>,
    pub work_area: Option<String>,
    pub company_id: i64,
    pub semester_id: i64,
    pub keywords: Vec<i64>,
    pub pdf_route: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ReportRecord {
    pub fn new(report_id: i64, report: NewReport, now: OffsetDateTime) -> Self {
        Self {
            report_id,
            student_name: report.student_name,
            control_number: report.control_number,
            major: report.major,
            report_title: report.report_title,
            work_area: report.work_area,
            company_id: report.company_id,
            semester_id: report.semester_id,
            keywords: report.keywords,
            pdf_route: report.pdf_route,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update in place, returning the document key it replaced.
    pub fn apply(&mut self, update: ReportUpdate, now: OffsetDateTime) -> Option<String> {
        if let Some(v) = update.student_name {
            self.student_name = v;
        }
        if let Some(v) = update.control_number {
            self.control_number = v;
        }
        if let Some(v) = update.major {
            self.major = Some(v);
        }
        if let Some(v) = update.report_title {
            self.report_title = Some(v);
        }
        if let Some(v) = update.work_area {
            self.work_area = Some(v);
        }
        if let Some(v) = update.company_id {
            self.company_id = v;
        }
        if let Some(v) = update.semester_id {
            self.semester_id = v;
        }
        if let Some(v) = update.keywords {
            self.keywords = v;
        }
        self.updated_at = now;

        match update.pdf_route {
            Some(route) if route != self.pdf_route => {
                Some(std::mem::replace(&mut self.pdf_route, route))
            }
            _ => None,
        }
    }

    /// URL path the report document is served under.
    pub fn pdf_url(&self) -> String {
        public_path_for(&self.pdf_route)
    }
}

fn non_empty<'a>(fields: &'a FieldBag, name: &str) -> Option<&'a str> {
    fields.get(name).map(str::trim).filter(|v| !v.is_empty())
}

fn check_len(name: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::field(
            name,
            format!("must be at most {max} characters, got {len}"),
        ));
    }
    Ok(())
}

fn required_text(fields: &FieldBag, name: &str, max: usize) -> Result<String> {
    optional_text(fields, name, max)?.ok_or_else(|| Error::MissingField(name.to_string()))
}

fn optional_text(fields: &FieldBag, name: &str, max: usize) -> Result<Option<String>> {
    match non_empty(fields, name) {
        Some(value) => {
            check_len(name, value, max)?;
            Ok(Some(value.to_string()))
        }
        None => Ok(None),
    }
}

fn required_int(fields: &FieldBag, name: &str) -> Result<i64> {
    optional_int(fields, name)?.ok_or_else(|| Error::MissingField(name.to_string()))
}

fn optional_int(fields: &FieldBag, name: &str) -> Result<Option<i64>> {
    non_empty(fields, name)
        .map(|v| {
            v.parse::<i64>()
                .map_err(|_| Error::field(name, "must be an integer"))
        })
        .transpose()
}

fn keywords(fields: &FieldBag) -> Result<Option<Vec<i64>>> {
    non_empty(fields, "keywords")
        .map(|raw| {
            serde_json::from_str::<Vec<i64>>(raw)
                .map_err(|_| Error::field("keywords", "must be a JSON array of integers"))
        })
        .transpose()
}
