use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A named group (course or subject) that owns a roster of students
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Class {
    pub id: String,
    pub name: String,
}

/// A student enrolled in exactly one class
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,

    /// Roll number, unique across all students
    pub tr_no: String,

    pub name: String,

    /// Secondary unique identifier
    pub its_no: String,

    pub class_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

/// Student fields supplied by the caller; the store assigns the id
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub tr_no: String,
    pub name: String,
    pub its_no: String,
    pub class_id: String,
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl NewStudent {
    pub fn into_student(self, id: String) -> Student {
        Student {
            id,
            tr_no: self.tr_no,
            name: self.name,
            its_no: self.its_no,
            class_id: self.class_id,
            division: normalize_optional(self.division),
            subject: normalize_optional(self.subject),
            photo: normalize_optional(self.photo),
        }
    }
}

/// Blank optional fields are stored as absent so division lookups stay clean
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            AttendanceStatus::Present => AttendanceStatus::Absent,
            AttendanceStatus::Absent => AttendanceStatus::Present,
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One student's status on one date. `(date, student_id)` is the natural key.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    /// Date in YYYY-MM-DD format
    pub date: String,
    pub class_id: String,
    pub student_id: String,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn new(date: &str, class_id: &str, student_id: &str, status: AttendanceStatus) -> Self {
        Self {
            date: date.to_string(),
            class_id: class_id.to_string(),
            student_id: student_id.to_string(),
            status,
        }
    }

    /// Two records with the same key describe the same attendance slot
    pub fn same_slot(&self, other: &AttendanceRecord) -> bool {
        self.date == other.date && self.student_id == other.student_id
    }
}

/// Per-student tallies over a date range
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    /// Distinct dates with at least one record for the class in range
    pub total_days: usize,
    pub present_count: HashMap<String, usize>,
    pub absent_count: HashMap<String, usize>,
}

impl AttendanceStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let mut dates = std::collections::HashSet::new();
        let mut stats = AttendanceStats::default();

        for record in records {
            dates.insert(record.date.as_str());
            let bucket = match record.status {
                AttendanceStatus::Present => &mut stats.present_count,
                AttendanceStatus::Absent => &mut stats.absent_count,
            };
            *bucket.entry(record.student_id.clone()).or_insert(0) += 1;
        }

        stats.total_days = dates.len();
        stats
    }

    pub fn present_for(&self, student_id: &str) -> usize {
        self.present_count.get(student_id).copied().unwrap_or(0)
    }

    pub fn absent_for(&self, student_id: &str) -> usize {
        self.absent_count.get(student_id).copied().unwrap_or(0)
    }
}

/// Bounds and filters for a CSV export. Empty bounds mean "no filter".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilter {
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
}

impl ExportFilter {
    pub fn in_range(&self, date: &str) -> bool {
        (self.start.is_empty() || date >= self.start.as_str())
            && (self.end.is_empty() || date <= self.end.as_str())
    }
}
