//! Report aggregation over records already fetched from the store.
//!
//! A student with no record for a day counts as absent. In range summaries
//! every student of the roster is listed, including those with zero
//! present days (shown at 0%).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::dates;
use crate::types::{AttendanceRecord, AttendanceStats, AttendanceStatus, Student};

/// Students split by status for a single date
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: String,
    pub present: Vec<Student>,
    pub absent: Vec<Student>,
}

impl DailyReport {
    pub fn total(&self) -> usize {
        self.present.len() + self.absent.len()
    }
}

pub fn daily_report(date: &str, students: &[Student], records: &[AttendanceRecord]) -> DailyReport {
    let mut report = DailyReport {
        date: date.to_string(),
        ..Default::default()
    };

    for student in students {
        let present = records.iter().any(|r| {
            r.date == date && r.student_id == student.id && r.status == AttendanceStatus::Present
        });
        if present {
            report.present.push(student.clone());
        } else {
            report.absent.push(student.clone());
        }
    }

    report
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student: Student,
    pub present_days: usize,
    pub absent_days: usize,
    pub total_days: usize,
    /// present_days / total_days * 100, rounded to two decimals
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
    pub start: String,
    pub end: String,
    pub total_days: usize,
    pub students: Vec<StudentSummary>,
    pub total_present: usize,
    /// Possible student-days minus present ones
    pub total_absent: usize,
}

impl RangeSummary {
    /// Calendar days in the range, whether or not attendance was taken
    pub fn calendar_days(&self) -> usize {
        match (dates::parse_date(&self.start), dates::parse_date(&self.end)) {
            (Ok(start), Ok(end)) => dates::dates_between(start, end).len(),
            _ => self.total_days,
        }
    }
}

/// Per-student tallies over a range of `total_days` days
pub fn range_summary(
    start: &str,
    end: &str,
    students: &[Student],
    stats: &AttendanceStats,
    total_days: usize,
) -> RangeSummary {
    let summaries: Vec<StudentSummary> = students
        .iter()
        .map(|student| {
            let present_days = stats.present_for(&student.id);
            StudentSummary {
                student: student.clone(),
                present_days,
                absent_days: stats.absent_for(&student.id),
                total_days,
                attendance_rate: percentage(present_days, total_days),
            }
        })
        .collect();

    let total_present: usize = summaries.iter().map(|s| s.present_days).sum();
    let possible = students.len() * total_days;

    RangeSummary {
        start: start.to_string(),
        end: end.to_string(),
        total_days,
        students: summaries,
        total_present,
        total_absent: possible.saturating_sub(total_present),
    }
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    TrNo,
    #[default]
    Name,
    ItsNo,
    Division,
    Subject,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortField {
    pub const ALL: [SortField; 5] = [
        SortField::TrNo,
        SortField::Name,
        SortField::ItsNo,
        SortField::Division,
        SortField::Subject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::TrNo => "trNo",
            SortField::Name => "name",
            SortField::ItsNo => "itsNo",
            SortField::Division => "division",
            SortField::Subject => "subject",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortField::TrNo => "Tr. No.",
            SortField::Name => "Name",
            SortField::ItsNo => "ITS No.",
            SortField::Division => "Division",
            SortField::Subject => "Subject",
        }
    }
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    /// Clicking the active column flips direction; a new column starts ascending
    pub fn next(self, current: SortField, clicked: SortField) -> SortDirection {
        match (current == clicked, self) {
            (true, SortDirection::Asc) => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }
}

/// Search and sort for the student list
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortField,
    #[serde(default)]
    pub direction: SortDirection,
}

impl StudentQuery {
    /// Case-insensitive substring match over name, Tr. No. and ITS No.
    pub fn matches(&self, student: &Student) -> bool {
        let Some(term) = self.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return true;
        };
        let term = term.to_lowercase();
        [&student.name, &student.tr_no, &student.its_no]
            .iter()
            .any(|field| field.to_lowercase().contains(&term))
    }

    fn key<'s>(&self, student: &'s Student) -> &'s str {
        match self.sort {
            SortField::TrNo => &student.tr_no,
            SortField::Name => &student.name,
            SortField::ItsNo => &student.its_no,
            SortField::Division => student.division.as_deref().unwrap_or(""),
            SortField::Subject => student.subject.as_deref().unwrap_or(""),
        }
    }

    fn compare(&self, a: &Student, b: &Student) -> Ordering {
        let ordering = self
            .key(a)
            .to_lowercase()
            .cmp(&self.key(b).to_lowercase())
            .then_with(|| self.key(a).cmp(self.key(b)));
        match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }

    pub fn apply(&self, students: Vec<Student>) -> Vec<Student> {
        let mut filtered: Vec<Student> = students.into_iter().filter(|s| self.matches(s)).collect();
        filtered.sort_by(|a, b| self.compare(a, b));
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewStudent;

    fn student(id: &str, tr_no: &str, name: &str, division: Option<&str>) -> Student {
        NewStudent {
            tr_no: tr_no.to_string(),
            name: name.to_string(),
            its_no: format!("ITS-{tr_no}"),
            class_id: "c1".to_string(),
            division: division.map(str::to_string),
            ..Default::default()
        }
        .into_student(id.to_string())
    }

    fn record(date: &str, student: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord::new(date, "c1", student, status)
    }

    #[test]
    fn test_daily_report_defaults_missing_to_absent() {
        let students = vec![
            student("a", "1", "Amina", None),
            student("b", "2", "Bilal", None),
            student("c", "3", "Chen", None),
        ];
        let records = vec![
            record("2024-01-01", "a", AttendanceStatus::Present),
            record("2024-01-01", "c", AttendanceStatus::Absent),
            record("2024-01-02", "b", AttendanceStatus::Present),
        ];

        let report = daily_report("2024-01-01", &students, &records);
        assert_eq!(report.present.len(), 1);
        assert_eq!(report.present[0].id, "a");
        assert_eq!(report.absent.len(), 2);
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_range_summary_includes_zero_present_students() {
        let students = vec![
            student("a", "1", "Amina", None),
            student("b", "2", "Bilal", None),
        ];
        let records = vec![
            record("2024-01-01", "a", AttendanceStatus::Present),
            record("2024-01-02", "a", AttendanceStatus::Present),
            record("2024-01-03", "a", AttendanceStatus::Absent),
        ];
        let stats = AttendanceStats::from_records(&records);

        let summary = range_summary("2024-01-01", "2024-01-03", &students, &stats, 3);
        assert_eq!(summary.students.len(), 2);

        let amina = &summary.students[0];
        assert_eq!(amina.present_days, 2);
        assert_eq!(amina.absent_days, 1);
        assert_eq!(amina.attendance_rate, 66.67);

        let bilal = &summary.students[1];
        assert_eq!(bilal.present_days, 0);
        assert_eq!(bilal.attendance_rate, 0.0);

        assert_eq!(summary.total_present, 2);
        assert_eq!(summary.total_absent, 4);
    }

    #[test]
    fn test_calendar_days_counts_unrecorded_days() {
        let stats = AttendanceStats::default();
        let week = range_summary("2024-01-01", "2024-01-07", &[], &stats, 2);
        assert_eq!(week.calendar_days(), 7);

        let leap_month = range_summary("2024-02-01", "2024-02-29", &[], &stats, 0);
        assert_eq!(leap_month.calendar_days(), 29);
    }

    #[test]
    fn test_percentage_zero_days() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }

    #[test]
    fn test_search_is_case_insensitive_over_ids() {
        let query = StudentQuery {
            search: Some("ami".to_string()),
            ..Default::default()
        };
        assert!(query.matches(&student("a", "1", "Amina", None)));
        assert!(!query.matches(&student("b", "2", "Bilal", None)));

        let by_its = StudentQuery {
            search: Some("its-2".to_string()),
            ..Default::default()
        };
        assert!(by_its.matches(&student("b", "2", "Bilal", None)));
    }

    #[test]
    fn test_sort_by_division_desc() {
        let students = vec![
            student("a", "1", "Amina", Some("A")),
            student("b", "2", "Bilal", None),
            student("c", "3", "Chen", Some("C")),
        ];
        let query = StudentQuery {
            sort: SortField::Division,
            direction: SortDirection::Desc,
            ..Default::default()
        };

        let ids: Vec<String> = query.apply(students).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_by_name_ignores_case() {
        let students = vec![
            student("a", "1", "bilal", None),
            student("b", "2", "Amina", None),
        ];
        let sorted = StudentQuery::default().apply(students);
        assert_eq!(sorted[0].name, "Amina");
    }

    #[test]
    fn test_sort_direction_cycle() {
        let dir = SortDirection::Asc;
        assert_eq!(dir.next(SortField::Name, SortField::Name), SortDirection::Desc);
        assert_eq!(
            SortDirection::Desc.next(SortField::Name, SortField::Name),
            SortDirection::Asc
        );
        assert_eq!(dir.next(SortField::Name, SortField::TrNo), SortDirection::Asc);
    }
}
