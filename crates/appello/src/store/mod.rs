//! Persistence for classes, students and attendance records
//!
//! [`AttendanceStore`] is the single seam between the views and storage.
//! Two backends implement it:
//! - [`JsonFileStore`]: three JSON arrays in a data directory, cascades and
//!   referential checks enforced in code
//! - [`SqliteStore`]: relational tables with foreign-key cascades
//!
//! Aggregate queries have default implementations built on the primitive
//! reads; backends override them when they can answer with a query.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use crate::csv::CsvWriter;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AttendanceRecord, AttendanceStats, Class, ExportFilter, NewStudent, Student,
};

pub mod json;
pub mod sqlite;

pub use json::JsonFileStore;
pub use sqlite::SqliteStore;

pub const CSV_HEADER: &[&str] = &[
    "Date",
    "Class",
    "Division",
    "Subject",
    "Student Name",
    "Tr. No.",
    "ITS No.",
    "Status",
];

pub trait AttendanceStore: Send + Sync {
    /// Short name used in logs
    fn backend_name(&self) -> &'static str;

    // ---------- classes ----------

    fn get_classes(&self) -> StoreResult<Vec<Class>>;

    fn get_class(&self, id: &str) -> StoreResult<Option<Class>> {
        Ok(self.get_classes()?.into_iter().find(|c| c.id == id))
    }

    fn add_class(&self, name: &str) -> StoreResult<Class>;

    /// Rename a class. Returns false when no class has that id.
    fn update_class(&self, class: &Class) -> StoreResult<bool>;

    /// Remove a class together with its students and their attendance
    fn delete_class(&self, id: &str) -> StoreResult<bool>;

    // ---------- students ----------

    fn get_students(&self) -> StoreResult<Vec<Student>>;

    fn get_student(&self, id: &str) -> StoreResult<Option<Student>> {
        Ok(self.get_students()?.into_iter().find(|s| s.id == id))
    }

    fn get_students_by_class(&self, class_id: &str) -> StoreResult<Vec<Student>> {
        Ok(self
            .get_students()?
            .into_iter()
            .filter(|s| s.class_id == class_id)
            .collect())
    }

    /// `None` division means the whole class
    fn get_students_by_class_and_division(
        &self,
        class_id: &str,
        division: Option<&str>,
    ) -> StoreResult<Vec<Student>> {
        let students = self.get_students_by_class(class_id)?;
        Ok(match division {
            Some(div) => students
                .into_iter()
                .filter(|s| s.division.as_deref() == Some(div))
                .collect(),
            None => students,
        })
    }

    /// Distinct non-empty divisions among a class's students, sorted
    fn get_divisions_by_class(&self, class_id: &str) -> StoreResult<Vec<String>> {
        let divisions: BTreeSet<String> = self
            .get_students_by_class(class_id)?
            .into_iter()
            .filter_map(|s| s.division)
            .filter(|d| !d.is_empty())
            .collect();
        Ok(divisions.into_iter().collect())
    }

    /// Insert a student, rejecting a Tr. No. or ITS No. already in use
    fn add_student(&self, student: NewStudent) -> StoreResult<Student>;

    /// Replace a student's fields, applying the uniqueness check against
    /// every other student. Returns false when no student has that id.
    fn update_student(&self, student: &Student) -> StoreResult<bool>;

    /// Remove a student and all of its attendance records
    fn delete_student(&self, id: &str) -> StoreResult<bool>;

    // ---------- attendance ----------

    fn get_attendance_records(&self) -> StoreResult<Vec<AttendanceRecord>>;

    fn get_attendance_by_date(&self, date: &str) -> StoreResult<Vec<AttendanceRecord>> {
        Ok(self
            .get_attendance_records()?
            .into_iter()
            .filter(|r| r.date == date)
            .collect())
    }

    fn get_attendance_by_date_and_class(
        &self,
        date: &str,
        class_id: &str,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        Ok(self
            .get_attendance_by_date(date)?
            .into_iter()
            .filter(|r| r.class_id == class_id)
            .collect())
    }

    /// Joins on the student's current division in memory
    fn get_attendance_by_date_class_and_division(
        &self,
        date: &str,
        class_id: &str,
        division: &str,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let in_division: BTreeSet<String> = self
            .get_students_by_class_and_division(class_id, Some(division))?
            .into_iter()
            .map(|s| s.id)
            .collect();
        Ok(self
            .get_attendance_by_date_and_class(date, class_id)?
            .into_iter()
            .filter(|r| in_division.contains(&r.student_id))
            .collect())
    }

    /// Records between `start` and `end` inclusive. Empty bounds are open.
    fn get_attendance_in_range(
        &self,
        class_id: Option<&str>,
        start: &str,
        end: &str,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let filter = ExportFilter {
            start: start.to_string(),
            end: end.to_string(),
            ..Default::default()
        };
        Ok(self
            .get_attendance_records()?
            .into_iter()
            .filter(|r| filter.in_range(&r.date))
            .filter(|r| class_id.map(|c| r.class_id == c).unwrap_or(true))
            .collect())
    }

    /// Upsert keyed by `(date, student_id)`; last write wins
    fn mark_attendance(&self, record: &AttendanceRecord) -> StoreResult<()>;

    /// One write per record, in order. Stops at the first failure without
    /// undoing earlier writes.
    fn mark_attendance_bulk(&self, records: &[AttendanceRecord]) -> StoreResult<usize> {
        for record in records {
            self.mark_attendance(record)?;
        }
        Ok(records.len())
    }

    fn has_attendance_for_date(&self, date: &str, class_id: &str) -> StoreResult<bool> {
        Ok(!self.get_attendance_by_date_and_class(date, class_id)?.is_empty())
    }

    /// Per-student counts for a class between `start` and `end` inclusive.
    /// Empty bounds are open, as in [`get_attendance_in_range`](Self::get_attendance_in_range).
    fn get_attendance_stats(
        &self,
        class_id: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<AttendanceStats> {
        let records = self.get_attendance_in_range(Some(class_id), start, end)?;
        Ok(AttendanceStats::from_records(&records))
    }

    /// Remove every record on `date` across all classes
    fn delete_attendance_by_date(&self, date: &str) -> StoreResult<usize>;

    fn export_attendance_to_csv(&self, filter: &ExportFilter) -> StoreResult<String> {
        let records = self.get_attendance_in_range(
            filter.class_id.as_deref(),
            &filter.start,
            &filter.end,
        )?;
        let classes = self.get_classes()?;
        let students = self.get_students()?;
        Ok(render_export(filter, &records, &classes, &students))
    }

    /// Distinct dates with any record, newest first
    fn get_all_attendance_dates(&self) -> StoreResult<Vec<String>> {
        Ok(distinct_dates_desc(self.get_attendance_records()?))
    }

    fn get_attendance_dates_by_class(&self, class_id: &str) -> StoreResult<Vec<String>> {
        Ok(distinct_dates_desc(
            self.get_attendance_records()?
                .into_iter()
                .filter(|r| r.class_id == class_id),
        ))
    }
}

pub type SharedStore = Arc<dyn AttendanceStore>;

/// Which backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Json,
    Sqlite,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Backend::Json),
            "sqlite" => Ok(Backend::Sqlite),
            other => anyhow::bail!("unknown backend: {other} (expected json or sqlite)"),
        }
    }
}

/// Open the configured backend rooted at `data_dir`
pub fn open_store(backend: Backend, data_dir: &Path) -> anyhow::Result<SharedStore> {
    std::fs::create_dir_all(data_dir)?;
    let store: SharedStore = match backend {
        Backend::Json => Arc::new(JsonFileStore::open(data_dir)?),
        Backend::Sqlite => Arc::new(SqliteStore::open(&data_dir.join(sqlite::DB_FILE))?),
    };
    tracing::info!(backend = store.backend_name(), dir = %data_dir.display(), "Store opened");
    Ok(store)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn validate_class_name(name: &str) -> StoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::validation("Class name is required"));
    }
    Ok(name.to_string())
}

/// Required fields shared by insert and update
pub(crate) fn validate_student_fields(
    tr_no: &str,
    name: &str,
    its_no: &str,
    class_id: &str,
) -> StoreResult<()> {
    let missing: Vec<&str> = [
        ("Tr. No.", tr_no),
        ("Name", name),
        ("ITS No.", its_no),
        ("Class", class_id),
    ]
    .iter()
    .filter(|(_, v)| v.trim().is_empty())
    .map(|(label, _)| *label)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

pub(crate) fn duplicate_tr_no() -> StoreError {
    StoreError::Duplicate("Tr. No. already exists".to_string())
}

pub(crate) fn duplicate_its_no() -> StoreError {
    StoreError::Duplicate("ITS No. already exists".to_string())
}

/// Check `candidate` against `others`; Tr. No. wins when both collide
pub(crate) fn check_unique<'a>(
    tr_no: &str,
    its_no: &str,
    others: impl IntoIterator<Item = &'a Student> + Clone,
) -> StoreResult<()> {
    if others.clone().into_iter().any(|s| s.tr_no == tr_no) {
        return Err(duplicate_tr_no());
    }
    if others.into_iter().any(|s| s.its_no == its_no) {
        return Err(duplicate_its_no());
    }
    Ok(())
}

fn distinct_dates_desc(records: impl IntoIterator<Item = AttendanceRecord>) -> Vec<String> {
    let dates: BTreeSet<String> = records.into_iter().map(|r| r.date).collect();
    dates.into_iter().rev().collect()
}

/// Join records with their class and student and render the CSV body.
/// Records whose class or student no longer exists are skipped.
pub(crate) fn render_export(
    filter: &ExportFilter,
    records: &[AttendanceRecord],
    classes: &[Class],
    students: &[Student],
) -> String {
    let mut rows: Vec<(&AttendanceRecord, &Class, &Student)> = records
        .iter()
        .filter_map(|r| {
            let class = classes.iter().find(|c| c.id == r.class_id)?;
            let student = students.iter().find(|s| s.id == r.student_id)?;
            Some((r, class, student))
        })
        .filter(|(_, _, s)| match filter.division.as_deref() {
            Some(div) if !div.is_empty() => s.division.as_deref() == Some(div),
            _ => true,
        })
        .collect();

    rows.sort_by(|a, b| {
        a.0.date
            .cmp(&b.0.date)
            .then_with(|| a.1.name.cmp(&b.1.name))
            .then_with(|| a.2.name.cmp(&b.2.name))
    });

    let mut writer = CsvWriter::with_header(CSV_HEADER);
    for (record, class, student) in rows {
        writer.push_row([
            record.date.as_str(),
            class.name.as_str(),
            student.division.as_deref().unwrap_or(""),
            student.subject.as_deref().unwrap_or(""),
            student.name.as_str(),
            student.tr_no.as_str(),
            student.its_no.as_str(),
            record.status.as_str(),
        ]);
    }
    writer.finish()
}


/// Expand one `#[test]` per contract function. `$make` must evaluate to a
/// `(guard, store)` pair; the guard keeps any temp directory alive.
#[cfg(test)]
macro_rules! store_contract_tests {
    ($make:expr) => {
        $crate::store::store_contract_tests!(@cases $make;
            add_class_requires_name,
            update_class_renames,
            duplicate_tr_no_rejected,
            update_student_excludes_self,
            add_student_requires_class,
            mark_attendance_overwrites,
            mark_attendance_single_student,
            mark_attendance_unknown_student,
            mark_attendance_unknown_class,
            delete_class_cascades,
            delete_student_removes_records,
            divisions_and_division_filters,
            stats_count_distinct_dates_in_range,
            stats_empty_bounds_are_open,
            delete_by_date_spans_classes,
            dates_newest_first,
            export_csv_single_date,
            export_csv_escapes_and_filters
        );
    };
    (@cases $make:expr; $($name:ident),*) => {
        $(
            #[test]
            fn $name() {
                let (_guard, store) = $make;
                $crate::store::contract::$name(&store);
            }
        )*
    };
}

#[cfg(test)]
pub(crate) use store_contract_tests;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttendanceStatus;

    fn student(id: &str, tr_no: &str, its_no: &str) -> Student {
        NewStudent {
            tr_no: tr_no.to_string(),
            name: id.to_string(),
            its_no: its_no.to_string(),
            class_id: "c1".to_string(),
            ..Default::default()
        }
        .into_student(id.to_string())
    }

    #[test]
    fn test_check_unique_prefers_tr_no_message() {
        let existing = vec![student("a", "1", "100")];
        let err = check_unique("1", "100", existing.iter()).unwrap_err();
        assert_eq!(err.to_string(), "Tr. No. already exists");
        assert!(check_unique("2", "200", existing.iter()).is_ok());
    }

    #[test]
    fn test_validate_student_fields_lists_missing() {
        let err = validate_student_fields("", "Amina", " ", "c1").unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: Tr. No., ITS No.");
    }

    #[test]
    fn test_render_export_skips_dangling_records() {
        let classes = vec![Class {
            id: "c1".to_string(),
            name: "Grade 5".to_string(),
        }];
        let students = vec![student("a", "1", "100")];
        let records = vec![
            AttendanceRecord::new("2024-01-01", "c1", "a", AttendanceStatus::Present),
            AttendanceRecord::new("2024-01-01", "c1", "gone", AttendanceStatus::Present),
            AttendanceRecord::new("2024-01-01", "c9", "a", AttendanceStatus::Present),
        ];

        let csv = render_export(&ExportFilter::default(), &records, &classes, &students);
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("SQLite".parse::<Backend>().unwrap(), Backend::Sqlite);
        assert!("postgres".parse::<Backend>().is_err());
    }
}
