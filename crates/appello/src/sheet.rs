//! Attendance sheet for one class (optionally one division) on one date.
//!
//! Lifecycle per date: `Unset -> Initializing -> Ready`. Picking another
//! date drops back to `Unset`. Every mutation re-reads the records for the
//! date from the store instead of patching local state.

use serde::Serialize;
use tracing::{info, warn};

use crate::dates;
use crate::error::{StoreError, StoreResult};
use crate::store::AttendanceStore;
use crate::types::{AttendanceRecord, AttendanceStatus, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetMode {
    /// The sheet was created by this refresh (everyone started absent)
    NewSheet,
    /// Records already existed for the date
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "mode", rename_all = "camelCase")]
pub enum SheetState {
    Unset,
    Initializing,
    Ready(SheetMode),
}

/// Result of a roll-number lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RollLookup {
    Marked { student_id: String, name: String },
    NotFound { tr_no: String },
}

/// One roster line with its effective status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub student: Student,
    pub status: AttendanceStatus,
}

pub struct AttendanceSheet<'a> {
    store: &'a dyn AttendanceStore,
    class_id: String,
    division: Option<String>,
    date: String,
    state: SheetState,
}

impl<'a> AttendanceSheet<'a> {
    pub fn new(
        store: &'a dyn AttendanceStore,
        class_id: &str,
        division: Option<&str>,
        date: &str,
    ) -> StoreResult<Self> {
        dates::parse_date(date)?;
        Ok(Self {
            store,
            class_id: class_id.to_string(),
            division: division.filter(|d| !d.is_empty()).map(str::to_string),
            date: date.to_string(),
            state: SheetState::Unset,
        })
    }

    /// Reopen a sheet without initializing it: `Ready(Edit)` when the date
    /// already has records for the class, `Unset` otherwise
    pub fn resume(
        store: &'a dyn AttendanceStore,
        class_id: &str,
        division: Option<&str>,
        date: &str,
    ) -> StoreResult<Self> {
        let mut sheet = Self::new(store, class_id, division, date)?;
        if store.has_attendance_for_date(date, class_id)? {
            sheet.state = SheetState::Ready(SheetMode::Edit);
        }
        Ok(sheet)
    }

    pub fn state(&self) -> SheetState {
        self.state
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// Pick another date; the sheet must be refreshed before use
    pub fn select_date(&mut self, date: &str) -> StoreResult<()> {
        dates::parse_date(date)?;
        self.date = date.to_string();
        self.state = SheetState::Unset;
        Ok(())
    }

    fn roster(&self) -> StoreResult<Vec<Student>> {
        self.store
            .get_students_by_class_and_division(&self.class_id, self.division.as_deref())
    }

    /// Initialize the sheet if the date has no records yet, else open it for
    /// editing. Initialization writes one absent record per student.
    pub fn refresh(&mut self) -> StoreResult<SheetMode> {
        if self.store.get_class(&self.class_id)?.is_none() {
            return Err(StoreError::not_found("class", &self.class_id));
        }

        self.state = SheetState::Initializing;
        let result = self.initialize();
        self.state = match &result {
            Ok(mode) => SheetState::Ready(*mode),
            Err(_) => SheetState::Unset,
        };
        result
    }

    fn initialize(&self) -> StoreResult<SheetMode> {
        if self
            .store
            .has_attendance_for_date(&self.date, &self.class_id)?
        {
            return Ok(SheetMode::Edit);
        }

        let blank: Vec<AttendanceRecord> = self
            .roster()?
            .iter()
            .map(|s| {
                AttendanceRecord::new(&self.date, &self.class_id, &s.id, AttendanceStatus::Absent)
            })
            .collect();
        let count = self.store.mark_attendance_bulk(&blank)?;

        info!(
            class = %self.class_id,
            date = %self.date,
            students = count,
            "Attendance sheet initialized"
        );
        Ok(SheetMode::NewSheet)
    }

    fn ensure_ready(&self) -> StoreResult<()> {
        match self.state {
            SheetState::Ready(_) => Ok(()),
            _ => Err(StoreError::validation(
                "Set the date before marking attendance",
            )),
        }
    }

    /// Current roster with each student's status; no record means absent
    pub fn rows(&self) -> StoreResult<Vec<SheetRow>> {
        let records = self
            .store
            .get_attendance_by_date_and_class(&self.date, &self.class_id)?;

        Ok(self
            .roster()?
            .into_iter()
            .map(|student| {
                let status = records
                    .iter()
                    .find(|r| r.student_id == student.id)
                    .map(|r| r.status)
                    .unwrap_or(AttendanceStatus::Absent);
                SheetRow { student, status }
            })
            .collect())
    }

    fn set_status(&self, student_id: &str, status: AttendanceStatus) -> StoreResult<()> {
        self.store.mark_attendance(&AttendanceRecord::new(
            &self.date,
            &self.class_id,
            student_id,
            status,
        ))
    }

    /// Mark the student whose Tr. No. matches exactly as present
    pub fn mark_present_by_roll(&self, tr_no: &str) -> StoreResult<RollLookup> {
        self.ensure_ready()?;

        let Some(student) = self.roster()?.into_iter().find(|s| s.tr_no == tr_no) else {
            warn!(tr_no = %tr_no, class = %self.class_id, "Roll number not found");
            return Ok(RollLookup::NotFound {
                tr_no: tr_no.to_string(),
            });
        };

        self.set_status(&student.id, AttendanceStatus::Present)?;
        info!(tr_no = %tr_no, date = %self.date, "Marked present by roll number");
        Ok(RollLookup::Marked {
            student_id: student.id,
            name: student.name,
        })
    }

    /// Flip one student between present and absent, returning the new status
    pub fn toggle(&self, student_id: &str) -> StoreResult<AttendanceStatus> {
        self.ensure_ready()?;

        let row = self
            .rows()?
            .into_iter()
            .find(|r| r.student.id == student_id)
            .ok_or_else(|| StoreError::not_found("student", student_id))?;

        let next = row.status.toggled();
        self.set_status(student_id, next)?;
        Ok(next)
    }

    /// One write per student still absent, in roster order. A failure stops
    /// the pass and leaves earlier writes in place.
    pub fn mark_all_present(&self) -> StoreResult<usize> {
        self.ensure_ready()?;

        let mut marked = 0;
        for row in self.rows()? {
            if row.status == AttendanceStatus::Present {
                continue;
            }
            self.set_status(&row.student.id, AttendanceStatus::Present)?;
            marked += 1;
        }

        info!(date = %self.date, marked = marked, "Marked all present");
        Ok(marked)
    }

    /// Delete every record on the sheet's date (all classes) and reset
    pub fn delete_all(&mut self) -> StoreResult<usize> {
        self.ensure_ready()?;
        let removed = self.store.delete_attendance_by_date(&self.date)?;
        self.state = SheetState::Unset;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract::new_student;
    use crate::store::{JsonFileStore, SqliteStore};
    use crate::types::Class;
    use tempfile::TempDir;

    fn seeded(store: &dyn AttendanceStore, n: usize) -> (Class, Vec<Student>) {
        let class = store.add_class("Grade 5").unwrap();
        let students = (0..n)
            .map(|i| {
                let mut s = new_student(
                    &class.id,
                    &format!("R{i}"),
                    &format!("ITS{i}"),
                    &format!("Student {i}"),
                );
                s.division = Some(if i % 2 == 0 { "A" } else { "B" }.to_string());
                store.add_student(s).unwrap()
            })
            .collect();
        (class, students)
    }

    #[test]
    fn test_refresh_initializes_new_sheet() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, _) = seeded(&store, 4);

        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        assert_eq!(sheet.state(), SheetState::Unset);

        assert_eq!(sheet.refresh().unwrap(), SheetMode::NewSheet);
        assert_eq!(sheet.state(), SheetState::Ready(SheetMode::NewSheet));

        let records = store.get_attendance_by_date("2024-01-01").unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.status == AttendanceStatus::Absent));
    }

    #[test]
    fn test_refresh_existing_sheet_is_edit_mode() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, students) = seeded(&store, 3);
        store
            .mark_attendance(&AttendanceRecord::new(
                "2024-01-01",
                &class.id,
                &students[0].id,
                AttendanceStatus::Present,
            ))
            .unwrap();

        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        assert_eq!(sheet.refresh().unwrap(), SheetMode::Edit);

        // No initialization: only the one record exists
        assert_eq!(store.get_attendance_by_date("2024-01-01").unwrap().len(), 1);

        let rows = sheet.rows().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter()
                .filter(|r| r.status == AttendanceStatus::Absent)
                .count(),
            2
        );
    }

    #[test]
    fn test_select_date_resets_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, _) = seeded(&store, 1);

        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();
        sheet.select_date("2024-01-02").unwrap();

        assert_eq!(sheet.state(), SheetState::Unset);
        assert!(sheet.mark_all_present().is_err());
        assert!(sheet.select_date("02/01/2024").is_err());
    }

    #[test]
    fn test_actions_require_ready() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, students) = seeded(&store, 1);
        let sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();

        assert!(matches!(
            sheet.toggle(&students[0].id),
            Err(StoreError::Validation(_))
        ));
        assert!(sheet.mark_present_by_roll("R0").is_err());
        assert!(store.get_attendance_records().unwrap().is_empty());
    }

    #[test]
    fn test_roll_lookup_is_exact_and_case_sensitive() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, students) = seeded(&store, 2);
        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();

        assert_eq!(
            sheet.mark_present_by_roll("r1").unwrap(),
            RollLookup::NotFound {
                tr_no: "r1".to_string()
            }
        );
        assert_eq!(
            sheet.mark_present_by_roll("R").unwrap(),
            RollLookup::NotFound {
                tr_no: "R".to_string()
            }
        );

        let outcome = sheet.mark_present_by_roll("R1").unwrap();
        assert_eq!(
            outcome,
            RollLookup::Marked {
                student_id: students[1].id.clone(),
                name: "Student 1".to_string()
            }
        );

        let present: Vec<_> = sheet
            .rows()
            .unwrap()
            .into_iter()
            .filter(|r| r.status == AttendanceStatus::Present)
            .collect();
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].student.id, students[1].id);
    }

    #[test]
    fn test_toggle_flips_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(temp_dir.path()).unwrap();
        let (class, students) = seeded(&store, 2);
        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();

        assert_eq!(
            sheet.toggle(&students[0].id).unwrap(),
            AttendanceStatus::Present
        );
        assert_eq!(
            sheet.toggle(&students[0].id).unwrap(),
            AttendanceStatus::Absent
        );
        assert!(matches!(
            sheet.toggle("ghost"),
            Err(StoreError::NotFound { .. })
        ));

        let records = store.get_attendance_by_date("2024-01-01").unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_mark_all_present_skips_already_present() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, students) = seeded(&store, 4);
        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();
        sheet.toggle(&students[2].id).unwrap();

        assert_eq!(sheet.mark_all_present().unwrap(), 3);
        assert!(sheet
            .rows()
            .unwrap()
            .iter()
            .all(|r| r.status == AttendanceStatus::Present));
    }

    #[test]
    fn test_division_sheet_only_covers_division() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, _) = seeded(&store, 5);

        let mut sheet = AttendanceSheet::new(&store, &class.id, Some("A"), "2024-01-01").unwrap();
        sheet.refresh().unwrap();

        assert_eq!(sheet.rows().unwrap().len(), 3);
        assert_eq!(store.get_attendance_by_date("2024-01-01").unwrap().len(), 3);
        assert_eq!(
            sheet.mark_present_by_roll("R1").unwrap(),
            RollLookup::NotFound {
                tr_no: "R1".to_string()
            }
        );
    }

    #[test]
    fn test_delete_all_returns_to_unset() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, _) = seeded(&store, 3);
        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();

        assert_eq!(sheet.delete_all().unwrap(), 3);
        assert_eq!(sheet.state(), SheetState::Unset);
        assert!(store.get_attendance_records().unwrap().is_empty());

        // A second refresh starts a fresh sheet
        assert_eq!(sheet.refresh().unwrap(), SheetMode::NewSheet);
    }

    #[test]
    fn test_refresh_unknown_class() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut sheet = AttendanceSheet::new(&store, "missing", None, "2024-01-01").unwrap();
        assert!(matches!(
            sheet.refresh(),
            Err(StoreError::NotFound { kind: "class", .. })
        ));
        assert_eq!(sheet.state(), SheetState::Unset);
    }

    #[test]
    fn test_new_sheet_then_three_present_exports_three() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, students) = seeded(&store, 6);
        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();
        for s in students.iter().take(3) {
            sheet.toggle(&s.id).unwrap();
        }

        let csv = store
            .export_attendance_to_csv(&crate::types::ExportFilter {
                start: "2024-01-01".to_string(),
                end: "2024-01-01".to_string(),
                ..Default::default()
            })
            .unwrap();
        let rows: Vec<&str> = csv.lines().skip(1).collect();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows.iter().filter(|r| r.ends_with(",present")).count(), 3);
    }

    #[test]
    fn test_resume_only_ready_when_records_exist() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (class, _) = seeded(&store, 2);

        let sheet = AttendanceSheet::resume(&store, &class.id, None, "2024-01-01").unwrap();
        assert_eq!(sheet.state(), SheetState::Unset);

        let mut sheet = AttendanceSheet::new(&store, &class.id, None, "2024-01-01").unwrap();
        sheet.refresh().unwrap();

        let resumed = AttendanceSheet::resume(&store, &class.id, None, "2024-01-01").unwrap();
        assert_eq!(resumed.state(), SheetState::Ready(SheetMode::Edit));
        assert_eq!(resumed.mark_all_present().unwrap(), 2);
    }
}
