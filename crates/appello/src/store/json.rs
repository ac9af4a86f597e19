//! File-backed store: one JSON array per record type under fixed names.
//!
//! Every call re-reads the files it needs and writes back what it changed,
//! so external edits to the data directory are picked up on the next call.
//! A mutex serialises read-modify-write cycles within the process.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::{
    check_unique, new_id, validate_class_name, validate_student_fields, AttendanceStore,
};
use crate::error::{StoreError, StoreResult};
use crate::types::{AttendanceRecord, Class, NewStudent, Student};

pub const CLASSES_FILE: &str = "appello_classes.json";
pub const STUDENTS_FILE: &str = "appello_students.json";
pub const ATTENDANCE_FILE: &str = "appello_attendance.json";

pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        debug!(dir = %dir.display(), "Opened JSON store");
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load<T: DeserializeOwned>(&self, file: &str) -> StoreResult<Vec<T>> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save<T: Serialize>(&self, file: &str, items: &[T]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(self.path(file), json)?;
        Ok(())
    }

    fn classes(&self) -> StoreResult<Vec<Class>> {
        self.load(CLASSES_FILE)
    }

    fn students(&self) -> StoreResult<Vec<Student>> {
        self.load(STUDENTS_FILE)
    }

    fn records(&self) -> StoreResult<Vec<AttendanceRecord>> {
        self.load(ATTENDANCE_FILE)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AttendanceStore for JsonFileStore {
    fn backend_name(&self) -> &'static str {
        "json"
    }

    fn get_classes(&self) -> StoreResult<Vec<Class>> {
        let _guard = self.guard();
        self.classes()
    }

    fn add_class(&self, name: &str) -> StoreResult<Class> {
        let name = validate_class_name(name)?;
        let _guard = self.guard();

        let mut classes = self.classes()?;
        let class = Class { id: new_id(), name };
        classes.push(class.clone());
        self.save(CLASSES_FILE, &classes)?;

        info!(id = %class.id, name = %class.name, "Class added");
        Ok(class)
    }

    fn update_class(&self, class: &Class) -> StoreResult<bool> {
        let name = validate_class_name(&class.name)?;
        let _guard = self.guard();

        let mut classes = self.classes()?;
        let Some(existing) = classes.iter_mut().find(|c| c.id == class.id) else {
            return Ok(false);
        };
        existing.name = name;
        self.save(CLASSES_FILE, &classes)?;

        info!(id = %class.id, "Class updated");
        Ok(true)
    }

    fn delete_class(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.guard();

        let mut classes = self.classes()?;
        let before = classes.len();
        classes.retain(|c| c.id != id);
        if classes.len() == before {
            return Ok(false);
        }

        let mut students = self.students()?;
        let removed: Vec<String> = students
            .iter()
            .filter(|s| s.class_id == id)
            .map(|s| s.id.clone())
            .collect();
        students.retain(|s| s.class_id != id);

        let mut records = self.records()?;
        let records_before = records.len();
        records.retain(|r| r.class_id != id && !removed.contains(&r.student_id));

        // Dependents first, so a failed write leaves the class to retry on
        self.save(ATTENDANCE_FILE, &records)?;
        self.save(STUDENTS_FILE, &students)?;
        self.save(CLASSES_FILE, &classes)?;

        info!(
            id = %id,
            students = removed.len(),
            records = records_before - records.len(),
            "Class deleted"
        );
        Ok(true)
    }

    fn get_students(&self) -> StoreResult<Vec<Student>> {
        let _guard = self.guard();
        self.students()
    }

    fn add_student(&self, student: NewStudent) -> StoreResult<Student> {
        validate_student_fields(
            &student.tr_no,
            &student.name,
            &student.its_no,
            &student.class_id,
        )?;
        let _guard = self.guard();

        if !self.classes()?.iter().any(|c| c.id == student.class_id) {
            return Err(StoreError::not_found("class", &student.class_id));
        }

        let mut students = self.students()?;
        check_unique(&student.tr_no, &student.its_no, students.iter())?;

        let student = student.into_student(new_id());
        students.push(student.clone());
        self.save(STUDENTS_FILE, &students)?;

        info!(id = %student.id, tr_no = %student.tr_no, "Student added");
        Ok(student)
    }

    fn update_student(&self, student: &Student) -> StoreResult<bool> {
        validate_student_fields(
            &student.tr_no,
            &student.name,
            &student.its_no,
            &student.class_id,
        )?;
        let _guard = self.guard();

        let mut students = self.students()?;
        let Some(index) = students.iter().position(|s| s.id == student.id) else {
            return Ok(false);
        };
        check_unique(
            &student.tr_no,
            &student.its_no,
            students.iter().filter(|s| s.id != student.id),
        )?;
        if !self.classes()?.iter().any(|c| c.id == student.class_id) {
            return Err(StoreError::not_found("class", &student.class_id));
        }

        let mut updated = student.clone();
        updated.division = crate::types::normalize_optional(updated.division);
        updated.subject = crate::types::normalize_optional(updated.subject);
        updated.photo = crate::types::normalize_optional(updated.photo);
        students[index] = updated;
        self.save(STUDENTS_FILE, &students)?;

        info!(id = %student.id, "Student updated");
        Ok(true)
    }

    fn delete_student(&self, id: &str) -> StoreResult<bool> {
        let _guard = self.guard();

        let mut students = self.students()?;
        let before = students.len();
        students.retain(|s| s.id != id);
        if students.len() == before {
            return Ok(false);
        }

        let mut records = self.records()?;
        records.retain(|r| r.student_id != id);

        self.save(STUDENTS_FILE, &students)?;
        self.save(ATTENDANCE_FILE, &records)?;

        info!(id = %id, "Student deleted");
        Ok(true)
    }

    fn get_attendance_records(&self) -> StoreResult<Vec<AttendanceRecord>> {
        let _guard = self.guard();
        self.records()
    }

    fn mark_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let _guard = self.guard();

        if !self.students()?.iter().any(|s| s.id == record.student_id) {
            return Err(StoreError::not_found("student", &record.student_id));
        }
        if !self.classes()?.iter().any(|c| c.id == record.class_id) {
            return Err(StoreError::not_found("class", &record.class_id));
        }

        let mut records = self.records()?;
        match records.iter_mut().find(|r| r.same_slot(record)) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.save(ATTENDANCE_FILE, &records)?;

        debug!(
            date = %record.date,
            student = %record.student_id,
            status = %record.status,
            "Attendance marked"
        );
        Ok(())
    }

    fn mark_attendance_bulk(&self, batch: &[AttendanceRecord]) -> StoreResult<usize> {
        let _guard = self.guard();

        let students = self.students()?;
        let classes = self.classes()?;
        let mut records = self.records()?;
        let mut written = 0;
        let mut outcome = Ok(());

        for record in batch {
            if !students.iter().any(|s| s.id == record.student_id) {
                outcome = Err(StoreError::not_found("student", &record.student_id));
                break;
            }
            if !classes.iter().any(|c| c.id == record.class_id) {
                outcome = Err(StoreError::not_found("class", &record.class_id));
                break;
            }
            match records.iter_mut().find(|r| r.same_slot(record)) {
                Some(existing) => *existing = record.clone(),
                None => records.push(record.clone()),
            }
            written += 1;
        }

        // Earlier writes stay even when a later one fails
        self.save(ATTENDANCE_FILE, &records)?;
        info!(count = written, "Attendance batch written");
        outcome.map(|_| written)
    }

    fn delete_attendance_by_date(&self, date: &str) -> StoreResult<usize> {
        let _guard = self.guard();

        let mut records = self.records()?;
        let before = records.len();
        records.retain(|r| r.date != date);
        let removed = before - records.len();
        if removed > 0 {
            self.save(ATTENDANCE_FILE, &records)?;
        }

        info!(date = %date, removed = removed, "Attendance deleted for date");
        Ok(removed)
    }
}
