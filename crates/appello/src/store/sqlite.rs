//! SQLite storage
//!
//! This module handles:
//! - Database initialization and migrations
//! - CRUD operations for classes, students and attendance
//! - Aggregate queries answered in SQL (divisions, stats, date listings)
//!
//! Cascading deletes are left to the foreign keys declared in the schema.

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{
    duplicate_its_no, duplicate_tr_no, new_id, validate_class_name, validate_student_fields,
    AttendanceStore,
};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AttendanceRecord, AttendanceStats, AttendanceStatus, Class, NewStudent, Student,
};

pub const DB_FILE: &str = "appello.db";

/// Schema migrations in the order they must be applied
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial_schema",
        include_str!("../../db/migrations/001_initial_schema.sql"),
    ),
    (
        "002_attendance_indexes",
        include_str!("../../db/migrations/002_attendance_indexes.sql"),
    ),
];

const STUDENT_COLUMNS: &str = "id, tr_no, name, its_no, class_id, division, subject, photo";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at the given path, running any pending migrations
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        debug!(path = %db_path.display(), "Opened SQLite database");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        // Cascades depend on this
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let count = run_migrations(&conn)?;
        if count > 0 {
            info!(count = count, "Applied migrations");
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Apply every migration not yet recorded in `schema_migrations`
pub fn run_migrations(conn: &Connection) -> StoreResult<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version TEXT PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;

    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        tr_no: row.get(1)?,
        name: row.get(2)?,
        its_no: row.get(3)?,
        class_id: row.get(4)?,
        division: row.get(5)?,
        subject: row.get(6)?,
        photo: row.get(7)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: String = row.get(3)?;
    let status = status.parse::<AttendanceStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(AttendanceRecord {
        date: row.get(0)?,
        class_id: row.get(1)?,
        student_id: row.get(2)?,
        status,
    })
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

fn exists(conn: &Connection, sql: &str, id: &str) -> StoreResult<bool> {
    Ok(conn.query_row(sql, [id], |row| row.get(0))?)
}

/// Tr. No. / ITS No. already held by a student other than `exclude_id`
fn check_unique(
    conn: &Connection,
    tr_no: &str,
    its_no: &str,
    exclude_id: Option<&str>,
) -> StoreResult<()> {
    let exclude = exclude_id.unwrap_or("");

    let tr_taken: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE tr_no = ?1 AND id != ?2",
            params![tr_no, exclude],
            |row| row.get(0),
        )
        .optional()?;
    if tr_taken.is_some() {
        return Err(duplicate_tr_no());
    }

    let its_taken: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE its_no = ?1 AND id != ?2",
            params![its_no, exclude],
            |row| row.get(0),
        )
        .optional()?;
    if its_taken.is_some() {
        return Err(duplicate_its_no());
    }

    Ok(())
}

fn query_students(
    conn: &Connection,
    where_clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<Student>> {
    let sql = format!(
        "SELECT {STUDENT_COLUMNS} FROM students {where_clause} ORDER BY name ASC, tr_no ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params, student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

fn query_records(
    conn: &Connection,
    where_clause: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<AttendanceRecord>> {
    let sql = format!(
        "SELECT date, class_id, student_id, status FROM attendance {where_clause}
         ORDER BY date ASC, student_id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params, record_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

fn query_strings(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map(params, |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(values)
}

impl AttendanceStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn get_classes(&self) -> StoreResult<Vec<Class>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name FROM classes ORDER BY rowid ASC")?;
        let classes = stmt
            .query_map([], |row| {
                Ok(Class {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(classes)
    }

    fn get_class(&self, id: &str) -> StoreResult<Option<Class>> {
        let conn = self.conn();
        let class = conn
            .query_row("SELECT id, name FROM classes WHERE id = ?1", [id], |row| {
                Ok(Class {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()?;
        Ok(class)
    }

    fn add_class(&self, name: &str) -> StoreResult<Class> {
        let name = validate_class_name(name)?;
        let class = Class { id: new_id(), name };

        self.conn().execute(
            "INSERT INTO classes (id, name) VALUES (?1, ?2)",
            params![class.id, class.name],
        )?;

        info!(id = %class.id, name = %class.name, "Class added");
        Ok(class)
    }

    fn update_class(&self, class: &Class) -> StoreResult<bool> {
        let name = validate_class_name(&class.name)?;
        let affected = self.conn().execute(
            "UPDATE classes SET name = ?1 WHERE id = ?2",
            params![name, class.id],
        )?;
        if affected > 0 {
            info!(id = %class.id, "Class updated");
        }
        Ok(affected > 0)
    }

    fn delete_class(&self, id: &str) -> StoreResult<bool> {
        let affected = self.conn().execute("DELETE FROM classes WHERE id = ?1", [id])?;
        if affected > 0 {
            info!(id = %id, "Class deleted");
        }
        Ok(affected > 0)
    }

    fn get_students(&self) -> StoreResult<Vec<Student>> {
        query_students(&self.conn(), "", &[])
    }

    fn get_student(&self, id: &str) -> StoreResult<Option<Student>> {
        let conn = self.conn();
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1");
        let student = conn.query_row(&sql, [id], student_from_row).optional()?;
        Ok(student)
    }

    fn get_students_by_class(&self, class_id: &str) -> StoreResult<Vec<Student>> {
        query_students(&self.conn(), "WHERE class_id = ?1", &[&class_id])
    }

    fn get_divisions_by_class(&self, class_id: &str) -> StoreResult<Vec<String>> {
        query_strings(
            &self.conn(),
            "SELECT DISTINCT division FROM students
             WHERE class_id = ?1 AND division IS NOT NULL AND division != ''
             ORDER BY division ASC",
            &[&class_id],
        )
    }

    fn add_student(&self, student: NewStudent) -> StoreResult<Student> {
        validate_student_fields(
            &student.tr_no,
            &student.name,
            &student.its_no,
            &student.class_id,
        )?;
        let conn = self.conn();
        check_unique(&conn, &student.tr_no, &student.its_no, None)?;

        let student = student.into_student(new_id());
        conn.execute(
            "INSERT INTO students (id, tr_no, name, its_no, class_id, division, subject, photo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                student.id,
                student.tr_no,
                student.name,
                student.its_no,
                student.class_id,
                student.division,
                student.subject,
                student.photo,
            ],
        )
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("class", &student.class_id)
            } else {
                StoreError::from(e)
            }
        })?;

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
        let conn = self.conn();
        if !exists(&conn, "SELECT COUNT(*) > 0 FROM students WHERE id = ?1", &student.id)? {
            return Ok(false);
        }
        check_unique(&conn, &student.tr_no, &student.its_no, Some(&student.id))?;

        let normalized = crate::types::normalize_optional;
        conn.execute(
            "UPDATE students
             SET tr_no = ?1, name = ?2, its_no = ?3, class_id = ?4,
                 division = ?5, subject = ?6, photo = ?7
             WHERE id = ?8",
            params![
                student.tr_no,
                student.name,
                student.its_no,
                student.class_id,
                normalized(student.division.clone()),
                normalized(student.subject.clone()),
                normalized(student.photo.clone()),
                student.id,
            ],
        )
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StoreError::not_found("class", &student.class_id)
            } else {
                StoreError::from(e)
            }
        })?;

        info!(id = %student.id, "Student updated");
        Ok(true)
    }

    fn delete_student(&self, id: &str) -> StoreResult<bool> {
        let affected = self.conn().execute("DELETE FROM students WHERE id = ?1", [id])?;
        if affected > 0 {
            info!(id = %id, "Student deleted");
        }
        Ok(affected > 0)
    }

    fn get_attendance_records(&self) -> StoreResult<Vec<AttendanceRecord>> {
        query_records(&self.conn(), "", &[])
    }

    fn get_attendance_by_date(&self, date: &str) -> StoreResult<Vec<AttendanceRecord>> {
        query_records(&self.conn(), "WHERE date = ?1", &[&date])
    }

    fn get_attendance_by_date_and_class(
        &self,
        date: &str,
        class_id: &str,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        query_records(
            &self.conn(),
            "WHERE date = ?1 AND class_id = ?2",
            &[&date, &class_id],
        )
    }

    fn mark_attendance(&self, record: &AttendanceRecord) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO attendance (id, date, class_id, student_id, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (date, student_id)
             DO UPDATE SET status = excluded.status, class_id = excluded.class_id",
            params![
                new_id(),
                record.date,
                record.class_id,
                record.student_id,
                record.status.as_str(),
            ],
        )
        .map_err(|e| {
            if !is_foreign_key_violation(&e) {
                return StoreError::from(e);
            }
            match exists(
                &conn,
                "SELECT COUNT(*) > 0 FROM students WHERE id = ?1",
                &record.student_id,
            ) {
                Ok(true) => StoreError::not_found("class", &record.class_id),
                Ok(false) => StoreError::not_found("student", &record.student_id),
                Err(lookup) => lookup,
            }
        })?;

        debug!(
            date = %record.date,
            student = %record.student_id,
            status = %record.status,
            "Attendance marked"
        );
        Ok(())
    }

    fn has_attendance_for_date(&self, date: &str, class_id: &str) -> StoreResult<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT COUNT(*) > 0 FROM attendance WHERE date = ?1 AND class_id = ?2",
            params![date, class_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get_attendance_stats(
        &self,
        class_id: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<AttendanceStats> {
        let records = query_records(
            &self.conn(),
            "WHERE class_id = ?1 AND (?2 = '' OR date >= ?2) AND (?3 = '' OR date <= ?3)",
            &[&class_id, &start, &end],
        )?;
        Ok(AttendanceStats::from_records(&records))
    }

    fn delete_attendance_by_date(&self, date: &str) -> StoreResult<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM attendance WHERE date = ?1", [date])?;
        info!(date = %date, removed = removed, "Attendance deleted for date");
        Ok(removed)
    }

    fn get_all_attendance_dates(&self) -> StoreResult<Vec<String>> {
        query_strings(
            &self.conn(),
            "SELECT DISTINCT date FROM attendance ORDER BY date DESC",
            &[],
        )
    }

    fn get_attendance_dates_by_class(&self, class_id: &str) -> StoreResult<Vec<String>> {
        query_strings(
            &self.conn(),
            "SELECT DISTINCT date FROM attendance WHERE class_id = ?1 ORDER BY date DESC",
            &[&class_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract::new_student;
    use tempfile::TempDir;

    fn setup_store() -> ((), SqliteStore) {
        ((), SqliteStore::open_in_memory().unwrap())
    }

    crate::store::store_contract_tests!(setup_store());

    fn table_exists(store: &SqliteStore, name: &str) -> bool {
        store
            .conn()
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                [name],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn test_init_creates_tables() {
        let (_, store) = setup_store();
        for table in ["classes", "students", "attendance", "schema_migrations"] {
            assert!(table_exists(&store, table), "{table} missing");
        }
    }

    #[test]
    fn test_migrations_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let first = SqliteStore::open(&db_path).unwrap();
        first.add_class("Grade 5").unwrap();
        drop(first);

        let second = SqliteStore::open(&db_path).unwrap();
        assert_eq!(run_migrations(&second.conn()).unwrap(), 0);
        assert_eq!(second.get_classes().unwrap().len(), 1);
    }

    #[test]
    fn test_unique_constraint_backs_up_precheck() {
        let (_, store) = setup_store();
        let class = store.add_class("Grade 5").unwrap();
        store
            .add_student(new_student(&class.id, "1", "1001", "Amina"))
            .unwrap();

        let err = store
            .conn()
            .execute(
                "INSERT INTO students (id, tr_no, name, its_no, class_id) VALUES ('x', '1', 'Copy', '2', ?1)",
                [&class.id],
            )
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(..)));
    }

    #[test]
    fn test_status_check_constraint() {
        let (_, store) = setup_store();
        let class = store.add_class("Grade 5").unwrap();
        let student = store
            .add_student(new_student(&class.id, "1", "1001", "Amina"))
            .unwrap();

        let result = store.conn().execute(
            "INSERT INTO attendance (id, date, class_id, student_id, status) VALUES ('r', '2024-01-01', ?1, ?2, 'late')",
            params![class.id, student.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_upsert_keeps_single_row() {
        let (_, store) = setup_store();
        let class = store.add_class("Grade 5").unwrap();
        let student = store
            .add_student(new_student(&class.id, "1", "1001", "Amina"))
            .unwrap();

        for status in [
            AttendanceStatus::Absent,
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
        ] {
            store
                .mark_attendance(&AttendanceRecord::new(
                    "2024-01-01",
                    &class.id,
                    &student.id,
                    status,
                ))
                .unwrap();
        }

        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM attendance", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert!(store.has_attendance_for_date("2024-01-01", &class.id).unwrap());
        assert!(!store.has_attendance_for_date("2024-01-02", &class.id).unwrap());
    }
}
