//! Class and student setup rules applied before the store is called.

use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::report::StudentQuery;
use crate::store::AttendanceStore;
use crate::types::{Class, NewStudent, Student};

pub const DEFAULT_MAX_CLASSES: usize = 2;

/// Required fields present, identifiers trimmed so roll lookups match
fn cleaned(student: NewStudent) -> StoreResult<NewStudent> {
    if student.tr_no.trim().is_empty()
        || student.name.trim().is_empty()
        || student.its_no.trim().is_empty()
        || student.class_id.trim().is_empty()
    {
        return Err(StoreError::validation("Please fill in all required fields"));
    }

    Ok(NewStudent {
        tr_no: student.tr_no.trim().to_string(),
        name: student.name.trim().to_string(),
        its_no: student.its_no.trim().to_string(),
        ..student
    })
}

/// Setup operations bound to a store and a class cap
pub struct Setup<'a> {
    store: &'a dyn AttendanceStore,
    max_classes: usize,
}

impl<'a> Setup<'a> {
    pub fn new(store: &'a dyn AttendanceStore, max_classes: usize) -> Self {
        Self { store, max_classes }
    }

    /// Whether another class may still be created
    pub fn can_add_class(&self) -> StoreResult<bool> {
        Ok(self.store.get_classes()?.len() < self.max_classes)
    }

    pub fn add_class(&self, name: &str) -> StoreResult<Class> {
        if name.trim().is_empty() {
            return Err(StoreError::validation("Class name is required"));
        }
        if !self.can_add_class()? {
            warn!(max = self.max_classes, "Class limit reached");
            return Err(StoreError::validation(format!(
                "Maximum of {} classes allowed",
                self.max_classes
            )));
        }
        self.store.add_class(name)
    }

    /// Register a student, checking required fields before the store
    pub fn add_student(&self, student: NewStudent) -> StoreResult<Student> {
        let added = self.store.add_student(cleaned(student)?)?;
        info!(tr_no = %added.tr_no, class = %added.class_id, "Student registered");
        Ok(added)
    }

    /// Replace a student's fields with the same checks as registration.
    /// Returns the stored student, or `None` when the id is unknown.
    pub fn update_student(&self, id: &str, student: NewStudent) -> StoreResult<Option<Student>> {
        let student = cleaned(student)?.into_student(id.to_string());
        if !self.store.update_student(&student)? {
            return Ok(None);
        }
        info!(id = %id, tr_no = %student.tr_no, "Student edited");
        Ok(Some(student))
    }

    /// Students of a class (or all students) filtered and sorted for display
    pub fn list_students(
        &self,
        class_id: Option<&str>,
        query: &StudentQuery,
    ) -> StoreResult<Vec<Student>> {
        let students = match class_id.filter(|c| !c.is_empty()) {
            Some(class_id) => self.store.get_students_by_class(class_id)?,
            None => self.store.get_students()?,
        };
        Ok(query.apply(students))
    }
}
