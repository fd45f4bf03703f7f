//! In-process store used when `PORTAL_STORE=memory` and by the test suite.

use std::collections::{BTreeMap, HashMap};
#[cfg(test)]
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Question, Student, Submission, SCHEMA_VERSION};
use crate::db::types::{ExamStatus, StudentStatus};

use super::{
    check_exam, check_new_submission, check_question, check_student, check_submission, ExamStore,
    NewSubmission, PortalTotals, StoreError,
};

#[derive(Default)]
struct Tables {
    exams: HashMap<String, Exam>,
    questions: HashMap<String, Vec<Question>>,
    submissions: Vec<Submission>,
    students: HashMap<String, Student>,
}

impl Tables {
    /// Mirrors the unique keys of the `students` table.
    fn student_clash(&self, student: &Student) -> Option<String> {
        self.students.values().filter(|other| other.id != student.id).find_map(|other| {
            if other.email.eq_ignore_ascii_case(&student.email) {
                Some(format!("email {} is already registered", student.email))
            } else if other.student_number == student.student_number {
                Some(format!("student number {} is already registered", student.student_number))
            } else {
                None
            }
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryExamStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    faults: Faults,
}

/// Number of upcoming calls that should fail, per operation.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct Faults {
    pub(crate) create_submission: AtomicU32,
    pub(crate) delete_questions: AtomicU32,
    pub(crate) delete_submissions: AtomicU32,
    exam_read_delay_millis: AtomicU64,
}

#[cfg(test)]
impl Faults {
    /// Makes every `find_exam` wait `delay` before reading.
    pub(crate) fn slow_exam_reads(&self, delay: std::time::Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.exam_read_delay_millis.store(millis, Ordering::SeqCst);
    }

    async fn delay_exam_read(&self) {
        let millis = self.exam_read_delay_millis.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
        }
    }
}

#[cfg(test)]
impl MemoryExamStore {
    pub(crate) fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Moves a stored submission's timestamp back by `age`.
    pub(crate) async fn backdate_submission(&self, submission_id: &str, age: time::Duration) {
        let mut tables = self.tables.write().await;
        if let Some(submission) =
            tables.submissions.iter_mut().find(|submission| submission.id == submission_id)
        {
            submission.submitted_at -= age;
        }
    }

    fn take_fault(counter: &AtomicU32, operation: &str) -> Result<(), StoreError> {
        let armed = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Unavailable(format!("injected failure in {operation}")));
        }
        Ok(())
    }
}

impl MemoryExamStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

fn sorted_exams(mut exams: Vec<Exam>) -> Vec<Exam> {
    exams.sort_by(|a, b| a.scheduled_date.cmp(&b.scheduled_date).then_with(|| a.id.cmp(&b.id)));
    exams
}

fn sorted_students(mut students: Vec<Student>) -> Vec<Student> {
    students.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    students
}

fn newest_first(mut submissions: Vec<Submission>) -> Vec<Submission> {
    submissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then_with(|| a.id.cmp(&b.id)));
    submissions
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        #[cfg(test)]
        self.faults.delay_exam_read().await;

        let tables = self.tables.read().await;
        let exam = tables.exams.get(exam_id).cloned();
        if let Some(exam) = &exam {
            check_exam(exam)?;
        }
        Ok(exam)
    }

    async fn list_exams(&self, status: Option<ExamStatus>) -> Result<Vec<Exam>, StoreError> {
        let tables = self.tables.read().await;
        let exams: Vec<Exam> = tables
            .exams
            .values()
            .filter(|exam| status.map_or(true, |status| exam.status == status))
            .cloned()
            .collect();
        exams.iter().try_for_each(check_exam)?;
        Ok(sorted_exams(exams))
    }

    async fn list_exams_for_student(&self, student_id: &str) -> Result<Vec<Exam>, StoreError> {
        let tables = self.tables.read().await;
        let exams: Vec<Exam> = tables
            .exams
            .values()
            .filter(|exam| exam.status.is_open_to_students() && exam.is_assigned_to(student_id))
            .cloned()
            .collect();
        exams.iter().try_for_each(check_exam)?;
        Ok(sorted_exams(exams))
    }

    async fn insert_exam(&self, exam: &Exam, questions: &[Question]) -> Result<(), StoreError> {
        check_exam(exam)?;
        questions.iter().try_for_each(check_question)?;

        let mut tables = self.tables.write().await;
        if tables.exams.contains_key(&exam.id) {
            return Err(StoreError::Conflict(format!("exam {} already exists", exam.id)));
        }
        tables.exams.insert(exam.id.clone(), exam.clone());
        tables.questions.insert(exam.id.clone(), questions.to_vec());
        Ok(())
    }

    async fn update_exam(&self, exam: &Exam, questions: &[Question]) -> Result<bool, StoreError> {
        check_exam(exam)?;
        questions.iter().try_for_each(check_question)?;

        let mut tables = self.tables.write().await;
        let Some(stored) = tables.exams.get_mut(&exam.id) else {
            return Ok(false);
        };
        let created_at = stored.created_at;
        let created_by = stored.created_by.clone();
        *stored = Exam { created_at, created_by, ..exam.clone() };
        tables.questions.insert(exam.id.clone(), questions.to_vec());
        Ok(true)
    }

    async fn update_exam_status(
        &self,
        exam_id: &str,
        status: ExamStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(exam) = tables.exams.get_mut(exam_id) else {
            return Ok(false);
        };
        exam.status = status;
        exam.updated_at = now;
        Ok(true)
    }

    async fn delete_exam(&self, exam_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.exams.remove(exam_id).is_some())
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables.read().await;
        let mut questions = tables.questions.get(exam_id).cloned().unwrap_or_default();
        questions.iter().try_for_each(check_question)?;
        questions.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(questions)
    }

    async fn delete_questions(&self, exam_id: &str) -> Result<u64, StoreError> {
        #[cfg(test)]
        Self::take_fault(&self.faults.delete_questions, "delete_questions")?;

        let mut tables = self.tables.write().await;
        let removed = tables.questions.remove(exam_id).map_or(0, |questions| questions.len());
        Ok(removed as u64)
    }

    async fn submission_exists(&self, exam_id: &str, student_id: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .submissions
            .iter()
            .any(|submission| submission.exam_id == exam_id && submission.student_id == student_id))
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        check_new_submission(&submission)?;
        #[cfg(test)]
        Self::take_fault(&self.faults.create_submission, "create_submission")?;

        let created = Submission {
            id: Uuid::new_v4().to_string(),
            exam_id: submission.exam_id,
            student_id: submission.student_id,
            student_name: submission.student_name,
            submitted_at: primitive_now_utc(),
            answers: Json(submission.answers),
            score: submission.score,
            total_auto_graded: submission.total_auto_graded,
            total_questions: submission.total_questions,
            question_snapshot: submission.question_snapshot.map(Json),
            schema_version: SCHEMA_VERSION,
        };
        check_submission(&created)?;

        self.tables.write().await.submissions.push(created.clone());
        Ok(created)
    }

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let submission =
            tables.submissions.iter().find(|submission| submission.id == submission_id).cloned();
        if let Some(submission) = &submission {
            check_submission(submission)?;
        }
        Ok(submission)
    }

    async fn list_submissions_by_exam(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let submissions: Vec<Submission> = tables
            .submissions
            .iter()
            .filter(|submission| submission.exam_id == exam_id)
            .cloned()
            .collect();
        submissions.iter().try_for_each(check_submission)?;
        Ok(newest_first(submissions))
    }

    async fn list_submissions_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let submissions: Vec<Submission> = tables
            .submissions
            .iter()
            .filter(|submission| submission.student_id == student_id)
            .cloned()
            .collect();
        submissions.iter().try_for_each(check_submission)?;
        Ok(newest_first(submissions))
    }

    async fn delete_submissions(&self, exam_id: &str) -> Result<u64, StoreError> {
        #[cfg(test)]
        Self::take_fault(&self.faults.delete_submissions, "delete_submissions")?;

        let mut tables = self.tables.write().await;
        let before = tables.submissions.len();
        tables.submissions.retain(|submission| submission.exam_id != exam_id);
        Ok((before - tables.submissions.len()) as u64)
    }

    async fn list_recent_submissions(&self, limit: u32) -> Result<Vec<Submission>, StoreError> {
        let tables = self.tables.read().await;
        let mut submissions = newest_first(tables.submissions.clone());
        submissions.truncate(limit as usize);
        submissions.iter().try_for_each(check_submission)?;
        Ok(submissions)
    }

    async fn find_student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.read().await;
        let student = tables.students.get(student_id).cloned();
        if let Some(student) = &student {
            check_student(student)?;
        }
        Ok(student)
    }

    async fn find_students(&self, student_ids: &[String]) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.read().await;
        let students: Vec<Student> =
            student_ids.iter().filter_map(|id| tables.students.get(id)).cloned().collect();
        students.iter().try_for_each(check_student)?;
        Ok(students)
    }

    async fn list_students(
        &self,
        status: Option<StudentStatus>,
    ) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.read().await;
        let students: Vec<Student> = tables
            .students
            .values()
            .filter(|student| status.map_or(true, |status| student.status == status))
            .cloned()
            .collect();
        students.iter().try_for_each(check_student)?;
        Ok(sorted_students(students))
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        check_student(student)?;

        let mut tables = self.tables.write().await;
        if tables.students.contains_key(&student.id) {
            return Err(StoreError::Conflict(format!("student {} already exists", student.id)));
        }
        if let Some(clash) = tables.student_clash(student) {
            return Err(StoreError::Conflict(clash));
        }
        tables.students.insert(student.id.clone(), student.clone());
        Ok(())
    }

    async fn update_student(&self, student: &Student) -> Result<bool, StoreError> {
        check_student(student)?;

        let mut tables = self.tables.write().await;
        if !tables.students.contains_key(&student.id) {
            return Ok(false);
        }
        if let Some(clash) = tables.student_clash(student) {
            return Err(StoreError::Conflict(clash));
        }
        let Some(stored) = tables.students.get_mut(&student.id) else {
            return Ok(false);
        };
        stored.name = student.name.clone();
        stored.student_number = student.student_number.clone();
        stored.status = student.status;
        stored.updated_at = student.updated_at;
        Ok(true)
    }

    async fn portal_totals(&self) -> Result<PortalTotals, StoreError> {
        let tables = self.tables.read().await;
        let mut exams_by_status = BTreeMap::new();
        for exam in tables.exams.values() {
            *exams_by_status.entry(exam.status.as_str()).or_insert(0) += 1;
        }
        Ok(PortalTotals {
            students: tables.students.len() as u64,
            active_students: tables.students.values().filter(|s| s.is_active()).count() as u64,
            submissions: tables.submissions.len() as u64,
            exams_by_status,
        })
    }
}
