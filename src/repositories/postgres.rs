use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Exam, Question, Student, Submission};
use crate::db::types::{ExamStatus, StudentStatus};

use super::{
    check_exam, check_new_submission, check_question, check_student, check_submission, exams,
    questions, students, submissions, ExamStore, NewSubmission, PortalTotals, StoreError,
};

/// Postgres-backed store. Reads are re-checked at the boundary like writes.
#[derive(Clone)]
pub(crate) struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn checked_exams(exams: Vec<Exam>) -> Result<Vec<Exam>, StoreError> {
    exams.iter().try_for_each(check_exam)?;
    Ok(exams)
}

fn checked_submissions(submissions: Vec<Submission>) -> Result<Vec<Submission>, StoreError> {
    submissions.iter().try_for_each(check_submission)?;
    Ok(submissions)
}

fn checked_students(students: Vec<Student>) -> Result<Vec<Student>, StoreError> {
    students.iter().try_for_each(check_student)?;
    Ok(students)
}

fn non_negative(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>, StoreError> {
        let exam = exams::find_by_id(&self.pool, exam_id).await?;
        if let Some(exam) = &exam {
            check_exam(exam)?;
        }
        Ok(exam)
    }

    async fn list_exams(&self, status: Option<ExamStatus>) -> Result<Vec<Exam>, StoreError> {
        checked_exams(exams::list(&self.pool, status).await?)
    }

    async fn list_exams_for_student(&self, student_id: &str) -> Result<Vec<Exam>, StoreError> {
        checked_exams(exams::list_for_student(&self.pool, student_id).await?)
    }

    async fn insert_exam(&self, exam: &Exam, questions: &[Question]) -> Result<(), StoreError> {
        check_exam(exam)?;
        questions.iter().try_for_each(check_question)?;

        let mut tx = self.pool.begin().await?;
        exams::insert(&mut tx, exam)
            .await
            .map_err(|err| StoreError::from_write(err, || format!("exam {} already exists", exam.id)))?;
        questions::insert_many(&mut tx, questions).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_exam(&self, exam: &Exam, questions: &[Question]) -> Result<bool, StoreError> {
        check_exam(exam)?;
        questions.iter().try_for_each(check_question)?;

        let mut tx = self.pool.begin().await?;
        if !exams::update(&mut tx, exam).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        questions::delete_by_exam_in(&mut tx, &exam.id).await?;
        questions::insert_many(&mut tx, questions).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_exam_status(
        &self,
        exam_id: &str,
        status: ExamStatus,
        now: PrimitiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(exams::update_status(&self.pool, exam_id, status, now).await?)
    }

    async fn delete_exam(&self, exam_id: &str) -> Result<bool, StoreError> {
        Ok(exams::delete_by_id(&self.pool, exam_id).await?)
    }

    async fn list_questions(&self, exam_id: &str) -> Result<Vec<Question>, StoreError> {
        let questions = questions::list_by_exam(&self.pool, exam_id).await?;
        questions.iter().try_for_each(check_question)?;
        Ok(questions)
    }

    async fn delete_questions(&self, exam_id: &str) -> Result<u64, StoreError> {
        Ok(questions::delete_by_exam(&self.pool, exam_id).await?)
    }

    async fn submission_exists(&self, exam_id: &str, student_id: &str) -> Result<bool, StoreError> {
        Ok(submissions::exists(&self.pool, exam_id, student_id).await?)
    }

    async fn create_submission(&self, submission: NewSubmission) -> Result<Submission, StoreError> {
        check_new_submission(&submission)?;
        let id = Uuid::new_v4().to_string();
        let created = submissions::create(&self.pool, &id, &submission).await?;
        check_submission(&created)?;
        Ok(created)
    }

    async fn find_submission(&self, submission_id: &str) -> Result<Option<Submission>, StoreError> {
        let submission = submissions::find_by_id(&self.pool, submission_id).await?;
        if let Some(submission) = &submission {
            check_submission(submission)?;
        }
        Ok(submission)
    }

    async fn list_submissions_by_exam(&self, exam_id: &str) -> Result<Vec<Submission>, StoreError> {
        checked_submissions(submissions::list_by_exam(&self.pool, exam_id).await?)
    }

    async fn list_submissions_by_student(
        &self,
        student_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        checked_submissions(submissions::list_by_student(&self.pool, student_id).await?)
    }

    async fn delete_submissions(&self, exam_id: &str) -> Result<u64, StoreError> {
        Ok(submissions::delete_by_exam(&self.pool, exam_id).await?)
    }

    async fn list_recent_submissions(&self, limit: u32) -> Result<Vec<Submission>, StoreError> {
        checked_submissions(submissions::list_recent(&self.pool, i64::from(limit)).await?)
    }

    async fn find_student(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let student = students::find_by_id(&self.pool, student_id).await?;
        if let Some(student) = &student {
            check_student(student)?;
        }
        Ok(student)
    }

    async fn find_students(&self, student_ids: &[String]) -> Result<Vec<Student>, StoreError> {
        checked_students(students::find_many(&self.pool, student_ids).await?)
    }

    async fn list_students(
        &self,
        status: Option<StudentStatus>,
    ) -> Result<Vec<Student>, StoreError> {
        checked_students(students::list(&self.pool, status).await?)
    }

    async fn insert_student(&self, student: &Student) -> Result<(), StoreError> {
        check_student(student)?;
        students::insert(&self.pool, student).await.map_err(|err| {
            StoreError::from_write(err, || {
                format!("student {} clashes with an existing roster entry", student.id)
            })
        })
    }

    async fn update_student(&self, student: &Student) -> Result<bool, StoreError> {
        check_student(student)?;
        students::update(&self.pool, student).await.map_err(|err| {
            StoreError::from_write(err, || {
                format!("student number {} is already registered", student.student_number)
            })
        })
    }

    async fn portal_totals(&self) -> Result<PortalTotals, StoreError> {
        let (students, active_students) = students::count(&self.pool).await?;
        let submissions = submissions::count(&self.pool).await?;
        let exams_by_status: BTreeMap<&'static str, u64> = exams::count_by_status(&self.pool)
            .await?
            .into_iter()
            .map(|(status, count)| (status.as_str(), non_negative(count)))
            .collect();

        Ok(PortalTotals {
            students: non_negative(students),
            active_students: non_negative(active_students),
            submissions: non_negative(submissions),
            exams_by_status,
        })
    }
}
