//! Database query functions for the `quizzes`, `answer_keys` and
//! `quiz_attempts` tables.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{AnswerKeyRecord, AnswerPair, QuizAttemptRecord, QuizRecord, StoredQuestion};

/// Fields required to insert a quiz together with its answer key.
#[derive(Debug)]
pub struct NewQuiz<'a> {
    pub id: Uuid,
    pub title: Option<&'a str>,
    pub resource_ids: &'a [Uuid],
    pub questions: &'a [StoredQuestion],
    /// question_id -> correct option_id.
    pub key_entries: &'a BTreeMap<Uuid, String>,
}

/// Insert a quiz and its answer key inside a single transaction.
///
/// Both rows land atomically: if either insert fails (including a duplicate
/// quiz id -- the create-if-absent guarantee comes from the primary keys),
/// the whole operation is rolled back.
pub async fn insert_quiz_with_key(pool: &PgPool, new: &NewQuiz<'_>) -> Result<QuizRecord> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let quiz = sqlx::query_as::<_, QuizRecord>(
        "INSERT INTO quizzes (id, title, resource_ids, questions, total_questions) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.title)
    .bind(Json(new.resource_ids))
    .bind(Json(new.questions))
    .bind(new.questions.len() as i32)
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert quiz")?;

    sqlx::query("INSERT INTO answer_keys (quiz_id, entries) VALUES ($1, $2)")
        .bind(new.id)
        .bind(Json(new.key_entries))
        .execute(&mut *tx)
        .await
        .context("failed to insert answer key")?;

    tx.commit().await.context("failed to commit transaction")?;

    Ok(quiz)
}

/// Fetch a quiz by its ID.
pub async fn get_quiz(pool: &PgPool, id: Uuid) -> Result<Option<QuizRecord>> {
    let quiz = sqlx::query_as::<_, QuizRecord>("SELECT * FROM quizzes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch quiz")?;

    Ok(quiz)
}

/// Fetch the answer key for a quiz.
pub async fn get_answer_key(pool: &PgPool, quiz_id: Uuid) -> Result<Option<AnswerKeyRecord>> {
    let key = sqlx::query_as::<_, AnswerKeyRecord>("SELECT * FROM answer_keys WHERE quiz_id = $1")
        .bind(quiz_id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch answer key")?;

    Ok(key)
}

/// Append one grading attempt for a quiz.
pub async fn insert_attempt(
    pool: &PgPool,
    quiz_id: Uuid,
    score: f64,
    correct_count: i32,
    answers: &[AnswerPair],
) -> Result<QuizAttemptRecord> {
    let attempt = sqlx::query_as::<_, QuizAttemptRecord>(
        "INSERT INTO quiz_attempts (quiz_id, score, correct_count, answers) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(quiz_id)
    .bind(score)
    .bind(correct_count)
    .bind(Json(answers))
    .fetch_one(pool)
    .await
    .context("failed to insert quiz attempt")?;

    Ok(attempt)
}

/// List all attempts for a quiz, oldest first.
pub async fn list_attempts(pool: &PgPool, quiz_id: Uuid) -> Result<Vec<QuizAttemptRecord>> {
    let attempts = sqlx::query_as::<_, QuizAttemptRecord>(
        "SELECT * FROM quiz_attempts WHERE quiz_id = $1 ORDER BY id",
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await
    .context("failed to list quiz attempts")?;

    Ok(attempts)
}
