use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::Json;
use sqlx::{Connection, FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::AnswerPayload;
use crate::models::assessment_session::{AssessmentAnswer, AssessmentSession};
use crate::models::blueprint::{BlueprintRules, TestBlueprint};
use crate::models::question::{
    Difficulty, OptionView, Question, QuestionIntegrityError, QuestionKind, QuestionOption,
};
use crate::models::target::{
    AssessmentTarget, CourseAssessment, LessonAssessment, ModuleAssessment, TargetKind, TargetRef,
    TestAssessment,
};
use crate::models::test_session::{
    NewSessionQuestion, NewTestSession, SessionStatus, TestSession, TestSessionAnswer,
    TestSessionQuestion,
};
use crate::services::grading_service::{GradableAnswer, Marker, MarkingInput};
use crate::store::{AssessmentSessionStore, QuestionBankReader, TargetStore, TestSessionStore};

const SESSION_COLUMNS: &str = r#"
    s.id, s.user_id, s.test_assessment_id, s.blueprint_id, s.status, s.started_at,
    s.submitted_at, s.marked_at, s.score, s.ip_address, s.user_agent, t.duration_minutes
    FROM test_sessions s
    JOIN test_assessments t ON t.id = s.test_assessment_id
"#;

const QUESTION_COLUMNS: &str = r#"
    id, target_kind, target_id, difficulty, kind, text,
    is_true, correct_answer, is_active
    FROM questions
"#;

const ASSESSMENT_SESSION_COLUMNS: &str =
    "id, user_id, target_kind, target_id, started_at, completed_at, score";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs inside a savepoint of the submit transaction, so a failure
    /// here leaves the row lock in place.
    async fn mark_locked(
        conn: &mut PgConnection,
        session_id: Uuid,
        submitted_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<()> {
        sqlx::query("UPDATE test_sessions SET submitted_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(submitted_at)
            .execute(&mut *conn)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM test_session_questions WHERE test_session_id = $1",
        )
        .bind(session_id)
        .fetch_one(&mut *conn)
        .await?;

        let rows = sqlx::query_as::<_, GradeRow>(
            r#"SELECT a.id, sq.question_id, a.option_id, a.input
               FROM test_session_answers a
               JOIN test_session_questions sq ON sq.id = a.session_question_id
               WHERE sq.test_session_id = $1"#,
        )
        .bind(session_id)
        .fetch_all(&mut *conn)
        .await?;

        let input = gradable_input(&mut *conn, session_id, total, rows).await?;
        let marking = marker(&input)?;

        store_verdicts(&mut *conn, "test_session_answers", &marking.verdicts).await?;

        sqlx::query(
            r#"UPDATE test_sessions SET status = 'SUBMITTED', score = $2, marked_at = $3
               WHERE id = $1"#,
        )
        .bind(session_id)
        .bind(marking.score)
        .bind(submitted_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Flips a still-locked session to `ERROR` so it is never marked twice.
async fn flag_marking_failure(
    conn: &mut PgConnection,
    session_id: Uuid,
    submitted_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"UPDATE test_sessions SET status = 'ERROR', submitted_at = $2
           WHERE id = $1 AND submitted_at IS NULL"#,
    )
    .bind(session_id)
    .bind(submitted_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn marking_failure(session_id: Uuid, err: Error) -> Error {
    match err {
        err @ Error::TestSessionMarking { .. } => err,
        other => Error::TestSessionMarking {
            session_id,
            reason: other.to_string(),
        },
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    target_kind: String,
    target_id: i64,
    difficulty: Option<String>,
    kind: String,
    text: String,
    is_true: Option<bool>,
    correct_answer: Option<String>,
    is_active: bool,
}

#[derive(FromRow)]
struct OptionRow {
    id: i64,
    question_id: i64,
    text: String,
    is_correct: bool,
}

impl QuestionRow {
    fn into_question(
        self,
        options: Vec<QuestionOption>,
    ) -> std::result::Result<Question, QuestionIntegrityError> {
        let malformed = |reason: String| QuestionIntegrityError::Malformed {
            question_id: self.id,
            reason,
        };
        let kind = self.kind.parse::<QuestionKind>().map_err(|kind| {
            QuestionIntegrityError::UnsupportedKind {
                question_id: self.id,
                kind,
            }
        })?;
        let owner_kind = self.target_kind.parse::<TargetKind>().map_err(malformed)?;
        let difficulty = self
            .difficulty
            .as_deref()
            .map(str::parse::<Difficulty>)
            .transpose()
            .map_err(malformed)?;

        let question = Question {
            id: self.id,
            owner: TargetRef::new(owner_kind, self.target_id),
            difficulty,
            kind,
            text: self.text,
            is_true: self.is_true,
            correct_answer: self.correct_answer,
            options,
            is_active: self.is_active,
        };
        question.check_payload()?;
        Ok(question)
    }
}

async fn fetch_options(
    conn: &mut PgConnection,
    question_ids: &[i64],
) -> Result<HashMap<i64, Vec<QuestionOption>>> {
    let rows = sqlx::query_as::<_, OptionRow>(
        r#"SELECT id, question_id, text, is_correct FROM question_options
           WHERE question_id = ANY($1) ORDER BY id"#,
    )
    .bind(question_ids)
    .fetch_all(conn)
    .await?;

    let mut grouped: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
    for row in rows {
        grouped.entry(row.question_id).or_default().push(QuestionOption {
            id: row.id,
            question_id: row.question_id,
            text: row.text,
            is_correct: row.is_correct,
        });
    }
    Ok(grouped)
}

async fn assemble(
    conn: &mut PgConnection,
    rows: Vec<QuestionRow>,
) -> Result<Vec<std::result::Result<Question, QuestionIntegrityError>>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut options = fetch_options(conn, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let opts = options.remove(&row.id).unwrap_or_default();
            row.into_question(opts)
        })
        .collect())
}

/// Loads the given questions, including inactive ones. Ids with no row come
/// back as `Missing`.
async fn fetch_questions(
    conn: &mut PgConnection,
    question_ids: &[i64],
) -> Result<HashMap<i64, std::result::Result<Question, QuestionIntegrityError>>> {
    let sql = format!("SELECT {} WHERE id = ANY($1)", QUESTION_COLUMNS);
    let rows = sqlx::query_as::<_, QuestionRow>(&sql)
        .bind(question_ids)
        .fetch_all(&mut *conn)
        .await?;
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut loaded: HashMap<_, _> = ids.into_iter().zip(assemble(conn, rows).await?).collect();

    Ok(question_ids
        .iter()
        .map(|id| {
            let question = loaded
                .remove(id)
                .unwrap_or(Err(QuestionIntegrityError::Missing(*id)));
            (*id, question)
        })
        .collect())
}

#[derive(FromRow)]
struct GradeRow {
    id: Uuid,
    question_id: i64,
    option_id: Option<i64>,
    input: Option<String>,
}

async fn gradable_input(
    conn: &mut PgConnection,
    session_id: Uuid,
    total: i64,
    rows: Vec<GradeRow>,
) -> Result<MarkingInput> {
    let ids: Vec<i64> = rows.iter().map(|r| r.question_id).collect();
    let mut questions = fetch_questions(conn, &ids).await?;

    let mut answers = Vec::with_capacity(rows.len());
    for row in rows {
        let payload = AnswerPayload::from_columns(row.option_id, row.input).ok_or_else(|| {
            Error::TestSessionMarking {
                session_id,
                reason: format!("answer {} has no single recorded value", row.id),
            }
        })?;
        let question = questions
            .remove(&row.question_id)
            .unwrap_or(Err(QuestionIntegrityError::Missing(row.question_id)));
        answers.push(GradableAnswer {
            answer_id: row.id,
            question_id: row.question_id,
            payload,
            question,
        });
    }

    Ok(MarkingInput {
        session_id,
        total_questions: usize::try_from(total).unwrap_or_default(),
        answers,
    })
}

async fn store_verdicts(
    conn: &mut PgConnection,
    table: &'static str,
    verdicts: &[(Uuid, bool)],
) -> Result<()> {
    if verdicts.is_empty() {
        return Ok(());
    }
    let (ids, flags): (Vec<Uuid>, Vec<bool>) = verdicts.iter().copied().unzip();
    let sql = format!(
        r#"UPDATE {} AS a SET is_correct = v.is_correct
           FROM UNNEST($1::uuid[], $2::bool[]) AS v(id, is_correct)
           WHERE a.id = v.id"#,
        table
    );
    sqlx::query(&sql).bind(ids).bind(flags).execute(conn).await?;
    Ok(())
}

#[derive(FromRow)]
struct BlueprintRow {
    id: i64,
    test_assessment_id: i64,
    difficulty: String,
    rules: Json<BlueprintRules>,
    created_by: Option<Uuid>,
    is_active: bool,
}

impl TryFrom<BlueprintRow> for TestBlueprint {
    type Error = Error;

    fn try_from(row: BlueprintRow) -> Result<Self> {
        let difficulty = row.difficulty.parse::<Difficulty>().map_err(Error::InvalidBlueprint)?;
        row.rules.0.validate()?;
        Ok(Self {
            id: row.id,
            test_assessment_id: row.test_assessment_id,
            difficulty,
            rules: row.rules.0,
            created_by: row.created_by,
            is_active: row.is_active,
        })
    }
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    test_assessment_id: i64,
    blueprint_id: Option<i64>,
    status: String,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    marked_at: Option<DateTime<Utc>>,
    score: Decimal,
    ip_address: Option<IpNetwork>,
    user_agent: Option<String>,
    duration_minutes: Option<i32>,
}

impl TryFrom<SessionRow> for TestSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        let status = row.status.parse::<SessionStatus>().map_err(Error::Internal)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            test_assessment_id: row.test_assessment_id,
            blueprint_id: row.blueprint_id,
            status,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            marked_at: row.marked_at,
            score: row.score,
            ip_address: row.ip_address.map(|net| net.ip()),
            user_agent: row.user_agent,
            duration_minutes: row.duration_minutes,
        })
    }
}

#[derive(FromRow)]
struct SessionQuestionRow {
    id: Uuid,
    test_session_id: Uuid,
    question_id: i64,
    question_kind: String,
    position: i32,
    snapshot_text: String,
    snapshot_options: Json<Vec<OptionView>>,
}

impl TryFrom<SessionQuestionRow> for TestSessionQuestion {
    type Error = Error;

    fn try_from(row: SessionQuestionRow) -> Result<Self> {
        let question_kind = row.question_kind.parse::<QuestionKind>().map_err(|kind| {
            Error::Internal(format!(
                "session question {} has unknown kind '{}'",
                row.id, kind
            ))
        })?;
        Ok(Self {
            id: row.id,
            test_session_id: row.test_session_id,
            question_id: row.question_id,
            question_kind,
            order: row.position,
            snapshot_text: row.snapshot_text,
            snapshot_options: row.snapshot_options.0,
        })
    }
}

#[derive(FromRow)]
struct TestAnswerRow {
    id: Uuid,
    session_question_id: Uuid,
    option_id: Option<i64>,
    input: Option<String>,
    is_correct: Option<bool>,
    answered_at: DateTime<Utc>,
}

impl TryFrom<TestAnswerRow> for TestSessionAnswer {
    type Error = Error;

    fn try_from(row: TestAnswerRow) -> Result<Self> {
        let payload = AnswerPayload::from_columns(row.option_id, row.input)
            .ok_or_else(|| Error::Internal(format!("answer {} has no single value", row.id)))?;
        Ok(Self {
            id: row.id,
            session_question_id: row.session_question_id,
            payload,
            is_correct: row.is_correct,
            answered_at: row.answered_at,
        })
    }
}

#[derive(FromRow)]
struct AssessmentSessionRow {
    id: Uuid,
    user_id: Uuid,
    target_kind: String,
    target_id: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    score: Option<Decimal>,
}

impl TryFrom<AssessmentSessionRow> for AssessmentSession {
    type Error = Error;

    fn try_from(row: AssessmentSessionRow) -> Result<Self> {
        let kind = row.target_kind.parse::<TargetKind>().map_err(Error::Internal)?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            target: TargetRef::new(kind, row.target_id),
            started_at: row.started_at,
            completed_at: row.completed_at,
            score: row.score,
        })
    }
}

#[derive(FromRow)]
struct AssessmentAnswerRow {
    id: Uuid,
    assessment_session_id: Uuid,
    question_id: i64,
    option_id: Option<i64>,
    input: Option<String>,
    is_correct: Option<bool>,
    answered_at: DateTime<Utc>,
}

impl TryFrom<AssessmentAnswerRow> for AssessmentAnswer {
    type Error = Error;

    fn try_from(row: AssessmentAnswerRow) -> Result<Self> {
        let payload = AnswerPayload::from_columns(row.option_id, row.input)
            .ok_or_else(|| Error::Internal(format!("answer {} has no single value", row.id)))?;
        Ok(Self {
            id: row.id,
            assessment_session_id: row.assessment_session_id,
            question_id: row.question_id,
            payload,
            is_correct: row.is_correct,
            answered_at: row.answered_at,
        })
    }
}

#[async_trait]
impl QuestionBankReader for PgStore {
    async fn pool_for(
        &self,
        target: TargetRef,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Question>> {
        let sql = format!(
            r#"SELECT {} WHERE target_kind = $1 AND target_id = $2 AND is_active
               AND ($3::text IS NULL OR difficulty = $3) ORDER BY id"#,
            QUESTION_COLUMNS
        );
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, QuestionRow>(&sql)
            .bind(target.kind.as_str())
            .bind(target.id)
            .bind(difficulty.map(|d| d.as_str()))
            .fetch_all(&mut *conn)
            .await?;

        let questions = assemble(&mut conn, rows)
            .await?
            .into_iter()
            .filter_map(|q| match q {
                Ok(question) => Some(question),
                Err(e) => {
                    tracing::warn!(%target, error = %e, "skipping malformed question");
                    None
                }
            })
            .collect();
        Ok(questions)
    }

    async fn question(&self, question_id: i64) -> Result<Option<Question>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = fetch_questions(&mut conn, &[question_id]).await?;
        match found.remove(&question_id) {
            Some(Ok(question)) => Ok(Some(question)),
            Some(Err(QuestionIntegrityError::Missing(_))) | None => Ok(None),
            Some(Err(e)) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TargetStore for PgStore {
    async fn test_assessment_for_category(
        &self,
        category_id: i64,
    ) -> Result<Option<TestAssessment>> {
        let test = sqlx::query_as::<_, TestAssessment>(
            r#"SELECT id, category_id, description, duration_minutes
               FROM test_assessments WHERE category_id = $1"#,
        )
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(test)
    }

    async fn find_target(&self, target: TargetRef) -> Result<Option<AssessmentTarget>> {
        let found = match target.kind {
            TargetKind::Test => sqlx::query_as::<_, TestAssessment>(
                "SELECT id, category_id, description, duration_minutes FROM test_assessments WHERE id = $1",
            )
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentTarget::TimedTest),
            TargetKind::Lesson => sqlx::query_as::<_, LessonAssessment>(
                "SELECT id, lesson_id, course_id FROM lesson_assessments WHERE id = $1",
            )
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentTarget::Lesson),
            TargetKind::Module => sqlx::query_as::<_, ModuleAssessment>(
                "SELECT id, module_id, course_id FROM module_assessments WHERE id = $1",
            )
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentTarget::Module),
            TargetKind::Course => sqlx::query_as::<_, CourseAssessment>(
                "SELECT id, course_id, title FROM course_assessments WHERE id = $1",
            )
            .bind(target.id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentTarget::Course),
        };
        Ok(found)
    }

    async fn active_blueprint(
        &self,
        test_assessment_id: i64,
        difficulty: Difficulty,
    ) -> Result<Option<TestBlueprint>> {
        let row = sqlx::query_as::<_, BlueprintRow>(
            r#"SELECT id, test_assessment_id, difficulty, rules, created_by, is_active
               FROM test_blueprints
               WHERE test_assessment_id = $1 AND difficulty = $2 AND is_active
               ORDER BY id DESC LIMIT 1"#,
        )
        .bind(test_assessment_id)
        .bind(difficulty.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestBlueprint::try_from).transpose()
    }
}

#[async_trait]
impl TestSessionStore for PgStore {
    async fn create_test_session(
        &self,
        session: NewTestSession,
        questions: Vec<NewSessionQuestion>,
        started_at: DateTime<Utc>,
    ) -> Result<TestSession> {
        let session_id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO test_sessions
                (id, user_id, test_assessment_id, blueprint_id, status, started_at, ip_address, user_agent)
               VALUES ($1, $2, $3, $4, 'IN_PROGRESS', $5, $6, $7)"#,
        )
        .bind(session_id)
        .bind(session.user_id)
        .bind(session.test_assessment_id)
        .bind(session.blueprint_id)
        .bind(started_at)
        .bind(session.ip_address.map(IpNetwork::from))
        .bind(session.user_agent)
        .execute(&mut *tx)
        .await?;

        for q in questions {
            sqlx::query(
                r#"INSERT INTO test_session_questions
                    (id, test_session_id, question_id, question_kind, position, snapshot_text, snapshot_options)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(q.question_id)
            .bind(q.question_kind.as_str())
            .bind(q.order)
            .bind(q.snapshot_text)
            .bind(Json(q.snapshot_options))
            .execute(&mut *tx)
            .await?;
        }

        let sql = format!("SELECT {} WHERE s.id = $1", SESSION_COLUMNS);
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn test_session(&self, session_id: Uuid) -> Result<Option<TestSession>> {
        let sql = format!("SELECT {} WHERE s.id = $1", SESSION_COLUMNS);
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .map(TestSession::try_from)
            .transpose()
    }

    async fn test_sessions_for_user(&self, user_id: Uuid) -> Result<Vec<TestSession>> {
        let sql = format!(
            "SELECT {} WHERE s.user_id = $1 ORDER BY s.started_at DESC",
            SESSION_COLUMNS
        );
        sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(TestSession::try_from)
            .collect()
    }

    async fn session_questions(&self, session_id: Uuid) -> Result<Vec<TestSessionQuestion>> {
        sqlx::query_as::<_, SessionQuestionRow>(
            r#"SELECT id, test_session_id, question_id, question_kind, position,
                      snapshot_text, snapshot_options
               FROM test_session_questions WHERE test_session_id = $1 ORDER BY position"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TestSessionQuestion::try_from)
        .collect()
    }

    async fn session_question(
        &self,
        session_id: Uuid,
        question_id: i64,
    ) -> Result<Option<TestSessionQuestion>> {
        sqlx::query_as::<_, SessionQuestionRow>(
            r#"SELECT id, test_session_id, question_id, question_kind, position,
                      snapshot_text, snapshot_options
               FROM test_session_questions WHERE test_session_id = $1 AND question_id = $2"#,
        )
        .bind(session_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?
        .map(TestSessionQuestion::try_from)
        .transpose()
    }

    async fn session_answers(&self, session_id: Uuid) -> Result<Vec<TestSessionAnswer>> {
        sqlx::query_as::<_, TestAnswerRow>(
            r#"SELECT a.id, a.session_question_id, a.option_id, a.input, a.is_correct, a.answered_at
               FROM test_session_answers a
               JOIN test_session_questions sq ON sq.id = a.session_question_id
               WHERE sq.test_session_id = $1
               ORDER BY sq.position"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(TestSessionAnswer::try_from)
        .collect()
    }

    async fn upsert_test_answer(
        &self,
        session_id: Uuid,
        session_question_id: Uuid,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<TestSessionAnswer> {
        let mut tx = self.pool.begin().await?;
        let submitted: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT submitted_at FROM test_sessions WHERE id = $1 FOR SHARE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        match submitted {
            None => return Err(Error::NoTestSession(session_id)),
            Some(Some(_)) => return Err(Error::AlreadySubmitted(session_id)),
            Some(None) => {}
        }

        let row = sqlx::query_as::<_, TestAnswerRow>(
            r#"INSERT INTO test_session_answers (id, session_question_id, option_id, input, is_correct, answered_at)
               VALUES ($1, $2, $3, $4, NULL, $5)
               ON CONFLICT (session_question_id) DO UPDATE
               SET option_id = EXCLUDED.option_id,
                   input = EXCLUDED.input,
                   is_correct = NULL,
                   answered_at = EXCLUDED.answered_at
               RETURNING id, session_question_id, option_id, input, is_correct, answered_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(session_question_id)
        .bind(payload.option_id())
        .bind(payload.input())
        .bind(answered_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn submit_test_session(
        &self,
        session_id: Uuid,
        submitted_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<TestSession> {
        let mut tx = self.pool.begin().await?;
        let locked: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT submitted_at FROM test_sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;
        match locked {
            None => return Err(Error::NoTestSession(session_id)),
            Some(Some(_)) => return Err(Error::AlreadySubmitted(session_id)),
            Some(None) => {}
        }

        let mut savepoint = tx.begin().await?;
        match Self::mark_locked(&mut savepoint, session_id, submitted_at, marker).await {
            Ok(()) => {
                savepoint.commit().await?;
                tx.commit().await?;
            }
            Err(err) => {
                savepoint.rollback().await?;
                flag_marking_failure(&mut tx, session_id, submitted_at).await?;
                tx.commit().await?;
                return Err(marking_failure(session_id, err));
            }
        }

        self.test_session(session_id)
            .await?
            .ok_or(Error::NoTestSession(session_id))
    }
}

#[async_trait]
impl AssessmentSessionStore for PgStore {
    async fn open_assessment_session(
        &self,
        user_id: Uuid,
        target: TargetRef,
        now: DateTime<Utc>,
    ) -> Result<AssessmentSession> {
        let mut tx = self.pool.begin().await?;

        let insert = format!(
            r#"INSERT INTO assessment_sessions (id, user_id, target_kind, target_id, started_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (user_id, target_kind, target_id) WHERE completed_at IS NULL DO NOTHING
               RETURNING {}"#,
            ASSESSMENT_SESSION_COLUMNS
        );
        let created = sqlx::query_as::<_, AssessmentSessionRow>(&insert)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(target.kind.as_str())
            .bind(target.id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let row = match created {
            Some(row) => row,
            None => {
                let select = format!(
                    r#"SELECT {} FROM assessment_sessions
                       WHERE user_id = $1 AND target_kind = $2 AND target_id = $3
                         AND completed_at IS NULL
                       FOR UPDATE"#,
                    ASSESSMENT_SESSION_COLUMNS
                );
                let open = sqlx::query_as::<_, AssessmentSessionRow>(&select)
                    .bind(user_id)
                    .bind(target.kind.as_str())
                    .bind(target.id)
                    .fetch_one(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM assessment_answers WHERE assessment_session_id = $1")
                    .bind(open.id)
                    .execute(&mut *tx)
                    .await?;
                open
            }
        };

        tx.commit().await?;
        row.try_into()
    }

    async fn assessment_session(&self, session_id: Uuid) -> Result<Option<AssessmentSession>> {
        let sql = format!(
            "SELECT {} FROM assessment_sessions WHERE id = $1",
            ASSESSMENT_SESSION_COLUMNS
        );
        sqlx::query_as::<_, AssessmentSessionRow>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?
            .map(AssessmentSession::try_from)
            .transpose()
    }

    async fn assessment_answers(&self, session_id: Uuid) -> Result<Vec<AssessmentAnswer>> {
        sqlx::query_as::<_, AssessmentAnswerRow>(
            r#"SELECT id, assessment_session_id, question_id, option_id, input, is_correct, answered_at
               FROM assessment_answers WHERE assessment_session_id = $1 ORDER BY answered_at"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AssessmentAnswer::try_from)
        .collect()
    }

    async fn upsert_assessment_answer(
        &self,
        session_id: Uuid,
        question_id: i64,
        payload: AnswerPayload,
        answered_at: DateTime<Utc>,
    ) -> Result<AssessmentAnswer> {
        let mut tx = self.pool.begin().await?;
        let completed: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            "SELECT completed_at FROM assessment_sessions WHERE id = $1 FOR SHARE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?;
        match completed {
            None => return Err(Error::NoAssessmentSession(session_id)),
            Some(Some(_)) => return Err(Error::AlreadySubmitted(session_id)),
            Some(None) => {}
        }

        let row = sqlx::query_as::<_, AssessmentAnswerRow>(
            r#"INSERT INTO assessment_answers
                (id, assessment_session_id, question_id, option_id, input, is_correct, answered_at)
               VALUES ($1, $2, $3, $4, $5, NULL, $6)
               ON CONFLICT (assessment_session_id, question_id) DO UPDATE
               SET option_id = EXCLUDED.option_id,
                   input = EXCLUDED.input,
                   is_correct = NULL,
                   answered_at = EXCLUDED.answered_at
               RETURNING id, assessment_session_id, question_id, option_id, input, is_correct, answered_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(question_id)
        .bind(payload.option_id())
        .bind(payload.input())
        .bind(answered_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn complete_assessment_session(
        &self,
        session_id: Uuid,
        completed_at: DateTime<Utc>,
        marker: &Marker,
    ) -> Result<AssessmentSession> {
        let mut tx = self.pool.begin().await?;

        let select = format!(
            "SELECT {} FROM assessment_sessions WHERE id = $1 FOR UPDATE",
            ASSESSMENT_SESSION_COLUMNS
        );
        let session: AssessmentSession = sqlx::query_as::<_, AssessmentSessionRow>(&select)
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::NoAssessmentSession(session_id))?
            .try_into()?;
        if session.is_completed() {
            return Err(Error::AlreadySubmitted(session_id));
        }

        let pool: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM questions WHERE target_kind = $1 AND target_id = $2 AND is_active",
        )
        .bind(session.target.kind.as_str())
        .bind(session.target.id)
        .fetch_all(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, GradeRow>(
            r#"SELECT id, question_id, option_id, input FROM assessment_answers
               WHERE assessment_session_id = $1 AND question_id = ANY($2)"#,
        )
        .bind(session_id)
        .bind(&pool)
        .fetch_all(&mut *tx)
        .await?;

        let total = i64::try_from(pool.len()).unwrap_or(i64::MAX);
        let input = gradable_input(&mut *tx, session_id, total, rows).await?;
        let marking = marker(&input)?;
        store_verdicts(&mut *tx, "assessment_answers", &marking.verdicts).await?;

        let update = format!(
            "UPDATE assessment_sessions SET completed_at = $2, score = $3 WHERE id = $1 RETURNING {}",
            ASSESSMENT_SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, AssessmentSessionRow>(&update)
            .bind(session_id)
            .bind(completed_at)
            .bind(marking.score)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }
}
