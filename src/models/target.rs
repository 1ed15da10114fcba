use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::Result;
use crate::models::question::{Difficulty, Question};
use crate::store::QuestionBankReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Test,
    Lesson,
    Module,
    Course,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Test => "test",
            TargetKind::Lesson => "lesson",
            TargetKind::Module => "module",
            TargetKind::Course => "course",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(TargetKind::Test),
            "lesson" => Ok(TargetKind::Lesson),
            "module" => Ok(TargetKind::Module),
            "course" => Ok(TargetKind::Course),
            other => Err(format!("unknown assessment kind '{}'", other)),
        }
    }
}

/// Polymorphic reference to the assessment that owns a question set.
/// `id` is the assessment's own id, not the lesson/module/course id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: i64,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TestAssessment {
    pub id: i64,
    pub category_id: i64,
    pub description: Option<String>,
    pub duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LessonAssessment {
    pub id: i64,
    pub lesson_id: i64,
    pub course_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ModuleAssessment {
    pub id: i64,
    pub module_id: i64,
    pub course_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CourseAssessment {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssessmentTarget {
    TimedTest(TestAssessment),
    Lesson(LessonAssessment),
    Module(ModuleAssessment),
    Course(CourseAssessment),
}

/// The entity the platform is told about once an assessment is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionSubject {
    Category { category_id: i64 },
    Lesson { lesson_id: i64, course_id: i64 },
    Module { module_id: i64, course_id: i64 },
    Course { course_id: i64 },
}

impl AssessmentTarget {
    pub fn target_ref(&self) -> TargetRef {
        match self {
            AssessmentTarget::TimedTest(t) => TargetRef::new(TargetKind::Test, t.id),
            AssessmentTarget::Lesson(l) => TargetRef::new(TargetKind::Lesson, l.id),
            AssessmentTarget::Module(m) => TargetRef::new(TargetKind::Module, m.id),
            AssessmentTarget::Course(c) => TargetRef::new(TargetKind::Course, c.id),
        }
    }

    pub fn duration_minutes(&self) -> Option<i32> {
        match self {
            AssessmentTarget::TimedTest(t) => t.duration_minutes,
            _ => None,
        }
    }

    /// Active questions owned by this target. Only timed tests are tiered,
    /// so `difficulty` is ignored for quizzes.
    pub async fn question_pool(
        &self,
        bank: &dyn QuestionBankReader,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Question>> {
        let difficulty = match self {
            AssessmentTarget::TimedTest(_) => difficulty,
            _ => None,
        };
        bank.pool_for(self.target_ref(), difficulty).await
    }

    pub fn on_complete(&self) -> CompletionSubject {
        match self {
            AssessmentTarget::TimedTest(t) => CompletionSubject::Category {
                category_id: t.category_id,
            },
            AssessmentTarget::Lesson(l) => CompletionSubject::Lesson {
                lesson_id: l.lesson_id,
                course_id: l.course_id,
            },
            AssessmentTarget::Module(m) => CompletionSubject::Module {
                module_id: m.module_id,
                course_id: m.course_id,
            },
            AssessmentTarget::Course(c) => CompletionSubject::Course {
                course_id: c.course_id,
            },
        }
    }
}
