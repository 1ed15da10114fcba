#![allow(dead_code)]

use std::sync::Arc;

use assessment_engine::{
    config::{Config, LogFormat},
    models::blueprint::{BlueprintRules, TestBlueprint},
    models::question::{Difficulty, NewOption, Question},
    models::target::{
        AssessmentTarget, CourseAssessment, LessonAssessment, ModuleAssessment, TargetKind,
        TargetRef, TestAssessment,
    },
    store::{memory::MemoryStore, Stores},
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

pub const CATEGORY_ID: i64 = 7;
pub const TEST_ID: i64 = 1;
pub const TEST_DURATION_MINUTES: i32 = 30;

/// A second timed test whose only question has no option flagged correct.
pub const BROKEN_CATEGORY_ID: i64 = 8;
pub const BROKEN_TEST_ID: i64 = 2;

pub const LESSON_ASSESSMENT_ID: i64 = 11;
pub const LESSON_ID: i64 = 21;
pub const COURSE_ID: i64 = 3;
pub const INACTIVE_LESSON_QUESTION: i64 = 23;

pub const MODULE_ASSESSMENT_ID: i64 = 12;
pub const MODULE_ID: i64 = 31;
pub const COURSE_ASSESSMENT_ID: i64 = 13;

pub fn config() -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        jwt_secret: JWT_SECRET.to_string(),
        questions_per_session: 4,
        pass_threshold: Decimal::from(50),
        selection_seed: Some(42),
        log_format: LogFormat::Pretty,
    }
}

fn mcq(id: i64, owner: TargetRef, difficulty: Option<Difficulty>, correct: Option<i64>) -> Question {
    let options = (1..=4)
        .map(|n| {
            let option_id = id * 100 + n;
            NewOption::new(option_id, format!("option {}", n), Some(option_id) == correct)
        })
        .collect();
    Question::multiple_choice(id, owner, difficulty, format!("question {}", id), options)
        .expect("valid mcq")
}

/// Test 1 has two EASY, two NORMAL and three HARD questions alongside an
/// active NORMAL blueprint of 50% easy and 25% normal. Lesson assessment 11
/// has three active questions and one inactive. Module assessment 12 and
/// course assessment 13 both belong to course 3 and have two questions each.
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    let test = TargetRef::new(TargetKind::Test, TEST_ID);
    let lesson = TargetRef::new(TargetKind::Lesson, LESSON_ASSESSMENT_ID);
    let module = TargetRef::new(TargetKind::Module, MODULE_ASSESSMENT_ID);
    let course = TargetRef::new(TargetKind::Course, COURSE_ASSESSMENT_ID);

    store
        .insert_test_assessment(TestAssessment {
            id: TEST_ID,
            category_id: CATEGORY_ID,
            description: Some("Rust fundamentals".to_string()),
            duration_minutes: Some(TEST_DURATION_MINUTES),
        })
        .expect("test");
    store
        .insert_blueprint(
            TestBlueprint::new(
                1,
                TEST_ID,
                Difficulty::Normal,
                BlueprintRules {
                    easy: Some(Decimal::new(5, 1)),
                    normal: Some(Decimal::new(25, 2)),
                    hard: None,
                },
            )
            .expect("blueprint"),
        )
        .expect("insert blueprint");

    let easy = Some(Difficulty::Easy);
    let normal = Some(Difficulty::Normal);
    let hard = Some(Difficulty::Hard);
    let questions = vec![
        mcq(1, test, easy, Some(102)),
        Question::true_false(2, test, easy, "The borrow checker runs at compile time", true)
            .expect("tf"),
        Question::fill_in_blank(3, test, normal, "Capital of France", "Paris").expect("fib"),
        mcq(4, test, normal, Some(401)),
        Question::true_false(5, test, hard, "Rust has a garbage collector", false).expect("tf"),
        Question::fill_in_blank(6, test, hard, "Language with a crab mascot", "Rust")
            .expect("fib"),
        Question::true_false(7, test, hard, "Traits can have default methods", true)
            .expect("tf"),
        Question::true_false(20, lesson, None, "Slices borrow their data", true).expect("tf"),
        Question::fill_in_blank(21, lesson, None, "Each value has one ...", "ownership")
            .expect("fib"),
        mcq(22, lesson, None, Some(2203)),
        Question::true_false(INACTIVE_LESSON_QUESTION, lesson, None, "Retired question", true)
            .expect("tf")
            .inactive(),
        Question::true_false(40, module, None, "Modules can be nested", true).expect("tf"),
        Question::fill_in_blank(41, module, None, "Keyword that exports an item", "pub")
            .expect("fib"),
        mcq(50, course, None, Some(5002)),
        Question::true_false(51, course, None, "Cargo is Rust's package manager", true)
            .expect("tf"),
    ];
    for question in questions {
        store.insert_question(question).expect("insert question");
    }

    store
        .insert_target(AssessmentTarget::Lesson(LessonAssessment {
            id: LESSON_ASSESSMENT_ID,
            lesson_id: LESSON_ID,
            course_id: COURSE_ID,
        }))
        .expect("lesson");
    store
        .insert_target(AssessmentTarget::Module(ModuleAssessment {
            id: MODULE_ASSESSMENT_ID,
            module_id: MODULE_ID,
            course_id: COURSE_ID,
        }))
        .expect("module");
    store
        .insert_target(AssessmentTarget::Course(CourseAssessment {
            id: COURSE_ASSESSMENT_ID,
            course_id: COURSE_ID,
            title: "Rust final exam".to_string(),
        }))
        .expect("course");

    let broken = TargetRef::new(TargetKind::Test, BROKEN_TEST_ID);
    store
        .insert_test_assessment(TestAssessment {
            id: BROKEN_TEST_ID,
            category_id: BROKEN_CATEGORY_ID,
            description: None,
            duration_minutes: None,
        })
        .expect("broken test");
    store
        .insert_blueprint(
            TestBlueprint::new(
                2,
                BROKEN_TEST_ID,
                Difficulty::Easy,
                BlueprintRules {
                    easy: Some(Decimal::ONE),
                    normal: None,
                    hard: None,
                },
            )
            .expect("blueprint"),
        )
        .expect("insert blueprint");
    store
        .insert_question(mcq(30, broken, easy, None))
        .expect("insert question");

    Arc::new(store)
}

/// The answer a client would send to get `question_id` right.
pub fn correct_answer(question_id: i64) -> JsonValue {
    match question_id {
        1 => json!(102),
        2 => json!("true"),
        3 => json!("Paris"),
        4 => json!(401),
        5 => json!("false"),
        6 => json!("Rust"),
        7 => json!(true),
        20 => json!("True"),
        21 => json!(" Ownership "),
        22 => json!(2203),
        40 => json!("true"),
        41 => json!("pub"),
        50 => json!(5002),
        51 => json!("true"),
        other => panic!("no fixture answer for question {}", other),
    }
}

/// An answer of the right shape that is never correct.
pub fn wrong_answer(question_id: i64) -> JsonValue {
    match question_id {
        1 | 4 | 22 | 30 | 50 => json!(question_id * 100 + 4),
        _ => json!("definitely wrong"),
    }
}

pub fn app_state(store: Arc<MemoryStore>) -> AppState {
    AppState::new(Stores::shared(store), &config())
}

pub fn bearer(user_id: Uuid) -> String {
    let claims = assessment_engine::middleware::auth::Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: Some("student".to_string()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token");
    format!("Bearer {}", token)
}
