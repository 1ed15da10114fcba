mod common;

use assessment_engine::{
    error::Error,
    models::target::{CompletionSubject, TargetKind, TargetRef},
    store::AssessmentSessionStore,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use common::*;

fn lesson() -> TargetRef {
    TargetRef::new(TargetKind::Lesson, LESSON_ASSESSMENT_ID)
}

#[tokio::test]
async fn lesson_quiz_is_marked_against_its_active_questions() {
    let store = seeded_store();
    let state = app_state(store.clone());
    let user = Uuid::new_v4();

    let session = state.assessment_service.start(user, lesson()).await.unwrap();
    let (_, questions) = state.assessment_service.get(user, session.id).await.unwrap();
    let mut ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    ids.sort();
    assert_eq!(ids, vec![20, 21, 22]);

    for id in [20, 21] {
        state
            .answer_service
            .save_assessment_answer(user, session.id, id, &correct_answer(id))
            .await
            .unwrap();
    }
    state
        .answer_service
        .save_assessment_answer(user, session.id, 22, &wrong_answer(22))
        .await
        .unwrap();

    let outcome = state
        .assessment_service
        .submit(user, session.id, lesson())
        .await
        .unwrap();
    assert_eq!(outcome.score, Decimal::new(6667, 2));
    assert!(outcome.passed);
    assert_eq!(
        outcome.next_step,
        CompletionSubject::Lesson {
            lesson_id: LESSON_ID,
            course_id: COURSE_ID
        }
    );
    assert!(outcome.session.is_completed());

    let verdicts: Vec<(i64, Option<bool>)> = store
        .assessment_answers(session.id)
        .await
        .unwrap()
        .into_iter()
        .map(|a| (a.question_id, a.is_correct))
        .collect();
    assert!(verdicts.contains(&(20, Some(true))));
    assert!(verdicts.contains(&(22, Some(false))));

    let again = state.assessment_service.submit(user, session.id, lesson()).await;
    assert!(matches!(again, Err(Error::AlreadySubmitted(_))));
    let late = state
        .answer_service
        .save_assessment_answer(user, session.id, 20, &correct_answer(20))
        .await;
    assert!(matches!(late, Err(Error::AlreadySubmitted(_))));
}

#[tokio::test]
async fn restarting_an_open_quiz_wipes_its_answers() {
    let store = seeded_store();
    let state = app_state(store.clone());
    let user = Uuid::new_v4();

    let first = state.assessment_service.start(user, lesson()).await.unwrap();
    state
        .answer_service
        .save_assessment_answer(user, first.id, 20, &correct_answer(20))
        .await
        .unwrap();

    let second = state.assessment_service.start(user, lesson()).await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(store.assessment_answers(first.id).await.unwrap().is_empty());

    let outcome = state
        .assessment_service
        .submit(user, second.id, lesson())
        .await
        .unwrap();
    assert_eq!(outcome.score, Decimal::ZERO);
    assert!(!outcome.passed);

    // a completed attempt stays as history; the next start is a new session
    let third = state.assessment_service.start(user, lesson()).await.unwrap();
    assert_ne!(third.id, second.id);
}

#[tokio::test]
async fn answers_must_belong_to_the_quiz() {
    let state = app_state(seeded_store());
    let user = Uuid::new_v4();
    let session = state.assessment_service.start(user, lesson()).await.unwrap();

    let from_test = state
        .answer_service
        .save_assessment_answer(user, session.id, 2, &json!("true"))
        .await;
    assert!(matches!(
        from_test,
        Err(Error::QuestionNotInSession { question_id: 2, .. })
    ));

    let retired = state
        .answer_service
        .save_assessment_answer(user, session.id, INACTIVE_LESSON_QUESTION, &json!("true"))
        .await;
    assert!(matches!(retired, Err(Error::QuestionNotInSession { .. })));

    let someone_else = state
        .answer_service
        .save_assessment_answer(Uuid::new_v4(), session.id, 20, &json!("true"))
        .await;
    assert!(matches!(someone_else, Err(Error::NotOwner)));

    let missing = state
        .answer_service
        .save_assessment_answer(user, Uuid::new_v4(), 20, &json!("true"))
        .await;
    assert!(matches!(missing, Err(Error::NoAssessmentSession(_))));
}

#[tokio::test]
async fn submit_checks_the_target_in_the_path() {
    let state = app_state(seeded_store());
    let user = Uuid::new_v4();
    let session = state.assessment_service.start(user, lesson()).await.unwrap();

    let wrong_target = state
        .assessment_service
        .submit(user, session.id, TargetRef::new(TargetKind::Module, LESSON_ASSESSMENT_ID))
        .await;
    assert!(matches!(wrong_target, Err(Error::NoAssessmentSession(id)) if id == session.id));

    let stranger = state
        .assessment_service
        .submit(Uuid::new_v4(), session.id, lesson())
        .await;
    assert!(matches!(stranger, Err(Error::NotOwner)));
}

#[tokio::test]
async fn starting_resolves_the_target_kind() {
    let state = app_state(seeded_store());
    let user = Uuid::new_v4();

    assert!(matches!(
        state
            .assessment_service
            .start(user, TargetRef::new(TargetKind::Lesson, 99))
            .await,
        Err(Error::NoLessonAssessment(99))
    ));
    assert!(matches!(
        state
            .assessment_service
            .start(user, TargetRef::new(TargetKind::Course, 99))
            .await,
        Err(Error::NoCourseAssessment(99))
    ));
    assert!(matches!(
        state
            .assessment_service
            .start(user, TargetRef::new(TargetKind::Test, TEST_ID))
            .await,
        Err(Error::BadRequest(_))
    ));
}

#[tokio::test]
async fn passing_a_module_quiz_points_at_the_module() {
    let state = app_state(seeded_store());
    let user = Uuid::new_v4();
    let module = TargetRef::new(TargetKind::Module, MODULE_ASSESSMENT_ID);

    let session = state.assessment_service.start(user, module).await.unwrap();
    assert_eq!(session.target, module);
    for id in [40, 41] {
        state
            .answer_service
            .save_assessment_answer(user, session.id, id, &correct_answer(id))
            .await
            .unwrap();
    }

    let outcome = state
        .assessment_service
        .submit(user, session.id, module)
        .await
        .unwrap();
    assert_eq!(outcome.score, Decimal::from(100));
    assert!(outcome.passed);
    assert_eq!(
        outcome.next_step,
        CompletionSubject::Module {
            module_id: MODULE_ID,
            course_id: COURSE_ID
        }
    );
}

#[tokio::test]
async fn course_quiz_is_scored_over_the_pool_active_at_submit() {
    let store = seeded_store();
    let state = app_state(store.clone());
    let user = Uuid::new_v4();
    let course = TargetRef::new(TargetKind::Course, COURSE_ASSESSMENT_ID);

    let session = state.assessment_service.start(user, course).await.unwrap();
    state
        .answer_service
        .save_assessment_answer(user, session.id, 50, &correct_answer(50))
        .await
        .unwrap();
    state
        .answer_service
        .save_assessment_answer(user, session.id, 51, &wrong_answer(51))
        .await
        .unwrap();

    // retiring the missed question shrinks the denominator
    store.deactivate_question(51).unwrap();

    let outcome = state
        .assessment_service
        .submit(user, session.id, course)
        .await
        .unwrap();
    assert_eq!(outcome.score, Decimal::from(100));
    assert!(outcome.passed);
    assert_eq!(
        outcome.next_step,
        CompletionSubject::Course {
            course_id: COURSE_ID
        }
    );
}
