//! Session fixtures shared by the report tests.

#![allow(clippy::unwrap_used)]

use snapps_workflow::{
    CaseContext, EvaluatedDiagnosis, FeedbackDetail, FeedbackRecord, Patient, Plausibility,
    ProbeAnswer, SessionState, StageId, StageInput, WorkflowKind,
};

pub fn case() -> CaseContext {
    let mut case = CaseContext::new("cp-01", "crushing chest pain for 2 hours");
    case.title = "Chest pain in the ED".to_string();
    case.patient = Patient {
        age: Some(58),
        sex: Some("male".to_string()),
    };
    case
}

pub fn input_for(stage: StageId) -> StageInput {
    match stage {
        StageId::Narrow => StageInput::list(["STEMI", "Aortic dissection"]),
        StageId::Probe => StageInput::list(["Should I get a CT before the cath lab?"]),
        other => StageInput::text(format!("Answer for {other}")),
    }
}

pub fn feedback_for(stage: StageId, submission: snapps_workflow::SubmissionId) -> FeedbackRecord {
    let record = FeedbackRecord::new(stage, submission, format!("Guidance for {stage}"))
        .with_strengths(vec!["Organized presentation".to_string()])
        .with_gaps(vec![format!("Missing detail in {stage}")])
        .with_follow_ups(vec!["Review ACS guidelines".to_string()]);
    match stage {
        StageId::Narrow => record.with_detail(FeedbackDetail::Differential {
            evaluated: vec![
                EvaluatedDiagnosis {
                    diagnosis: "STEMI".to_string(),
                    plausibility: Plausibility::Likely,
                    rationale: Some("ST elevation in V2-V4".to_string()),
                },
                EvaluatedDiagnosis {
                    diagnosis: "Aortic dissection".to_string(),
                    plausibility: Plausibility::MustNotMiss,
                    rationale: None,
                },
            ],
        }),
        StageId::Probe => record.with_detail(FeedbackDetail::Probe {
            answers: vec![ProbeAnswer {
                question: "Should I get a CT before the cath lab?".to_string(),
                answer: "Only if dissection remains a concern.".to_string(),
            }],
        }),
        _ => record,
    }
}

/// Completes the current stage with `input`.
pub fn complete_current(session: &mut SessionState, input: StageInput) {
    let submission = session.draft_submission(input).unwrap();
    let stage = submission.stage_id;
    let id = session.record_submission(submission).unwrap();
    session.record_feedback(feedback_for(stage, id)).unwrap();
    session.advance();
}

/// A SNAPPS session with the first `stages` stages completed.
pub fn session_through(stages: usize) -> SessionState {
    let mut session = SessionState::new(WorkflowKind::Snapps.catalog(), case());
    for _ in 0..stages {
        let stage = session.current_stage().unwrap().id;
        complete_current(&mut session, input_for(stage));
    }
    session
}

pub fn completed_session() -> SessionState {
    session_through(6)
}
