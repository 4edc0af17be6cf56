use tracing::debug;

use altura_core::domain::conversation::{ConversationState, ProjectDetails};
use altura_core::flows::{Stage, StageOutcome};

use crate::replies;

use super::StageContext;

pub(super) fn greeting(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    state.restart();
    state.say(replies::welcome(&ctx.company));
    state.stage = Stage::Greeting;
    StageOutcome::Reply
}

/// Gathers project requirements one question at a time: height, then work type, then duration.
pub(super) async fn consultation(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let text = state.pending_user_text().unwrap_or_default().to_string();
    let extraction = ctx
        .extractor
        .extract_with_oracle(&text, &state.contact, &state.project, ctx.llm.as_ref())
        .await;

    let nothing_found = extraction.is_empty();
    let introduced = extraction.contact.name.is_some();
    state.contact.absorb(extraction.contact);
    let changed = state.project.merge(extraction.project, extraction.correction);
    state.stage = Stage::Consultation;
    debug!(
        user_id = %state.user_id,
        project_changed = changed,
        correction = extraction.correction,
        "consultation merged extraction"
    );

    if state.project.is_complete() {
        if state.needs_analysis() {
            state.say(replies::analysis_transition(&state.project));
            return StageOutcome::Reroute;
        }
        let follow_up = if state.recommended_equipment.is_empty() {
            replies::NO_MATCH
        } else {
            replies::ALREADY_RECOMMENDED
        };
        state.say(follow_up);
        return StageOutcome::Reply;
    }

    let question = if nothing_found && state.project == ProjectDetails::default() {
        replies::CLARIFICATION
    } else if state.project.height.is_none() {
        replies::ASK_HEIGHT
    } else if state.project.work_type.is_none() {
        replies::ASK_WORK_TYPE
    } else {
        replies::ASK_DURATION
    };

    match state.contact.name.as_deref().filter(|_| introduced) {
        Some(name) => state.say(format!("{}{question}", replies::greeting_prefix(name))),
        None => state.say(question),
    }
    StageOutcome::Reply
}

pub(super) fn company_information(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    state.say(replies::company_information(&ctx.company));
    state.stage = Stage::CompanyInformation;
    StageOutcome::Reply
}
