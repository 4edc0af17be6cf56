use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use altura_core::cpq::PricingEngine as _;
use altura_core::domain::conversation::{rental_days, ConversationState, OutboundReply};
use altura_core::domain::equipment::EquipmentId;
use altura_core::domain::quotation::{Quotation, QuotationId};
use altura_core::flows::{Stage, StageOutcome};
use altura_db::{QuotationRecord, QuotationRepository as _};

use crate::collaborators::{DealSummary, RenderRequest};
use crate::replies;

use super::StageContext;

/// Prices the recommended equipment and renders the quotation document. An existing quotation
/// is reused while the equipment and rental days stay the same.
pub(super) async fn generation(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    if state.recommended_equipment.is_empty() {
        state.say(replies::NO_EQUIPMENT);
        return StageOutcome::Reply;
    }

    let days = rental_days(state.project.duration, ctx.conversation.default_rental_days);
    let ids: Vec<EquipmentId> = state.recommended_equipment.iter().map(|item| item.id).collect();
    let reusable = state.quotation.as_ref().is_some_and(|quotation| quotation.covers(&ids, days));

    let quotation = match state.quotation.clone().filter(|_| reusable) {
        Some(quotation) => quotation,
        None => {
            let priced = match ctx.pricing.price(&state.recommended_equipment, days) {
                Ok(priced) => priced,
                Err(error) => {
                    error!(user_id = %state.user_id, error = %error, "quotation pricing failed");
                    state.say(replies::RENDER_FAILED);
                    return StageOutcome::Reply;
                }
            };
            let quotation = Quotation {
                id: QuotationId(format!("COT-{}", Uuid::new_v4().simple())),
                rental_days: days,
                currency: ctx.company.currency.clone(),
                lines: priced.lines,
                subtotal: priced.subtotal,
                tax_rate: priced.tax_rate,
                tax: priced.tax,
                total: priced.total,
                created_at: Utc::now(),
            };
            state.quotation = Some(quotation.clone());
            state.quotation_document = None;
            state.quotation_sent = false;
            state.commercial_notified = false;
            quotation
        }
    };

    if state.quotation_document.is_none() {
        let request = RenderRequest {
            user_id: state.user_id.clone(),
            contact: state.contact.clone(),
            project: state.project.clone(),
            quotation: quotation.clone(),
        };
        match ctx.renderer.render_quote(&request).await {
            Ok(document) => state.quotation_document = Some(document),
            Err(error) => {
                error!(user_id = %state.user_id, quotation_id = %quotation.id.0, error = %error, "quotation rendering failed");
                state.say(replies::RENDER_FAILED);
                return StageOutcome::Reply;
            }
        }
    }

    info!(
        user_id = %state.user_id,
        quotation_id = %quotation.id.0,
        rental_days = days,
        total = %quotation.total,
        reused = reusable,
        "quotation generated"
    );
    state.say(replies::quotation_summary(&quotation, &state.contact, &ctx.company, &ctx.pricing_config));
    state.stage = Stage::QuotationGeneration;
    StageOutcome::Chain(Stage::QuotationDelivery)
}

pub(super) async fn delivery(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let Some(document) = state.quotation_document.clone() else {
        state.say(replies::NO_DOCUMENT);
        return StageOutcome::Reply;
    };

    state.emit(OutboundReply::Document {
        document: document.clone(),
        caption: replies::delivery_caption(&ctx.company),
    });
    state.quotation_sent = true;
    state.quote_requested = false;
    state.stage = Stage::QuotationDelivery;

    if let Some(quotation) = state.quotation.clone() {
        let record = QuotationRecord { user_id: state.user_id.clone(), quotation, document: Some(document) };
        if let Err(error) = ctx.quotations.save(record).await {
            warn!(user_id = %state.user_id, error = %error, "failed to store delivered quotation");
        }
    }
    StageOutcome::Chain(Stage::CommercialNotification)
}

/// Last stage of the chain. Always succeeds from the customer's point of view.
pub(super) async fn notification(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let reply = match (state.commercial_notified, state.quotation.clone()) {
        (false, Some(quotation)) => {
            let deal = DealSummary {
                user_id: state.user_id.clone(),
                display_name: state.display_name.clone(),
                contact: state.contact.clone(),
                project: state.project.clone(),
                quotation,
                document: state.quotation_document.clone(),
            };
            match ctx.notifier.notify(&deal).await {
                Ok(()) => {
                    info!(user_id = %state.user_id, "commercial team notified");
                    replies::commercial_confirmation(&ctx.company)
                }
                Err(error) => {
                    error!(user_id = %state.user_id, error = %error, "commercial notification failed");
                    replies::commercial_fallback(&ctx.company)
                }
            }
        }
        _ => replies::commercial_fallback(&ctx.company),
    };

    state.say(reply);
    state.commercial_notified = true;
    state.stage = Stage::CommercialNotification;
    StageOutcome::Reply
}
