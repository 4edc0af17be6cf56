mod support;

use rust_decimal::Decimal;

use altura_agent::replies;
use altura_core::config::AppConfig;
use altura_core::cpq::Catalog;
use altura_core::domain::conversation::{DurationUnit, OutboundReply, RentalDuration};
use altura_core::domain::equipment::EquipmentId;
use altura_core::flows::Stage;
use altura_db::{ConversationRepository, QuotationRepository};

use support::{
    harness, harness_with_hops, standard_catalog, text, upload, user, ScriptedDocuments, ScriptedLlm,
};

fn texts(replies: &[OutboundReply]) -> Vec<&str> {
    replies.iter().map(OutboundReply::log_text).collect()
}

#[tokio::test]
async fn full_request_yields_recommendations_in_one_turn() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), standard_catalog());

    let result = h.runtime.handle(text("necesito un andamio para 6 metros, mantenimiento, por 2 semanas")).await;

    assert!(!result.superseded);
    assert_eq!(result.stage, Stage::Recommendation);
    assert_eq!(result.hops, 3);
    let replies = texts(&result.replies);
    assert_eq!(replies.len(), 2);
    assert!(replies[0].contains("altura de 6m"));
    assert!(replies[1].contains("Recomendaciones para tu proyecto"));

    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    assert_eq!(state.project.height, Some(Decimal::from(6)));
    assert_eq!(state.project.work_type.as_deref(), Some("mantenimiento"));
    assert_eq!(state.project.duration, Some(RentalDuration::new(2, DurationUnit::Weeks)));
    assert!(!state.recommended_equipment.is_empty());
    assert!(state.recommended_equipment.len() <= 3);
    assert!(state.recommended_equipment.iter().all(|item| item.max_height >= Decimal::from(6)));
    // user message, transition, recommendations
    assert_eq!(state.message_log.len(), 3);
}

#[tokio::test]
async fn quote_request_runs_through_documents_to_delivery() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), standard_catalog());

    h.runtime.handle(text("Hola, soy Ana Gómez. Necesito andamio para 6 metros de mantenimiento por 10 días")).await;

    let asked = h.runtime.handle(text("quiero cotizar, mi correo es ana@andes.co y mi celular 300 123 4567")).await;
    assert_eq!(asked.stage, Stage::DocumentCollection);
    let asked_text = texts(&asked.replies).join("\n");
    assert!(asked_text.contains("RUT"));
    assert!(!asked_text.contains("teléfono"));

    let delivered = h.runtime.handle(upload("rut_andes.pdf")).await;
    assert_eq!(delivered.stage, Stage::CommercialNotification);
    let sent = &delivered.replies;
    assert!(texts(sent)[0].contains("Constructora Andes SAS"));
    assert!(texts(sent).iter().any(|reply| reply.contains("Cotización Generada")));
    assert!(sent.iter().any(|reply| matches!(reply, OutboundReply::Document { .. })));
    let company = AppConfig::default().company;
    assert_eq!(texts(sent).last().copied(), Some(replies::commercial_confirmation(&company).as_str()));

    let records = h.quotations.list_for_user(&user()).await.expect("records");
    assert_eq!(records.len(), 1);
    let quotation = &records[0].quotation;
    assert_eq!(quotation.rental_days, 10);
    let scaffold = quotation
        .lines
        .iter()
        .find(|line| line.equipment_id == EquipmentId(6))
        .expect("6m scaffold line");
    assert_eq!(scaffold.amount, Decimal::from(405_000));

    let deals = h.notifier.deals.lock().expect("deals");
    assert_eq!(deals.len(), 1);
    assert_eq!(deals[0].contact.phone.as_deref(), Some("+573001234567"));
    assert_eq!(deals[0].contact.tax_id.as_deref(), Some("900123456-7"));
    assert_eq!(deals[0].contact.name.as_deref(), Some("Ana Gómez"));
}

#[tokio::test]
async fn pricing_intent_without_tax_id_collects_documents() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), standard_catalog());
    h.runtime.handle(text("andamio para 6 metros, construcción, por 1 mes")).await;
    h.runtime.handle(text("mi correo es compras@obra.co, cel 3109876543")).await;

    let result = h.runtime.handle(text("quiero cotizar")).await;

    assert_eq!(result.stage, Stage::DocumentCollection);
    assert!(h.renderer.requests.lock().expect("requests").is_empty());
    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    assert!(state.quote_requested);
    assert!(state.quotation.is_none());
}

#[tokio::test]
async fn unreadable_document_asks_for_resend_and_stays_pending() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::unreadable(), standard_catalog());
    h.runtime.handle(text("andamio para 6 metros, mantenimiento, por 2 semanas")).await;

    let result = h.runtime.handle(upload("rut.pdf")).await;

    assert_eq!(texts(&result.replies), vec![replies::DOCUMENT_RETRY]);
    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    let document = state.tax_document().expect("rut registered");
    assert!(document.awaiting_processing());
    assert_eq!(document.attempts, 1);
    assert!(!state.has_tax_id());
}

#[tokio::test]
async fn question_after_unreadable_upload_is_answered() {
    let h = harness(ScriptedLlm::routing_to("company_info"), ScriptedDocuments::unreadable(), standard_catalog());
    h.runtime.handle(upload("rut_andes.pdf")).await;

    let result = h.runtime.handle(text("¿dónde están ubicados?")).await;

    assert_eq!(result.stage, Stage::CompanyInformation);
    assert!(!texts(&result.replies).contains(&replies::DOCUMENT_RETRY));
    assert!(texts(&result.replies)[0].contains("Bogotá"));
    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    assert_eq!(state.tax_document().expect("rut registered").attempts, 1);
}

#[tokio::test]
async fn empty_catalog_offers_human_escalation() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), Catalog::default());

    let result = h.runtime.handle(text("necesito un andamio para 6 metros, mantenimiento, por 2 semanas")).await;

    assert_eq!(texts(&result.replies).last().copied(), Some(replies::NO_MATCH));
    assert_eq!(result.stage, Stage::Recommendation);
}

#[tokio::test]
async fn hop_ceiling_ends_turn_with_fallback() {
    let h = harness_with_hops(
        ScriptedLlm::routing_to("consultation"),
        ScriptedDocuments::andes(),
        standard_catalog(),
        2,
    );

    let result = h.runtime.handle(text("necesito un andamio para 6 metros, mantenimiento, por 2 semanas")).await;

    assert_eq!(result.hops, 2);
    assert_eq!(texts(&result.replies).last().copied(), Some(replies::STUCK));
    assert!(h.audit.event_types().contains(&"turn.hop_ceiling".to_owned()));
    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    assert_eq!(state.message_log.last().map(|entry| entry.text.as_str()), Some(replies::STUCK));
}

#[tokio::test]
async fn oracle_outage_still_answers() {
    let h = harness(ScriptedLlm::offline(), ScriptedDocuments::andes(), standard_catalog());

    let result = h.runtime.handle(text("buenas tardes, tengo una duda")).await;

    assert_eq!(result.stage, Stage::Consultation);
    assert_eq!(texts(&result.replies), vec![replies::CLARIFICATION]);
}

#[tokio::test]
async fn classification_routes_company_questions() {
    let llm = ScriptedLlm::routing_to("consultation").then_label("company_info");
    let h = harness(llm, ScriptedDocuments::andes(), standard_catalog());

    let result = h.runtime.handle(text("¿dónde tienen sede ustedes?")).await;

    assert_eq!(result.stage, Stage::CompanyInformation);
    assert!(texts(&result.replies)[0].contains("Bogotá"));
}

#[tokio::test]
async fn start_command_greets_and_keeps_contact() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), standard_catalog());
    h.runtime.handle(text("mi correo es ana@andes.co, necesito andamio para 6 metros")).await;

    let result = h.runtime.handle(text("/start")).await;

    assert_eq!(result.stage, Stage::Greeting);
    assert_eq!(result.hops, 1);
    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    assert_eq!(state.contact.email.as_deref(), Some("ana@andes.co"));
    assert_eq!(state.project.height, None);
}

#[tokio::test]
async fn superseded_turn_persists_but_does_not_deliver() {
    let h = harness(ScriptedLlm::routing_to("consultation"), ScriptedDocuments::andes(), standard_catalog());
    let first = h.runtime.admit(&user());
    let second = h.runtime.admit(&user());

    let stale = h.runtime.handle_turn(first, text("necesito un andamio")).await;
    assert!(stale.superseded);
    assert!(stale.replies.is_empty());

    let fresh = h.runtime.handle_turn(second, text("para 6 metros")).await;
    assert!(!fresh.superseded);
    assert!(!fresh.replies.is_empty());

    let state = h.conversations.find(&user(), 50).await.expect("load").expect("stored");
    let log: Vec<&str> = state.message_log.iter().map(|entry| entry.text.as_str()).collect();
    assert_eq!(log.first().copied(), Some("necesito un andamio"));
    assert!(log.contains(&"para 6 metros"));
    assert_eq!(state.project.height, Some(Decimal::from(6)));
}
