use tracing::{info, warn};

use altura_core::domain::conversation::{ConversationState, DocumentKind};
use altura_core::flows::{Stage, StageOutcome};

use crate::replies;

use super::StageContext;

/// Asks for exactly the quoting requirements still missing.
pub(super) fn collection(state: &mut ConversationState) -> StageOutcome {
    state.quote_requested = true;
    let missing = state.missing_quote_requirements();
    state.stage = Stage::DocumentCollection;

    if missing.is_empty() {
        state.say(replies::ALL_COLLECTED);
        return StageOutcome::Chain(Stage::QuotationGeneration);
    }
    state.say(replies::missing_requirements(&missing));
    StageOutcome::Reply
}

pub(super) async fn processing(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let key = DocumentKind::TaxId.key();
    let Some(document) = state.documents.get_mut(key) else {
        state.say(replies::DOCUMENT_REQUEST);
        return StageOutcome::Reply;
    };
    document.attempts += 1;
    document.fresh_upload = false;
    let attempt = document.attempts;
    let document = document.clone();

    match ctx.documents.extract_identity(&document).await {
        Ok(identity) => {
            let company = identity.company_name.clone();
            let mut update = identity.into_contact();
            if state.contact.email.is_some() {
                update.email = None;
            }
            state.contact.absorb(update);
            if let Some(record) = state.documents.get_mut(key) {
                record.processed = true;
            }
            state.stage = Stage::DocumentProcessing;
            info!(user_id = %state.user_id, attempt, "identity document processed");

            state.say(replies::document_processed(company.as_deref()));
            if state.quote_requested && !state.recommended_equipment.is_empty() {
                StageOutcome::Reroute
            } else {
                StageOutcome::Reply
            }
        }
        Err(error) => {
            warn!(user_id = %state.user_id, attempt, error = %error, "identity document extraction failed");
            state.say(replies::DOCUMENT_RETRY);
            StageOutcome::Reply
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use altura_core::domain::conversation::{DocumentKind, DocumentRecord, QuoteRequirement};
    use altura_core::flows::{Stage, StageOutcome};

    use crate::llm::OracleError;
    use crate::oracle::CompanyIdentity;
    use crate::replies;
    use crate::stages::fixtures::{catalog, context, item, state, texts, FixedIdentity};

    use super::{collection, processing};

    fn with_rut(identity: Result<CompanyIdentity, OracleError>) -> crate::stages::StageContext {
        context(catalog(), FixedIdentity(identity), Arc::default(), Arc::default())
    }

    #[test]
    fn collection_asks_only_for_missing_fields() {
        let mut state = state("quiero cotizar");
        state.contact.phone = Some("+573001234567".to_owned());

        assert_eq!(collection(&mut state), StageOutcome::Reply);
        assert!(state.quote_requested);
        assert_eq!(state.missing_quote_requirements(), vec![QuoteRequirement::Email, QuoteRequirement::TaxId]);
        let reply = &texts(&state)[0];
        assert!(reply.contains("email"));
        assert!(!reply.contains("teléfono"));
    }

    #[test]
    fn complete_requirements_chain_to_generation() {
        let mut state = state("quiero cotizar");
        state.contact.phone = Some("+573001234567".to_owned());
        state.contact.email = Some("compras@andes.co".to_owned());
        state.contact.tax_id = Some("900123456-7".to_owned());

        assert_eq!(collection(&mut state), StageOutcome::Chain(Stage::QuotationGeneration));
        assert_eq!(texts(&state), vec![replies::ALL_COLLECTED.to_owned()]);
    }

    #[tokio::test]
    async fn failed_extraction_keeps_document_pending() {
        let ctx = with_rut(Err(OracleError::InvalidResponse("documento ilegible".to_owned())));
        let mut state = state("Documento enviado: rut.pdf");
        state.register_document(DocumentRecord::uploaded(DocumentKind::TaxId, "rut.pdf", "/tmp/rut.pdf"));

        assert_eq!(processing(&mut state, &ctx).await, StageOutcome::Reply);
        let document = state.tax_document().expect("document");
        assert!(document.awaiting_processing());
        assert_eq!(document.attempts, 1);
        assert!(!document.fresh_upload);
        assert!(state.pending_tax_document(3).is_none());
        assert_eq!(texts(&state), vec![replies::DOCUMENT_RETRY.to_owned()]);
        assert_ne!(state.stage, Stage::DocumentProcessing);
    }

    #[tokio::test]
    async fn extracted_identity_fills_contact_and_resumes_quote() {
        let ctx = with_rut(Ok(CompanyIdentity {
            company_name: Some("Constructora Andes SAS".to_owned()),
            tax_id: Some("900123456-7".to_owned()),
            address: Some("Calle 80 # 10-20".to_owned()),
            email: Some("facturas@andes.co".to_owned()),
        }));
        let mut state = state("Documento enviado: rut.pdf");
        state.contact.email = Some("ana@andes.co".to_owned());
        state.quote_requested = true;
        state.recommended_equipment = vec![item(3, "Andamio Multidireccional 6m", "andamios", 6, 45_000)];
        state.register_document(DocumentRecord::uploaded(DocumentKind::TaxId, "rut.pdf", "/tmp/rut.pdf"));

        assert_eq!(processing(&mut state, &ctx).await, StageOutcome::Reroute);
        assert!(state.has_tax_id());
        assert_eq!(state.contact.company.as_deref(), Some("Constructora Andes SAS"));
        assert_eq!(state.contact.email.as_deref(), Some("ana@andes.co"));
        assert_eq!(state.stage, Stage::DocumentProcessing);
        assert!(texts(&state)[0].contains("Constructora Andes SAS"));
    }
}
