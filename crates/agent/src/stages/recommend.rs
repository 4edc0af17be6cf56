use tracing::info;

use altura_core::cpq::{infer_category, CatalogQuery};
use altura_core::domain::conversation::ConversationState;
use altura_core::domain::equipment::Equipment;
use altura_core::flows::{Stage, StageOutcome};
use altura_core::text::{fold, words};

use crate::replies;

use super::StageContext;

const MAX_RECOMMENDATIONS: usize = 3;
const ORDINALS: &[(&str, usize)] = &[
    ("primera", 1),
    ("primero", 1),
    ("primer", 1),
    ("segunda", 2),
    ("segundo", 2),
    ("tercera", 3),
    ("tercero", 3),
    ("tercer", 3),
];
const OPTION_MARKERS: &[&str] = &["opcion", "la", "el", "numero", "nro"];

/// Replaces the recommendations with the best matches for the current project.
pub(super) fn analysis(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let category = infer_category(state.project.work_type.as_deref(), state.project.height);
    let mut query = CatalogQuery { category: Some(category.to_string()), min_height: state.project.height };
    let mut found = ctx.catalog.find(&query);
    if found.is_empty() {
        query.category = None;
        found = ctx.catalog.find(&query);
    }

    state.recommended_equipment = found.into_iter().take(MAX_RECOMMENDATIONS).cloned().collect();
    state.analyzed_project = Some(state.project.clone());
    state.stage = Stage::Analysis;
    info!(
        user_id = %state.user_id,
        category,
        matches = state.recommended_equipment.len(),
        "analysis selected equipment"
    );
    StageOutcome::Chain(Stage::Recommendation)
}

pub(super) fn recommendation(state: &mut ConversationState) -> StageOutcome {
    let text = if state.recommended_equipment.is_empty() {
        replies::NO_MATCH.to_string()
    } else {
        replies::recommendations(&state.recommended_equipment, &state.project)
    };
    state.say(text);
    state.stage = Stage::Recommendation;
    StageOutcome::Reply
}

pub(super) fn equipment_detail(state: &mut ConversationState, ctx: &StageContext) -> StageOutcome {
    let text = state.pending_user_text().unwrap_or_default().to_string();
    let catalog = ctx.catalog.find(&CatalogQuery::default());
    let chosen = referenced_option(&text, &state.recommended_equipment)
        .or_else(|| referenced_by_name(&text, state.recommended_equipment.iter()))
        .or_else(|| referenced_by_name(&text, catalog.into_iter()))
        .cloned();

    match chosen {
        Some(item) => {
            state.say(replies::equipment_detail(&item));
            state.stage = Stage::EquipmentDetail;
        }
        None => state.say(replies::equipment_not_identified(&state.recommended_equipment)),
    }
    StageOutcome::Reply
}

/// "opción 2", "la 2", "la segunda" or a bare number within range.
fn referenced_option<'a>(text: &str, items: &'a [Equipment]) -> Option<&'a Equipment> {
    let tokens = words(text);
    let position = tokens.iter().enumerate().find_map(|(index, token)| {
        if let Some((_, position)) = ORDINALS.iter().find(|(word, _)| *word == token.as_str()) {
            return Some(*position);
        }
        let number = token.parse::<usize>().ok()?;
        let marked = index
            .checked_sub(1)
            .and_then(|previous| tokens.get(previous))
            .is_some_and(|previous| OPTION_MARKERS.contains(&previous.as_str()));
        (marked || tokens.len() == 1).then_some(number)
    })?;
    position.checked_sub(1).and_then(|index| items.get(index))
}

/// Item sharing the most significant name words with the message.
fn referenced_by_name<'a>(
    text: &str,
    items: impl Iterator<Item = &'a Equipment>,
) -> Option<&'a Equipment> {
    let tokens = words(text);
    let mut best: Option<(&Equipment, usize)> = None;
    for item in items {
        let score = words(&fold(&item.name))
            .iter()
            .filter(|word| word.chars().count() > 3 && tokens.contains(word))
            .count();
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((item, score));
        }
    }
    best.map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use altura_core::cpq::Catalog;
    use altura_core::domain::conversation::{ConversationState, DurationUnit, RentalDuration};
    use altura_core::domain::equipment::EquipmentId;
    use altura_core::flows::{Stage, StageOutcome};

    use crate::replies;
    use crate::stages::fixtures::{context, default_context, item, state, texts, FixedIdentity};

    use super::{analysis, equipment_detail, recommendation};

    fn project_state(height: i64, work_type: &str) -> ConversationState {
        let mut state = state("por 2 semanas");
        state.project.height = Some(Decimal::from(height));
        state.project.work_type = Some(work_type.to_owned());
        state.project.duration = Some(RentalDuration::new(2, DurationUnit::Weeks));
        state
    }

    #[test]
    fn analysis_keeps_three_shortest_adequate_items() {
        let ctx = default_context();
        let mut state = project_state(6, "mantenimiento");

        assert_eq!(analysis(&mut state, &ctx), StageOutcome::Chain(Stage::Recommendation));
        let ids: Vec<EquipmentId> = state.recommended_equipment.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![EquipmentId(3), EquipmentId(4), EquipmentId(5)]);
        assert!(state.recommended_equipment.iter().all(|item| item.max_height >= Decimal::from(6)));
        assert!(!state.needs_analysis());
    }

    #[test]
    fn empty_category_retries_without_it() {
        let ctx = context(
            Catalog::new(vec![item(6, "Elevador Tijera 12m", "elevadores", 12, 180_000)]),
            FixedIdentity(Ok(Default::default())),
            Default::default(),
            Default::default(),
        );
        let mut state = project_state(6, "mantenimiento");

        analysis(&mut state, &ctx);
        assert_eq!(state.recommended_equipment.len(), 1);
        assert_eq!(state.recommended_equipment[0].id, EquipmentId(6));
    }

    #[test]
    fn new_analysis_replaces_previous_recommendations() {
        let ctx = default_context();
        let mut state = project_state(6, "mantenimiento");
        analysis(&mut state, &ctx);

        state.project.height = Some(Decimal::from(12));
        assert!(state.needs_analysis());
        analysis(&mut state, &ctx);
        assert_eq!(state.recommended_equipment.len(), 1);
        assert_eq!(state.recommended_equipment[0].id, EquipmentId(6));
    }

    #[test]
    fn no_match_offers_escalation() {
        let ctx = context(
            Catalog::default(),
            FixedIdentity(Ok(Default::default())),
            Default::default(),
            Default::default(),
        );
        let mut state = project_state(6, "mantenimiento");

        analysis(&mut state, &ctx);
        assert!(state.recommended_equipment.is_empty());
        assert_eq!(recommendation(&mut state), StageOutcome::Reply);
        assert_eq!(texts(&state), vec![replies::NO_MATCH.to_owned()]);
        assert_eq!(state.stage, Stage::Recommendation);
    }

    #[test]
    fn recommendation_lists_every_option() {
        let ctx = default_context();
        let mut state = project_state(6, "mantenimiento");
        analysis(&mut state, &ctx);
        recommendation(&mut state);

        let text = &texts(&state)[0];
        assert!(text.contains("Opción 1: Andamio Multidireccional 6m"));
        assert!(text.contains("Opción 3: Andamio Certificado 10m"));
        assert!(text.contains("$45,000 por día"));
    }

    #[test]
    fn detail_resolves_number_ordinal_and_name() {
        let ctx = default_context();
        let mut state = state("cuéntame de la opción 2");
        state.recommended_equipment = vec![
            item(3, "Andamio Multidireccional 6m", "andamios", 6, 45_000),
            item(4, "Andamio Colgante 8m", "andamios", 8, 60_000),
        ];

        equipment_detail(&mut state, &ctx);
        assert!(texts(&state)[0].contains("**Andamio Colgante 8m**"));
        assert_eq!(state.stage, Stage::EquipmentDetail);

        state.record_user_message("y la primera?");
        equipment_detail(&mut state, &ctx);
        assert!(texts(&state)[1].contains("**Andamio Multidireccional 6m**"));

        state.record_user_message("¿qué tal el elevador tijera?");
        equipment_detail(&mut state, &ctx);
        let detail = &texts(&state)[2];
        assert!(detail.contains("**Elevador Tijera 12m**"));
        assert!(detail.contains("Arnés obligatorio"));
        assert!(detail.contains("capacidad carga: 150kg"));
    }

    #[test]
    fn detail_without_recommendations_asks_for_project() {
        let ctx = default_context();
        let mut state = state("¿qué equipo me sirve?");
        equipment_detail(&mut state, &ctx);
        assert!(texts(&state)[0].contains(replies::ASK_HEIGHT));
        assert_eq!(state.stage, Stage::Greeting);
    }
}
