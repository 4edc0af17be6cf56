//! Customer-facing texts.

use rust_decimal::{Decimal, RoundingStrategy};

use altura_core::config::{CompanyConfig, PricingConfig};
use altura_core::domain::conversation::{Contact, ProjectDetails, QuoteRequirement};
use altura_core::domain::equipment::Equipment;
use altura_core::domain::quotation::{Quotation, RateTier};

pub const CLARIFICATION: &str = "No estoy seguro de entender completamente tu solicitud. ¿Podrías ayudarme proporcionando más detalles sobre:\n\n- ¿Qué altura necesitas alcanzar?\n- ¿Qué tipo de trabajo vas a realizar?\n- ¿Por cuánto tiempo necesitas el equipo?\n\nEsto me ayudará a recomendarte la mejor opción. 😊";
pub const ASK_HEIGHT: &str = "¿Qué altura necesitas alcanzar? Puedes decírmela en metros o en número de pisos. 📏";
pub const ASK_WORK_TYPE: &str = "¿Qué tipo de trabajo vas a realizar? Por ejemplo mantenimiento, construcción, pintura, limpieza o instalación. 🛠️";
pub const ASK_DURATION: &str = "¿Por cuánto tiempo necesitas el equipo? Puedes indicarlo en días, semanas o meses. 📅";
pub const ALREADY_RECOMMENDED: &str = "Ya tengo tus recomendaciones listas. ¿Quieres que prepare la cotización de estas opciones, o tienes alguna pregunta sobre algún equipo? 😊";
pub const NO_MATCH: &str = "Lo siento, no encontré equipos específicos para tu proyecto en este momento.\n\nPero no te preocupes, nuestro equipo comercial puede ayudarte a encontrar la solución perfecta.\n¿Te gustaría que un especialista se ponga en contacto contigo?";
pub const ALL_COLLECTED: &str = "¡Perfecto! Ya tengo todo lo necesario. Estoy generando tu cotización ahora mismo...";
pub const DOCUMENT_RETRY: &str = "Tuve un problema al leer el documento. ¿Podrías intentar enviarlo de nuevo, por favor?";
pub const DOCUMENT_REQUEST: &str = "¡Entendido! Para generar la cotización, necesito que por favor me envíes el RUT de la empresa en formato PDF.";
pub const NO_EQUIPMENT: &str = "No puedo generar la cotización sin equipos seleccionados. Cuéntame la altura, el tipo de trabajo y la duración de tu proyecto para recomendarte opciones.";
pub const RENDER_FAILED: &str = "Hubo un error al crear el documento de la cotización. Estoy notificando al equipo para que te ayude.";
pub const NO_DOCUMENT: &str = "Hubo un problema generando el documento. Nuestro equipo comercial se pondrá en contacto contigo.";
pub const STUCK: &str = "Disculpa, me enredé un poco procesando tu mensaje. ¿Podrías contarme de nuevo qué necesitas? Si lo prefieres, nuestro equipo comercial puede ayudarte directamente.";
pub const DOWNLOAD_FAILED: &str = "No pude recibir tu archivo. ¿Podrías enviarlo de nuevo? Recuerda que debe pesar menos de 20 MB.";

pub fn welcome(company: &CompanyConfig) -> String {
    format!(
        "¡Hola! Soy el asistente virtual de {} 👋\n\nEstoy aquí para ayudarte a encontrar el equipo de altura perfecto para tu proyecto y generar una cotización personalizada.\n\nPara empezar, me gustaría conocerte un poco mejor. ¿Podrías contarme:\n- ¿Cuál es tu nombre?\n- ¿De qué empresa eres?\n- ¿En qué tipo de proyecto vas a trabajar?\n\n¡Cuéntame todo lo que consideres relevante! 😊",
        company.name
    )
}

pub fn greeting_prefix(name: &str) -> String {
    format!("¡Mucho gusto, {name}! ")
}

pub fn analysis_transition(project: &ProjectDetails) -> String {
    format!(
        "¡Excelente! Ya tengo la información de tu proyecto: {}. Déjame buscar los equipos más adecuados... 🔍",
        project_summary(project)
    )
}

pub fn project_summary(project: &ProjectDetails) -> String {
    let mut parts = Vec::new();
    if let Some(height) = project.height {
        parts.push(format!("altura de {}m", meters(height)));
    }
    if let Some(work_type) = &project.work_type {
        parts.push(format!("trabajo de {work_type}"));
    }
    if let Some(duration) = project.duration {
        parts.push(format!("durante {duration}"));
    }
    parts.join(", ")
}

pub fn recommendations(items: &[Equipment], project: &ProjectDetails) -> String {
    let height = project.height.map(meters).unwrap_or_else(|| "N/A".to_string());
    let mut text = format!(
        "📋 **Recomendaciones para tu proyecto:**\n\nBasándome en tus necesidades (altura: {height}m), estas son mis recomendaciones:\n\n"
    );
    for (index, item) in items.iter().enumerate() {
        let use_cases =
            if item.use_cases.is_empty() { "uso general".to_string() } else { item.use_cases.join(", ") };
        text.push_str(&format!(
            "**Opción {}: {}**\n🎯 Altura máxima: {}m\n💰 Precio: {} por día\n📝 Descripción: {}\n✅ Ideal para: {}\n\n",
            index + 1,
            item.name,
            meters(item.max_height),
            money(item.daily_price),
            item.description,
            use_cases
        ));
    }
    text.push_str(
        "¿Cuál de estas opciones te parece más interesante? ¿Tienes alguna pregunta específica sobre algún equipo?\n\nTambién puedo ayudarte con la cotización si alguna te convence. 😊",
    );
    text
}

pub fn missing_requirements(missing: &[QuoteRequirement]) -> String {
    let items: Vec<&str> = missing
        .iter()
        .map(|requirement| match requirement {
            QuoteRequirement::Phone => "un número de teléfono de contacto",
            QuoteRequirement::Email => "un email para enviar la cotización",
            QuoteRequirement::TaxId => {
                "el RUT de la empresa (puedes escribir el número o adjuntar el archivo)"
            }
        })
        .collect();
    format!(
        "¡Claro que sí! Con gusto preparo tu cotización. Para finalizar, solo necesito que me ayudes con {}. ¡Gracias!",
        items.join(" y ")
    )
}

pub fn document_processed(company: Option<&str>) -> String {
    match company {
        Some(company) => format!(
            "¡Perfecto! He procesado el RUT. Veo que la empresa es {company}. ¡Gracias por enviarlo!"
        ),
        None => "¡Perfecto! He procesado el RUT. ¡Gracias por enviarlo!".to_string(),
    }
}

pub fn quotation_summary(
    quotation: &Quotation,
    contact: &Contact,
    company: &CompanyConfig,
    pricing: &PricingConfig,
) -> String {
    let unknown = "No especificado";
    let mut text = format!(
        "🎉 **Cotización Generada - {}**\n\n👤 Cliente: {}\n🏢 Empresa: {}\n📞 Teléfono: {}\n📧 Email: {}\n\n📋 **Detalle ({} días):**\n",
        company.name,
        contact.name.as_deref().unwrap_or(unknown),
        contact.company.as_deref().unwrap_or(unknown),
        contact.phone.as_deref().unwrap_or(unknown),
        contact.email.as_deref().unwrap_or(unknown),
        quotation.rental_days
    );
    for line in &quotation.lines {
        text.push_str(&format!("• {} ({}): {}\n", line.name, tier_label(line.tier), money(line.amount)));
    }
    text.push_str(&format!(
        "\n💰 **Resumen Financiero:**\nSubtotal: {}\nIVA ({}%): {}\n**TOTAL: {} {}**\n\n✅ Precios válidos por {} días\n✅ Incluye entrega y recogida en {}\n✅ Capacitación básica incluida\n✅ Soporte técnico 24/7",
        money(quotation.subtotal),
        percent(quotation.tax_rate),
        money(quotation.tax),
        money(quotation.total),
        quotation.currency,
        pricing.quote_validity_days,
        company.service_city
    ));
    text
}

pub fn delivery_caption(company: &CompanyConfig) -> String {
    format!(
        "📄 Aquí tienes tu cotización de {} adjunta en el chat. Si tienes alguna pregunta, estoy para ayudarte.",
        company.name
    )
}

pub fn commercial_confirmation(company: &CompanyConfig) -> String {
    format!(
        "¡Perfecto! Tu cotización ha sido procesada exitosamente. Nuestro equipo comercial ha sido notificado y se pondrá en contacto contigo en las próximas horas para resolver tus dudas y coordinar el alquiler.\n\n¡Gracias por elegir {}! 🏗️\n{}",
        company.name, company.website
    )
}

pub fn commercial_fallback(company: &CompanyConfig) -> String {
    format!("¡Cotización completada! Nuestro equipo se pondrá en contacto contigo pronto. ¡Gracias por elegir {}! 🚀", company.name)
}

pub fn company_information(company: &CompanyConfig) -> String {
    format!(
        "🏗️ **{}** alquila equipos para trabajo en altura: escaleras, andamios, elevadores y equipos especializados.\n\n✅ Entrega y recogida en {}\n✅ Capacitación básica en el uso seguro de los equipos\n✅ Soporte técnico 24/7\n\n📞 Teléfono: {}\n📧 Email: {}\n🌐 Web: {}\n\n¿Te cuento qué equipo te sirve para tu proyecto? Solo dime la altura, el tipo de trabajo y por cuánto tiempo lo necesitas.",
        company.name, company.service_city, company.phone, company.email, company.website
    )
}

pub fn equipment_detail(item: &Equipment) -> String {
    let mut text = format!(
        "🔎 **{}**\n📝 {}\n🎯 Altura máxima: {}m\n\n💰 **Tarifas:**\n• Día: {}\n",
        item.name,
        item.description,
        meters(item.max_height),
        money(item.daily_price)
    );
    if let Some(weekly) = item.weekly_price {
        text.push_str(&format!("• Semana: {}\n", money(weekly)));
    }
    if let Some(monthly) = item.monthly_price {
        text.push_str(&format!("• Mes: {}\n", money(monthly)));
    }
    if !item.specifications.is_empty() {
        text.push_str("\n⚙️ **Especificaciones:**\n");
        for (key, value) in &item.specifications {
            text.push_str(&format!("• {}: {}\n", key.replace('_', " "), value));
        }
    }
    if let Some(safety) = &item.safety_requirements {
        text.push_str(&format!("\n🦺 **Seguridad:** {safety}\n"));
    }
    text.push_str("\n¿Quieres que te prepare la cotización con este equipo?");
    text
}

pub fn equipment_not_identified(items: &[Equipment]) -> String {
    if items.is_empty() {
        return format!(
            "Con gusto te cuento los detalles de nuestros equipos. Primero cuéntame un poco de tu proyecto: {}",
            ASK_HEIGHT
        );
    }
    let options: Vec<String> =
        items.iter().enumerate().map(|(index, item)| format!("{}. {}", index + 1, item.name)).collect();
    format!("¿Sobre cuál equipo quieres más detalles?\n{}", options.join("\n"))
}

fn tier_label(tier: RateTier) -> &'static str {
    match tier {
        RateTier::Monthly => "tarifa mensual",
        RateTier::Weekly => "tarifa semanal",
        RateTier::Daily => "tarifa diaria",
    }
}

/// `$1,234,567`; amounts are rounded to whole currency units.
pub fn money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let digits = rounded.abs().trunc().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    format!("{sign}${grouped}")
}

pub fn meters(value: Decimal) -> String {
    value.normalize().to_string()
}

pub fn percent(rate: Decimal) -> String {
    (rate * Decimal::from(100)).normalize().to_string()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use altura_core::domain::conversation::{DurationUnit, ProjectDetails, QuoteRequirement, RentalDuration};

    use super::{meters, missing_requirements, money, percent, project_summary};

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(Decimal::from(405_000)), "$405,000");
        assert_eq!(money(Decimal::from(1_234_567)), "$1,234,567");
        assert_eq!(money(Decimal::from(950)), "$950");
        assert_eq!(money(Decimal::new(7_695_050, 2)), "$76,951");
    }

    #[test]
    fn heights_and_rates_drop_trailing_zeros() {
        assert_eq!(meters(Decimal::new(600, 2)), "6");
        assert_eq!(meters(Decimal::new(45, 1)), "4.5");
        assert_eq!(percent(Decimal::new(19, 2)), "19");
    }

    #[test]
    fn missing_items_are_joined_in_one_sentence() {
        let text = missing_requirements(&[QuoteRequirement::Email, QuoteRequirement::TaxId]);
        assert!(text.contains("un email para enviar la cotización y el RUT de la empresa"));
        assert!(!text.contains("teléfono"));
    }

    #[test]
    fn project_summary_lists_known_fields() {
        let project = ProjectDetails {
            height: Some(Decimal::from(6)),
            work_type: Some("mantenimiento".to_owned()),
            duration: Some(RentalDuration::new(2, DurationUnit::Weeks)),
        };
        assert_eq!(project_summary(&project), "altura de 6m, trabajo de mantenimiento, durante 2 semanas");
    }
}
