//! Tera templates shared by the quotation document and the commercial email.

use std::path::Path;

use chrono::Duration;
use serde_json::json;
use tera::{Context, Tera};

use altura_agent::replies::{meters, money, percent};
use altura_core::config::CompanyConfig;
use altura_core::domain::conversation::{Contact, ProjectDetails, UserId};
use altura_core::domain::quotation::{Quotation, RateTier};

pub const QUOTATION: &str = "quotation.html.tera";
pub const COMMERCIAL_NOTIFICATION: &str = "commercial_notification.html.tera";

const EMBEDDED: &[(&str, &str)] = &[
    (QUOTATION, include_str!("../../../templates/quotation.html.tera")),
    (COMMERCIAL_NOTIFICATION, include_str!("../../../templates/commercial_notification.html.tera")),
];

const NOT_PROVIDED: &str = "No especificado";

/// Embedded templates, each replaced by a same-named file in `template_dir` when present.
pub fn load(template_dir: Option<&Path>) -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![".html.tera"]);
    for (name, embedded) in EMBEDDED {
        let source = match template_dir.map(|dir| dir.join(name)).filter(|path| path.is_file()) {
            Some(path) => std::fs::read_to_string(&path)
                .map_err(|error| tera::Error::msg(format!("{}: {error}", path.display())))?,
            None => (*embedded).to_string(),
        };
        tera.add_raw_template(name, &source)?;
    }
    Ok(tera)
}

/// The parts of a deal both templates print.
pub struct DealView<'a> {
    pub user_id: &'a UserId,
    pub contact: &'a Contact,
    pub project: &'a ProjectDetails,
    pub quotation: &'a Quotation,
}

pub fn deal_context(deal: &DealView<'_>, company: &CompanyConfig, validity_days: u32) -> Context {
    let quotation = deal.quotation;
    let valid_until = quotation.created_at + Duration::days(i64::from(validity_days));

    let mut context = Context::new();
    context.insert(
        "company",
        &json!({
            "name": company.name,
            "email": company.email,
            "phone": company.phone,
            "website": company.website,
        }),
    );
    context.insert(
        "client",
        &json!({
            "name": or_default(&deal.contact.name),
            "company": or_default(&deal.contact.company),
            "tax_id": or_default(&deal.contact.tax_id),
            "phone": or_default(&deal.contact.phone),
            "email": or_default(&deal.contact.email),
            "address": or_default(&deal.contact.address),
            "chat_user": deal.user_id.0,
        }),
    );
    let height = deal
        .project
        .height
        .map(|height| format!("{} m", meters(height)))
        .unwrap_or_else(|| NOT_PROVIDED.to_string());
    let duration = deal
        .project
        .duration
        .map(|duration| duration.to_string())
        .unwrap_or_else(|| format!("{} días", quotation.rental_days));
    context.insert(
        "project",
        &json!({
            "height": height,
            "work_type": or_default(&deal.project.work_type),
            "duration": duration,
        }),
    );
    context.insert(
        "quotation",
        &json!({
            "id": quotation.id.0,
            "rental_days": quotation.rental_days,
            "issued_on": quotation.created_at.format("%d/%m/%Y").to_string(),
            "valid_until": valid_until.format("%d/%m/%Y").to_string(),
        }),
    );
    let lines: Vec<_> = quotation
        .lines
        .iter()
        .map(|line| {
            json!({
                "name": line.name,
                "tier": tier_label(line.tier),
                "daily_price": money(line.daily_price),
                "rental_days": line.rental_days,
                "amount": money(line.amount),
            })
        })
        .collect();
    context.insert("lines", &lines);
    context.insert(
        "totals",
        &json!({
            "subtotal": money(quotation.subtotal),
            "tax_percent": format!("{}%", percent(quotation.tax_rate)),
            "tax": money(quotation.tax),
            "total": money(quotation.total),
            "currency": quotation.currency,
        }),
    );
    context.insert(
        "conditions",
        &json!({ "validity_days": validity_days, "service_city": company.service_city }),
    );
    context
}

fn or_default(value: &Option<String>) -> String {
    value.clone().filter(|value| !value.trim().is_empty()).unwrap_or_else(|| NOT_PROVIDED.to_string())
}

fn tier_label(tier: RateTier) -> &'static str {
    match tier {
        RateTier::Monthly => "Mensual",
        RateTier::Weekly => "Semanal",
        RateTier::Daily => "Diaria",
    }
}
