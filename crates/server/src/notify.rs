use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tera::Tera;
use tracing::info;

use altura_agent::replies::money;
use altura_agent::{CommercialNotifier, DealSummary, NotifyError};
use altura_core::config::{AppConfig, CompanyConfig};

use crate::templates::{self, DealView};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

/// Emails each delivered quotation to the sales mailbox through the Resend API. Without an API
/// key the deal is only logged.
pub struct ResendNotifier {
    http: reqwest::Client,
    tera: Tera,
    enabled: bool,
    api_key: Option<SecretString>,
    api_base_url: String,
    from: String,
    to: String,
    company: CompanyConfig,
    validity_days: u32,
}

impl ResendNotifier {
    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        let tera = templates::load(config.rendering.template_dir.as_deref())
            .map_err(|error| NotifyError::Template(error.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;
        let from = config
            .notification
            .from_address
            .clone()
            .unwrap_or_else(|| default_sender(&config.company));

        Ok(Self {
            http,
            tera,
            enabled: config.notification.enabled,
            api_key: config
                .notification
                .resend_api_key
                .clone()
                .filter(|key| !key.expose_secret().trim().is_empty()),
            api_base_url: config.notification.api_base_url.trim_end_matches('/').to_string(),
            from,
            to: config.sales_address().to_string(),
            company: config.company.clone(),
            validity_days: config.pricing.quote_validity_days,
        })
    }

    pub fn render_body(&self, deal: &DealSummary) -> Result<String, NotifyError> {
        let view = DealView {
            user_id: &deal.user_id,
            contact: &deal.contact,
            project: &deal.project,
            quotation: &deal.quotation,
        };
        let mut context = templates::deal_context(&view, &self.company, self.validity_days);
        if let Some(document) = &deal.document {
            context.insert("document", &document.file_name);
        }
        self.tera
            .render(templates::COMMERCIAL_NOTIFICATION, &context)
            .map_err(|error| NotifyError::Template(error.to_string()))
    }
}

pub fn subject(deal: &DealSummary) -> String {
    let client = deal.contact.company.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or("Cliente");
    format!("Nueva Cotización - {client} - {}", money(deal.quotation.total))
}

/// `Bot <company> <noreply@<website domain>>`.
fn default_sender(company: &CompanyConfig) -> String {
    let host = company
        .website
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split(['/', ':'])
        .next()
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost");
    format!("Bot {} <noreply@{host}>", company.name)
}

#[async_trait]
impl CommercialNotifier for ResendNotifier {
    async fn notify(&self, deal: &DealSummary) -> Result<(), NotifyError> {
        let subject = subject(deal);
        if !self.enabled {
            info!(user_id = %deal.user_id, quotation_id = %deal.quotation.id.0, "notifications disabled; skipping");
            return Ok(());
        }
        let Some(api_key) = &self.api_key else {
            info!(
                event_name = "notification.logged_only",
                user_id = %deal.user_id,
                quotation_id = %deal.quotation.id.0,
                to = %self.to,
                subject = %subject,
                "no email api key configured; commercial notification logged only"
            );
            return Ok(());
        };

        let html = self.render_body(deal)?;
        let email = ResendEmail { from: &self.from, to: vec![self.to.as_str()], subject: &subject, html: &html };
        let response = self
            .http
            .post(format!("{}/emails", self.api_base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&email)
            .send()
            .await
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        info!(
            event_name = "notification.sent",
            user_id = %deal.user_id,
            quotation_id = %deal.quotation.id.0,
            to = %self.to,
            "commercial notification sent"
        );
        Ok(())
    }
}
