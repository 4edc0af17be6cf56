//! Quotation documents: HTML from the Tera template, converted to PDF with wkhtmltopdf when the
//! binary is available. Without it, or when the conversion fails, the HTML file is delivered.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tera::Tera;
use tokio::process::Command;
use tracing::{error, info, warn};

use altura_agent::{QuoteRenderer, RenderError, RenderRequest};
use altura_core::config::{AppConfig, CompanyConfig};
use altura_core::domain::quotation::DocumentReference;

use crate::templates::{self, DealView};

pub struct TeraQuoteRenderer {
    tera: Tera,
    company: CompanyConfig,
    validity_days: u32,
    output_dir: PathBuf,
    wkhtmltopdf_path: Option<PathBuf>,
}

impl TeraQuoteRenderer {
    pub fn from_config(config: &AppConfig) -> Result<Self, RenderError> {
        let tera = templates::load(config.rendering.template_dir.as_deref())
            .map_err(|error| RenderError::Template(error.to_string()))?;
        let wkhtmltopdf_path =
            config.rendering.wkhtmltopdf_path.clone().or_else(|| which::which("wkhtmltopdf").ok());

        match &wkhtmltopdf_path {
            Some(path) => info!(path = %path.display(), "wkhtmltopdf found"),
            None => warn!("wkhtmltopdf not found in PATH; quotations will be delivered as HTML"),
        }

        Ok(Self {
            tera,
            company: config.company.clone(),
            validity_days: config.pricing.quote_validity_days,
            output_dir: config.rendering.output_dir.clone(),
            wkhtmltopdf_path,
        })
    }

    pub fn render_html(&self, request: &RenderRequest) -> Result<String, RenderError> {
        let deal = DealView {
            user_id: &request.user_id,
            contact: &request.contact,
            project: &request.project,
            quotation: &request.quotation,
        };
        let context = templates::deal_context(&deal, &self.company, self.validity_days);
        self.tera
            .render(templates::QUOTATION, &context)
            .map_err(|error| RenderError::Template(error.to_string()))
    }

    async fn convert_html_to_pdf(
        &self,
        wkhtmltopdf: &Path,
        html_path: &Path,
        pdf_path: &Path,
    ) -> Result<(), RenderError> {
        let output = Command::new(wkhtmltopdf)
            .args(["--quiet", "--page-size", "A4", "--encoding", "utf-8"])
            .args(["--margin-top", "10mm", "--margin-bottom", "10mm"])
            .args(["--margin-left", "10mm", "--margin-right", "10mm"])
            .arg(html_path)
            .arg(pdf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "wkhtmltopdf failed");
            return Err(RenderError::Converter(stderr.trim().to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl QuoteRenderer for TeraQuoteRenderer {
    async fn render_quote(&self, request: &RenderRequest) -> Result<DocumentReference, RenderError> {
        let html = self.render_html(request)?;
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let stem = document_stem(&request.user_id.0);
        let html_path = self.output_dir.join(format!("{stem}.html"));
        tokio::fs::write(&html_path, html).await?;

        if let Some(wkhtmltopdf) = &self.wkhtmltopdf_path {
            let pdf_path = self.output_dir.join(format!("{stem}.pdf"));
            match self.convert_html_to_pdf(wkhtmltopdf, &html_path, &pdf_path).await {
                Ok(()) => {
                    if let Err(error) = tokio::fs::remove_file(&html_path).await {
                        warn!(path = %html_path.display(), error = %error, "could not remove intermediate html");
                    }
                    info!(user_id = %request.user_id, path = %pdf_path.display(), "quotation pdf generated");
                    return Ok(reference(&pdf_path));
                }
                Err(error) => {
                    warn!(user_id = %request.user_id, error = %error, "pdf conversion failed; delivering html");
                }
            }
        }

        info!(user_id = %request.user_id, path = %html_path.display(), "quotation html generated");
        Ok(reference(&html_path))
    }
}

/// `cotizacion_<user>_<uuid>`, with anything but ASCII alphanumerics and `-` in the user id
/// replaced.
fn document_stem(user_id: &str) -> String {
    let user: String = user_id
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect();
    format!("cotizacion_{user}_{}", uuid::Uuid::new_v4().simple())
}

fn reference(path: &Path) -> DocumentReference {
    DocumentReference {
        file_name: path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default(),
        path: path.to_string_lossy().into_owned(),
    }
}
