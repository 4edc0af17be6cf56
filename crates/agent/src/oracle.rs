use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use altura_core::domain::conversation::{Contact, DocumentRecord};

use crate::extractor::{extract_email, normalize_tax_id};
use crate::llm::{json_object, string_field, Attachment, LlmClient, OracleError};

const IDENTITY_PROMPT: &str = r#"Eres un asistente que lee documentos tributarios colombianos (RUT / NIT).
Extrae los datos de identificación de la empresa del documento adjunto.

Responde SOLO con este JSON (usa null cuando el dato no aparezca):
{"company_name": "razón social", "tax_id": "NIT con dígito de verificación", "address": "dirección principal", "email": "correo"}

Si el documento no es un RUT legible responde {"error": "motivo"}."#;

/// Company identity read from a tax document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompanyIdentity {
    pub company_name: Option<String>,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
}

impl CompanyIdentity {
    pub fn is_empty(&self) -> bool {
        *self == CompanyIdentity::default()
    }

    pub fn into_contact(self) -> Contact {
        Contact {
            company: self.company_name,
            tax_id: self.tax_id,
            address: self.address,
            email: self.email,
            ..Contact::default()
        }
    }
}

#[async_trait]
pub trait DocumentOracle: Send + Sync {
    async fn extract_identity(&self, document: &DocumentRecord) -> Result<CompanyIdentity, OracleError>;
}

/// Sends the uploaded file to a multimodal completion model.
pub struct LlmDocumentOracle {
    llm: Arc<dyn LlmClient>,
}

impl LlmDocumentOracle {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DocumentOracle for LlmDocumentOracle {
    async fn extract_identity(&self, document: &DocumentRecord) -> Result<CompanyIdentity, OracleError> {
        let Some(location) = document.location.as_deref() else {
            return Err(OracleError::Unavailable("document has no stored file".to_string()));
        };
        let attachment = Attachment::read(Path::new(location))
            .await
            .map_err(|error| OracleError::Unavailable(format!("could not read `{location}`: {error}")))?;

        let reply = self.llm.complete_with_attachment(IDENTITY_PROMPT, &attachment).await?;
        parse_identity(&reply)
    }
}

/// Validates an identity reply. An `error` key or an answer without usable fields is a failure.
pub fn parse_identity(reply: &str) -> Result<CompanyIdentity, OracleError> {
    let map = json_object(reply)?;
    if let Some(reason) = string_field(&map, "error") {
        return Err(OracleError::InvalidResponse(reason));
    }

    let identity = CompanyIdentity {
        company_name: string_field(&map, "company_name"),
        tax_id: string_field(&map, "tax_id").and_then(|value| normalize_tax_id(&value)),
        address: string_field(&map, "address"),
        email: string_field(&map, "email").and_then(|value| extract_email(&value)),
    };
    if identity.company_name.is_none() && identity.tax_id.is_none() {
        return Err(OracleError::InvalidResponse("no company name or tax id in reply".to_string()));
    }
    Ok(identity)
}
