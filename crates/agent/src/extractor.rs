use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use altura_core::config::{AppConfig, ConversationConfig};
use altura_core::domain::conversation::{Contact, DurationUnit, ProjectDetails, RentalDuration};
use altura_core::text::{contains_any, fold, title_case, words};

use crate::llm::{json_object, string_field, LlmClient, OracleError};

const METER_UNITS: &[&str] = &["m", "mt", "mts", "metro", "metros", "meter", "meters"];
const FLOOR_UNITS: &[&str] = &["piso", "pisos", "floor", "floors"];
const CORRECTION_CUES: &[&str] = &["cambi", "mejor", "en realidad", "corrij", "perdon"];
const NAME_TRIGGERS: &[&[&str]] = &[&["me", "llamo"], &["mi", "nombre", "es"], &["soy"]];
const COMPANY_TRIGGERS: &[&[&str]] = &[&["trabajo", "en"], &["empresa"], &["compania"]];
const NAME_CONNECTORS: &[&str] = &["de", "del", "la", "el", "y", "e", "con", "para", "en"];
const COMPANY_FILLERS: &[&str] = &["es", "se", "llama", "llamada", "de", "la", "el", ":"];
const COMPANY_STOPS: &[&str] = &["y", "para", "necesito", "quiero", "con", "que", "necesitamos"];
const MIN_ORACLE_WORDS: usize = 3;
const MAX_NAME_WORDS: usize = 3;
const MAX_COMPANY_WORDS: usize = 5;

/// Work type tags and the folded word prefixes that signal them.
const WORK_TYPES: &[(&str, &[&str])] = &[
    ("mantenimiento", &["manten"]),
    ("construcción", &["construc", "obra"]),
    ("pintura", &["pint"]),
    ("limpieza", &["limpi", "lavado"]),
    ("instalación", &["instal", "montaje"]),
    ("reparación", &["repar", "arregl"]),
    ("poda", &["poda", "arbol"]),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub floor_height_m: Decimal,
    pub min_height_m: Decimal,
    pub max_height_m: Decimal,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self::from(&AppConfig::default().conversation)
    }
}

impl From<&ConversationConfig> for ExtractionLimits {
    fn from(config: &ConversationConfig) -> Self {
        Self {
            floor_height_m: config.floor_height_m,
            min_height_m: config.min_height_m,
            max_height_m: config.max_height_m,
        }
    }
}

/// Partial fields found in one message. Everything is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    pub contact: Contact,
    pub project: ProjectDetails,
    /// The message asks to change previously given project details.
    pub correction: bool,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.contact.is_empty() && self.project == ProjectDetails::default()
    }

    /// Fills fields still missing here from `other`; existing values always win.
    fn fill_missing(&mut self, other: Extraction) {
        let Extraction { contact, project, .. } = other;
        let slots = [
            (&mut self.contact.name, contact.name),
            (&mut self.contact.company, contact.company),
            (&mut self.contact.phone, contact.phone),
            (&mut self.contact.email, contact.email),
            (&mut self.contact.tax_id, contact.tax_id),
            (&mut self.contact.address, contact.address),
        ];
        for (slot, value) in slots {
            if slot.is_none() {
                *slot = value;
            }
        }
        self.project.merge(project, false);
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldExtractor {
    limits: ExtractionLimits,
}

impl FieldExtractor {
    pub fn new(limits: ExtractionLimits) -> Self {
        Self { limits }
    }

    /// Every deterministic rule over one message.
    pub fn extract(&self, text: &str) -> Extraction {
        let mut extraction = Extraction { contact: self.extract_contact(text), ..Extraction::default() };
        let tokens = words(&without_emails(text));

        extraction.project = ProjectDetails {
            height: self.extract_height(&tokens),
            work_type: extract_work_type(&tokens),
            duration: extract_duration(&tokens),
        };
        extraction.correction = contains_any(&fold(text), CORRECTION_CUES);
        extraction
    }

    /// Contact subset applied to every inbound message before routing.
    pub fn extract_contact(&self, text: &str) -> Contact {
        let tax_id = extract_tax_id(text);
        Contact {
            name: extract_name(text),
            company: extract_company(text),
            phone: extract_phone(text, tax_id.as_deref()),
            email: extract_email(text),
            tax_id,
            address: None,
        }
    }

    /// Pattern rules first; when name, company or work type stay unknown the oracle is asked
    /// and its answer fills the gaps after re-validation.
    pub async fn extract_with_oracle(
        &self,
        text: &str,
        known: &Contact,
        known_project: &ProjectDetails,
        llm: &dyn LlmClient,
    ) -> Extraction {
        let mut extraction = self.extract(text);
        if !self.needs_oracle(text, &extraction, known, known_project) {
            return extraction;
        }

        match llm.complete(&extraction_prompt(text)).await {
            Ok(reply) => match self.parse_oracle_reply(&reply) {
                Ok(suggested) => extraction.fill_missing(suggested),
                Err(error) => debug!(error = %error, "ignoring unusable extraction reply"),
            },
            Err(error) => debug!(error = %error, "extraction oracle unavailable"),
        }
        extraction
    }

    fn needs_oracle(
        &self,
        text: &str,
        extraction: &Extraction,
        known: &Contact,
        known_project: &ProjectDetails,
    ) -> bool {
        let missing_name = known.name.is_none() && extraction.contact.name.is_none();
        let missing_company = known.company.is_none() && extraction.contact.company.is_none();
        let missing_work = known_project.work_type.is_none() && extraction.project.work_type.is_none();
        let substantive = words(text).len() >= MIN_ORACLE_WORDS;
        substantive && (missing_name || missing_company || missing_work)
    }

    /// Parses the oracle's JSON and re-checks every value with the pattern rules.
    pub fn parse_oracle_reply(&self, reply: &str) -> Result<Extraction, OracleError> {
        let map = json_object(reply)?;
        let mut extraction = Extraction::default();

        extraction.contact.name = string_field(&map, "user_name").and_then(|value| clean_name(&value));
        extraction.contact.company =
            string_field(&map, "company_name").and_then(|value| clean_company(&value));
        extraction.contact.phone = string_field(&map, "phone").and_then(|value| extract_phone(&value, None));
        extraction.contact.email = string_field(&map, "email").and_then(|value| extract_email(&value));
        extraction.contact.tax_id = string_field(&map, "rut_text").and_then(|value| normalize_tax_id(&value));

        if let Some(Value::Object(project)) = map.get("project_details") {
            extraction.project.height = match project.get("height") {
                Some(Value::Number(number)) => {
                    Decimal::from_str(&number.to_string()).ok().and_then(|height| self.in_range(height))
                }
                Some(Value::String(text)) => {
                    let tokens = words(text);
                    self.extract_height(&tokens).or_else(|| {
                        tokens.first().and_then(|token| parse_number(token)).and_then(|h| self.in_range(h))
                    })
                }
                _ => None,
            };
            extraction.project.duration = string_field(project, "duration_text")
                .and_then(|value| extract_duration(&words(&value)));
            extraction.project.work_type =
                string_field(project, "work_type").and_then(|value| normalize_work_type(&value));
        }

        Ok(extraction)
    }

    fn extract_height(&self, tokens: &[String]) -> Option<Decimal> {
        for (index, token) in tokens.iter().enumerate() {
            let (number, attached_unit) = split_number(token);
            let Some(number) = number.and_then(parse_number) else {
                continue;
            };
            let unit = if attached_unit.is_empty() {
                tokens.get(index + 1).map(String::as_str).unwrap_or_default()
            } else {
                attached_unit
            };

            let meters = if METER_UNITS.contains(&unit) {
                number
            } else if FLOOR_UNITS.contains(&unit) {
                number * self.limits.floor_height_m
            } else {
                continue;
            };
            if let Some(height) = self.in_range(meters) {
                return Some(height);
            }
        }
        None
    }

    fn in_range(&self, meters: Decimal) -> Option<Decimal> {
        (meters >= self.limits.min_height_m && meters <= self.limits.max_height_m)
            .then(|| meters.normalize())
    }
}

/// Splits `12m` into (`12`, `m`); a bare number has an empty unit.
fn split_number(token: &str) -> (Option<&str>, &str) {
    let boundary = token
        .char_indices()
        .find(|(_, ch)| !(ch.is_ascii_digit() || matches!(ch, '.' | ',')))
        .map(|(index, _)| index)
        .unwrap_or(token.len());
    if boundary == 0 {
        return (None, token);
    }
    (Some(&token[..boundary]), &token[boundary..])
}

fn parse_number(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.replace(',', ".")).ok()
}

fn number_word(token: &str) -> Option<u32> {
    let value = match token {
        "un" | "una" | "uno" => 1,
        "dos" => 2,
        "tres" => 3,
        "cuatro" => 4,
        "cinco" => 5,
        "seis" => 6,
        "siete" => 7,
        "ocho" => 8,
        "nueve" => 9,
        "diez" => 10,
        _ => return None,
    };
    Some(value)
}

fn duration_unit(token: &str) -> Option<DurationUnit> {
    match token {
        "dia" | "dias" | "day" | "days" => Some(DurationUnit::Days),
        "semana" | "semanas" | "week" | "weeks" => Some(DurationUnit::Weeks),
        "mes" | "meses" | "month" | "months" => Some(DurationUnit::Months),
        "ano" | "anos" | "year" | "years" => Some(DurationUnit::Years),
        _ => None,
    }
}

fn extract_duration(tokens: &[String]) -> Option<RentalDuration> {
    for window in tokens.windows(2) {
        if let [amount, unit] = window {
            let Some(unit) = duration_unit(unit) else {
                continue;
            };
            let amount = amount.parse::<u32>().ok().or_else(|| number_word(amount));
            if let Some(amount) = amount.filter(|amount| *amount > 0) {
                return Some(RentalDuration::new(amount, unit));
            }
        }
    }

    // "2semanas" written together
    tokens.iter().find_map(|token| {
        let (number, unit) = split_number(token);
        let amount = number?.parse::<u32>().ok().filter(|amount| *amount > 0)?;
        Some(RentalDuration::new(amount, duration_unit(unit)?))
    })
}

fn extract_work_type(tokens: &[String]) -> Option<String> {
    tokens.iter().find_map(|token| {
        WORK_TYPES
            .iter()
            .find(|(_, prefixes)| prefixes.iter().any(|prefix| token.starts_with(prefix)))
            .map(|(tag, _)| (*tag).to_string())
    })
}

fn normalize_work_type(raw: &str) -> Option<String> {
    if let Some(tag) = extract_work_type(&words(raw)) {
        return Some(tag);
    }
    let free_form = raw.trim().to_lowercase();
    (3..=40).contains(&free_form.chars().count()).then_some(free_form)
}

fn without_emails(text: &str) -> String {
    text.split_whitespace().filter(|token| !token.contains('@')).collect::<Vec<_>>().join(" ")
}

fn trim_punctuation(token: &str) -> &str {
    token.trim_matches(|ch: char| {
        matches!(ch, ',' | '.' | ';' | ':' | '!' | '?' | '¡' | '¿' | '(' | ')' | '<' | '>' | '"' | '\'')
    })
}

fn ends_clause(token: &str) -> bool {
    token.ends_with([',', '.', ';', ':', '!', '?'])
}

pub fn extract_email(text: &str) -> Option<String> {
    text.split_whitespace().map(trim_punctuation).find_map(|token| {
        let (local, domain) = token.split_once('@')?;
        let local_ok = !local.is_empty()
            && local.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '%' | '+' | '-'));
        let domain_ok = domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !domain.contains("..")
            && domain.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-'));
        (local_ok && domain_ok).then(|| token.to_lowercase())
    })
}

/// Colombian mobile numbers, normalized to `+57XXXXXXXXXX`. Groups may be joined by spaces,
/// dots or hyphens; a run that is not a phone is retried from its second group so a number
/// written right after another one is still found.
pub fn extract_phone(text: &str, tax_id: Option<&str>) -> Option<String> {
    let tax_digits: Option<String> = tax_id.map(|id| id.chars().filter(char::is_ascii_digit).collect());
    let chars: Vec<char> = text.chars().collect();
    let mut index = 0;

    while index < chars.len() {
        if !(chars[index].is_ascii_digit() || chars[index] == '+') {
            index += 1;
            continue;
        }

        let mut digits = String::new();
        let mut second_group = None;
        while index < chars.len() {
            let ch = chars[index];
            let joins_groups = matches!(ch, ' ' | '.' | '-' | '+')
                && chars.get(index + 1).is_some_and(char::is_ascii_digit);
            if ch.is_ascii_digit() {
                digits.push(ch);
            } else if !joins_groups {
                break;
            } else if ch == ' ' && !digits.is_empty() && second_group.is_none() {
                second_group = Some(index + 1);
            }
            index += 1;
        }

        if digits.is_empty() {
            index += 1;
            continue;
        }
        if tax_digits.as_deref() == Some(digits.as_str()) {
            continue;
        }
        match mobile_number(&digits) {
            Some(phone) => return Some(phone),
            None => {
                if let Some(restart) = second_group {
                    index = restart;
                }
            }
        }
    }
    None
}

fn mobile_number(digits: &str) -> Option<String> {
    let national = match digits.len() {
        12 if digits.starts_with("57") => &digits[2..],
        10 => digits,
        _ => return None,
    };
    national.starts_with('3').then(|| format!("+57{national}"))
}

/// Digits, dots and hyphens; 8-15 characters once dots are removed.
pub fn normalize_tax_id(raw: &str) -> Option<String> {
    let candidate = trim_punctuation(raw.trim());
    if !candidate.chars().all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | '-')) {
        return None;
    }
    let cleaned: String = candidate.chars().filter(|ch| *ch != '.').collect();
    let valid = (8..=15).contains(&cleaned.len())
        && cleaned.starts_with(|ch: char| ch.is_ascii_digit())
        && cleaned.chars().filter(char::is_ascii_digit).count() >= 8;
    valid.then_some(cleaned)
}

fn extract_tax_id(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        let keyword = fold(trim_punctuation(token));
        if keyword != "rut" && keyword != "nit" {
            continue;
        }
        let found = tokens[index + 1..]
            .iter()
            .take(4)
            .map(|candidate| trim_punctuation(candidate))
            .find(|candidate| !matches!(fold(candidate).as_str(), "es" | "numero" | "no" | "n°" | "#" | "de" | ""))
            .and_then(normalize_tax_id);
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Index just past the first occurrence of any trigger phrase in the folded tokens.
fn after_trigger(folded: &[String], triggers: &[&[&str]]) -> Option<usize> {
    (0..folded.len()).find_map(|start| {
        triggers.iter().find_map(|trigger| {
            let end = start + trigger.len();
            let matches = end <= folded.len()
                && folded[start..end].iter().zip(trigger.iter()).all(|(token, word)| token == word);
            matches.then_some(end)
        })
    })
}

fn extract_name(text: &str) -> Option<String> {
    let raw: Vec<&str> = text.split_whitespace().collect();
    let folded: Vec<String> = raw.iter().map(|token| fold(trim_punctuation(token))).collect();
    let start = after_trigger(&folded, NAME_TRIGGERS)?;

    let mut name = Vec::new();
    for (token, folded_token) in raw[start..].iter().zip(&folded[start..]) {
        let word = trim_punctuation(token);
        let capitalised = word.chars().next().is_some_and(char::is_uppercase);
        if !capitalised
            || NAME_CONNECTORS.contains(&folded_token.as_str())
            || !word.chars().all(char::is_alphabetic)
        {
            break;
        }
        name.push(word);
        if name.len() == MAX_NAME_WORDS || ends_clause(token) {
            break;
        }
    }
    clean_name(&name.join(" "))
}

fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let plausible = !trimmed.is_empty()
        && trimmed.chars().count() <= 60
        && trimmed.chars().all(|ch| ch.is_alphabetic() || ch == ' ' || ch == '-' || ch == '\'');
    plausible.then(|| title_case(trimmed))
}

fn extract_company(text: &str) -> Option<String> {
    let raw: Vec<&str> = text.split_whitespace().collect();
    let folded: Vec<String> = raw.iter().map(|token| fold(trim_punctuation(token))).collect();
    let mut start = after_trigger(&folded, COMPANY_TRIGGERS)?;
    while folded.get(start).is_some_and(|token| COMPANY_FILLERS.contains(&token.as_str())) {
        start += 1;
    }

    let mut company = Vec::new();
    for (token, folded_token) in raw[start..].iter().zip(&folded[start..]) {
        if COMPANY_STOPS.contains(&folded_token.as_str()) {
            break;
        }
        let word = trim_punctuation(token);
        if !word.is_empty() {
            company.push(word);
        }
        if company.len() == MAX_COMPANY_WORDS || ends_clause(token) {
            break;
        }
    }
    clean_company(&company.join(" "))
}

fn clean_company(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty() && trimmed.chars().count() <= 80).then(|| trimmed.to_string())
}

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Analiza este mensaje del cliente y extrae información relevante en formato JSON:
"{text}"

Responde SOLO con este JSON (usa null cuando el dato no aparezca):
{{
  "user_name": "nombre" o null,
  "company_name": "empresa" o null,
  "phone": "telefono" o null,
  "email": "email" o null,
  "rut_text": "numero de RUT" o null,
  "project_details": {{
    "height": numero en metros o null,
    "duration_text": "duracion" o null,
    "work_type": "tipo de trabajo" o null
  }}
}}"#
    )
}
