//! Text normalization shared by intent detection and field extraction.

/// Lowercases and strips Spanish diacritics so keyword matching is accent-insensitive.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            other => other,
        })
        .collect()
}

/// Splits folded text into alphanumeric words, keeping `.`/`,` inside numbers.
pub fn words(text: &str) -> Vec<String> {
    let folded = fold(text);
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = folded.chars().collect();

    for (index, ch) in chars.iter().enumerate() {
        let numeric_separator = matches!(ch, '.' | ',')
            && current.chars().last().is_some_and(|prev| prev.is_ascii_digit())
            && chars.get(index + 1).is_some_and(|next| next.is_ascii_digit());

        if ch.is_alphanumeric() || numeric_separator {
            current.push(*ch);
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

pub fn contains_any(folded: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| folded.contains(needle))
}

/// Capitalizes each word: "juan perez" becomes "Juan Perez".
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
