//! Heuristic extraction of budget categories and activities from plain text.
//!
//! Three strategies are tried in order; the first one that yields at least
//! one activity wins:
//!
//! 1. numbered categories (`1. FONTANERÍA`, `2 - ELECTRICIDAD`) holding
//!    dotted activities (`1.1 Cambio de bajante ... 320,00 €`);
//! 2. upper-case heading lines as categories, any line with an amount as an
//!    activity;
//! 3. a keyword table of common trades matched line by line.
//!
//! Nothing here fails: unusable text gives [`Strategy::None`].

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Numbered,
    Headings,
    Keywords,
    None,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numbered => write!(f, "numbered"),
            Self::Headings => write!(f, "headings"),
            Self::Keywords => write!(f, "keywords"),
            Self::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub name: String,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extraction {
    pub strategy: Strategy,
    pub categories: Vec<Category>,
}

impl Extraction {
    fn none() -> Self {
        Self {
            strategy: Strategy::None,
            categories: Vec::new(),
        }
    }

    pub fn activity_count(&self) -> usize {
        self.categories.iter().map(|c| c.activities.len()).sum()
    }

    pub fn total_cents(&self) -> i64 {
        self.categories
            .iter()
            .flat_map(|c| &c.activities)
            .filter_map(|a| a.amount_cents)
            .sum()
    }
}

const UNCATEGORIZED: &str = "General";

/// Trade name and the lowercase fragments that identify it.
const TRADES: &[(&str, &[&str])] = &[
    ("Plumbing", &["fontaner", "plumb", "tuber", "bajante", "desag"]),
    ("Electricity", &["electric", "eléctric", "cableado", "wiring", "enchufe", "socket"]),
    ("Carpentry", &["carpinter", "carpentry", "puerta", "door", "armario"]),
    ("Painting", &["pintur", "paint"]),
    ("Masonry", &["albañil", "mason", "tabique", "demolic", "demolition"]),
    ("Flooring", &["suelo", "floor", "tarima", "parquet"]),
    ("Tiling", &["alicatado", "azulejo", "tiling", "tiles"]),
    ("Heating & Cooling", &["calefac", "climatiz", "heating", "aire acondicionado", "caldera", "boiler"]),
    ("Windows", &["ventana", "window", "aluminio", "cristal"]),
    ("Cleaning", &["limpieza", "cleaning"]),
];

pub fn extract_activities(text: &str) -> Extraction {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    for attempt in [numbered, headings, keywords] {
        let extraction = attempt(&lines);
        if extraction.activity_count() > 0 {
            tracing::debug!(
                strategy = %extraction.strategy,
                categories = extraction.categories.len(),
                activities = extraction.activity_count(),
                "budget text extracted"
            );
            return extraction;
        }
    }
    Extraction::none()
}

fn numbered(lines: &[&str]) -> Extraction {
    let mut categories: Vec<(Option<String>, Category)> = Vec::new();
    let mut saw_category = false;

    for line in lines {
        if let Some((number, name)) = numbered_category(line) {
            saw_category = true;
            categories.push((
                Some(number),
                Category {
                    name: name.to_string(),
                    activities: Vec::new(),
                },
            ));
            continue;
        }
        let Some((code, rest)) = dotted_code(line) else {
            continue;
        };
        let (description, amount_cents) = split_amount(rest);
        if description.is_empty() {
            continue;
        }
        let major = code.split('.').next().map(str::to_string);
        let activity = Activity {
            code: Some(code.to_string()),
            description,
            amount_cents,
        };
        let slot = categories
            .iter()
            .rposition(|(number, _)| number.is_some() && *number == major)
            .or_else(|| categories.len().checked_sub(1));
        match slot {
            Some(idx) => categories[idx].1.activities.push(activity),
            None => categories.push((
                None,
                Category {
                    name: UNCATEGORIZED.to_string(),
                    activities: vec![activity],
                },
            )),
        }
    }

    if !saw_category {
        return Extraction::none();
    }
    Extraction {
        strategy: Strategy::Numbered,
        categories: categories
            .into_iter()
            .map(|(_, c)| c)
            .filter(|c| !c.activities.is_empty())
            .collect(),
    }
}

fn headings(lines: &[&str]) -> Extraction {
    let mut categories: Vec<Category> = Vec::new();
    let mut saw_heading = false;

    for line in lines {
        let (description, amount_cents) = split_amount(line);
        if amount_cents.is_none() {
            if is_heading(line) {
                saw_heading = true;
                categories.push(Category {
                    name: strip_list_marker(line).to_string(),
                    activities: Vec::new(),
                });
            }
            continue;
        }
        if description.is_empty() {
            continue;
        }
        let activity = Activity {
            code: None,
            description: strip_list_marker(&description).to_string(),
            amount_cents,
        };
        match categories.last_mut() {
            Some(current) => current.activities.push(activity),
            None => categories.push(Category {
                name: UNCATEGORIZED.to_string(),
                activities: vec![activity],
            }),
        }
    }

    if !saw_heading {
        return Extraction::none();
    }
    Extraction {
        strategy: Strategy::Headings,
        categories: categories
            .into_iter()
            .filter(|c| !c.activities.is_empty())
            .collect(),
    }
}

fn keywords(lines: &[&str]) -> Extraction {
    let mut buckets: Vec<Vec<Activity>> = vec![Vec::new(); TRADES.len()];
    for line in lines {
        let lower = line.to_lowercase();
        let Some(idx) = TRADES
            .iter()
            .position(|(_, keys)| keys.iter().any(|k| lower.contains(k)))
        else {
            continue;
        };
        let (description, amount_cents) = split_amount(line);
        if description.is_empty() {
            continue;
        }
        buckets[idx].push(Activity {
            code: None,
            description: strip_list_marker(&description).to_string(),
            amount_cents,
        });
    }
    Extraction {
        strategy: Strategy::Keywords,
        categories: TRADES
            .iter()
            .zip(buckets)
            .filter(|(_, activities)| !activities.is_empty())
            .map(|((name, _), activities)| Category {
                name: name.to_string(),
                activities,
            })
            .collect(),
    }
}

/// `1. NAME`, `2 - NAME`, `3) NAME`: a bare integer, a separator, then text
/// that is not itself an amount.
fn numbered_category(line: &str) -> Option<(String, &str)> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 || digits > 3 {
        return None;
    }
    let (number, rest) = line.split_at(digits);
    let rest = rest.trim_start();
    let mut chars = rest.chars();
    let sep = chars.next()?;
    if !matches!(sep, '.' | '-' | ')' | '–') {
        return None;
    }
    let after = chars.as_str();
    if !after.starts_with(char::is_whitespace) {
        return None;
    }
    let name = after.trim();
    let (description, amount) = split_amount(name);
    if description.is_empty() || amount.is_some() || !is_heading(name) {
        return None;
    }
    Some((number.to_string(), name))
}

/// `1.1`, `2.3.1`: at least two dot-separated integers followed by text.
fn dotted_code(line: &str) -> Option<(&str, &str)> {
    let end = line
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(line.len());
    let code = line[..end].trim_end_matches('.');
    let parts: Vec<&str> = code.split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let rest = line[end..].trim_start_matches([' ', '\t', '-', ')']).trim();
    if rest.is_empty() {
        return None;
    }
    Some((code, rest))
}

fn is_heading(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 3 && letters.iter().all(|c| !c.is_lowercase())
}

fn strip_list_marker(text: &str) -> &str {
    text.trim_start_matches(['-', '*', '•', ' ', '\t']).trim()
}

/// Split a trailing money amount off `line`, returning the remaining text and
/// the amount in cents.
fn split_amount(line: &str) -> (String, Option<i64>) {
    let trimmed = line.trim();
    let without_currency = trimmed
        .trim_end_matches(['€', '$'])
        .trim_end()
        .trim_end_matches("EUR")
        .trim_end();
    let had_currency = without_currency.len() != trimmed.len();

    let start = without_currency
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.' || *c == ',')
        .last()
        .map(|(i, _)| i);
    let Some(start) = start else {
        return (trimmed.to_string(), None);
    };
    let token = without_currency[start..].trim_start_matches(['.', ',']);
    let before = &without_currency[..start];
    // The amount has to be its own token, after some description.
    let separated = before.ends_with(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '…'));
    let head = before
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '.' | '…'))
        .trim();
    // A bare integer with no currency marker is a quantity or a code.
    let looks_like_money = had_currency || token.contains([',', '.']);
    if head.is_empty() || !separated || !looks_like_money {
        return (trimmed.to_string(), None);
    }
    match parse_cents(token) {
        Some(cents) => (head.to_string(), Some(cents)),
        None => (trimmed.to_string(), None),
    }
}

/// `1.234,56`, `1,234.56`, `320,5`, `1.500` (thousands) and `75` all parse.
/// The last separator is decimal when one or two digits follow it.
fn parse_cents(token: &str) -> Option<i64> {
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let last_sep = token.rfind(['.', ',']);
    let (int_part, frac_part) = match last_sep {
        Some(idx) if (1..=2).contains(&(token.len() - idx - 1)) => {
            (&token[..idx], &token[idx + 1..])
        }
        _ => (token, ""),
    };
    let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
    let units: i64 = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse().ok()?
    };
    let cents: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };
    units.checked_mul(100)?.checked_add(cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_european_and_us_amounts() {
        assert_eq!(parse_cents("1.234,56"), Some(123_456));
        assert_eq!(parse_cents("1,234.56"), Some(123_456));
        assert_eq!(parse_cents("320,5"), Some(32_050));
        assert_eq!(parse_cents("1.500"), Some(150_000));
        assert_eq!(parse_cents("75"), Some(7_500));
        assert_eq!(parse_cents(",."), None);
    }

    #[test]
    fn splits_trailing_amount() {
        assert_eq!(
            split_amount("Cambio de bajante 1.234,56 €"),
            ("Cambio de bajante".to_string(), Some(123_456))
        );
        assert_eq!(
            split_amount("Pintura paredes: 850.00"),
            ("Pintura paredes".to_string(), Some(85_000))
        );
        assert_eq!(split_amount("Puertas 3"), ("Puertas 3".to_string(), None));
        assert_eq!(split_amount("1.234,56 €"), ("1.234,56 €".to_string(), None));
    }

    #[test]
    fn numbered_budget() {
        let text = "\
PRESUPUESTO REFORMA
1. FONTANERÍA
1.1 Cambio de bajante 320,00 €
1.2 Sustitución de grifería 150,50 €
2 - ELECTRICIDAD
2.1 Nuevo cuadro eléctrico 1.200,00 €
2.2 Revisión de enchufes
";
        let ex = extract_activities(text);
        assert_eq!(ex.strategy, Strategy::Numbered);
        assert_eq!(ex.categories.len(), 2);
        assert_eq!(ex.categories[0].name, "FONTANERÍA");
        assert_eq!(ex.categories[0].activities.len(), 2);
        assert_eq!(ex.categories[0].activities[0].code.as_deref(), Some("1.1"));
        assert_eq!(
            ex.categories[0].activities[0].description,
            "Cambio de bajante"
        );
        assert_eq!(ex.categories[1].name, "ELECTRICIDAD");
        assert_eq!(ex.categories[1].activities[1].amount_cents, None);
        assert_eq!(ex.total_cents(), 32_000 + 15_050 + 120_000);
    }

    #[test]
    fn numbered_activity_attaches_to_its_major_number() {
        let text = "1. PINTURA\n2. SUELOS\n1.1 Pintar salón 400,00\n2.1 Tarima 900,00";
        let ex = extract_activities(text);
        assert_eq!(ex.strategy, Strategy::Numbered);
        assert_eq!(ex.categories[0].activities[0].description, "Pintar salón");
        assert_eq!(ex.categories[1].activities[0].description, "Tarima");
    }

    #[test]
    fn heading_budget() {
        let text = "\
COCINA
- Muebles de cocina 2.400,00 €
- Encimera 600 €
BAÑO
Plato de ducha 350,00
Nota sin importe
";
        let ex = extract_activities(text);
        assert_eq!(ex.strategy, Strategy::Headings);
        let names: Vec<&str> = ex.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["COCINA", "BAÑO"]);
        assert_eq!(ex.categories[0].activities[0].description, "Muebles de cocina");
        assert_eq!(ex.categories[0].activities[1].amount_cents, Some(60_000));
        assert_eq!(ex.activity_count(), 3);
    }

    #[test]
    fn keyword_budget() {
        let text = "\
Se realizará la pintura de todas las estancias
revisar instalación eléctrica completa
cambiar la puerta de entrada
limpieza final de obra
";
        let ex = extract_activities(text);
        assert_eq!(ex.strategy, Strategy::Keywords);
        let names: Vec<&str> = ex.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Electricity", "Carpentry", "Painting", "Cleaning"]);
    }

    #[test]
    fn unusable_text_is_none() {
        for text in ["", "   \n\n", "hola, qué tal", "12345"] {
            let ex = extract_activities(text);
            assert_eq!(ex.strategy, Strategy::None, "text {text:?}");
            assert!(ex.categories.is_empty());
        }
    }
}
