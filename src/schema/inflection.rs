//! Name inflections used to derive target classes and foreign keys.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ACRONYM_BOUNDARY: Regex = Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap();
    static ref WORD_BOUNDARY: Regex = Regex::new(r"([a-z\d])([A-Z])").unwrap();
    static ref SINGULAR_RULES: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?i)ss$").unwrap(), "ss"),
        (Regex::new(r"(?i)([^aeiou])ies$").unwrap(), "${1}y"),
        (Regex::new(r"(?i)(x|ch|ss|sh|zz)es$").unwrap(), "${1}"),
        (Regex::new(r"(?i)s$").unwrap(), ""),
    ];
}

/// `PetOwner` -> `pet_owner`.
pub fn underscore(name: &str) -> String {
    let spaced = ACRONYM_BOUNDARY.replace_all(name, "${1}_${2}");
    let spaced = WORD_BOUNDARY.replace_all(&spaced, "${1}_${2}");
    spaced.replace('-', "_").to_lowercase()
}

/// `vet_visit` -> `VetVisit`.
pub fn camelize(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// `addresses` -> `address`, `vet_visits` -> `vet_visit`. Words without a plural
/// ending pass through.
pub fn singularize(word: &str) -> String {
    for (rule, replacement) in SINGULAR_RULES.iter() {
        if rule.is_match(word) {
            return rule.replace(word, *replacement).into_owned();
        }
    }
    word.to_string()
}

/// Class name an association points at when none is given: `phone_numbers` -> `PhoneNumber`.
pub fn classify(association: &str) -> String {
    camelize(&singularize(association))
}

/// Foreign key named after a class: `Person` -> `person_id`.
pub fn foreign_key(class: &str) -> String {
    format!("{}_id", underscore(class))
}
