//! English pluralization for table-name inference.

use crate::entity::naming::capitalize_first;

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "deer",
    "news",
    "metadata",
    "feedback",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("tooth", "teeth"),
    ("foot", "feet"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("ox", "oxen"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("knife", "knives"),
    ("wife", "wives"),
    ("half", "halves"),
    ("quiz", "quizzes"),
    ("criterion", "criteria"),
    ("datum", "data"),
];

/// Plural form of a single English word.
///
/// A leading capital in the input is kept in the output.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    let plural = plural_of_lowercase(&lower);

    if word.chars().next().is_some_and(char::is_uppercase) {
        capitalize_first(&plural)
    } else {
        plural
    }
}

fn plural_of_lowercase(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
        return (*plural).to_string();
    }

    if let Some(stem) = word.strip_suffix('y') {
        let preceded_by_consonant = stem
            .chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
        if preceded_by_consonant {
            return format!("{}ies", stem);
        }
    }

    if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        return format!("{}es", word);
    }

    format!("{}s", word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_plurals() {
        assert_eq!(pluralize("invoice"), "invoices");
        assert_eq!(pluralize("line"), "lines");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_suffix_rules() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(pluralize("match"), "matches");
        assert_eq!(pluralize("wish"), "wishes");
        assert_eq!(pluralize("buzz"), "buzzes");
    }

    #[test]
    fn test_irregular_and_uncountable() {
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("child"), "children");
        assert_eq!(pluralize("sheep"), "sheep");
        assert_eq!(pluralize("news"), "news");
    }

    #[test]
    fn test_capitalization_is_kept() {
        assert_eq!(pluralize("Category"), "Categories");
        assert_eq!(pluralize("Person"), "People");
        assert_eq!(pluralize(""), "");
    }
}
