use intl_pluralrules::{PluralCategory, PluralRuleType, PluralRules};
use unic_langid::LanguageIdentifier;

/// Which CLDR rule set to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralKind {
    /// "1 item", "2 items"
    Cardinal,
    /// "1st", "2nd"
    Ordinal,
}

impl PluralKind {
    const fn rule_type(self) -> PluralRuleType {
        match self {
            Self::Cardinal => PluralRuleType::CARDINAL,
            Self::Ordinal => PluralRuleType::ORDINAL,
        }
    }
}

/// CLDR plural category name (`zero`, `one`, `two`, `few`, `many` or
/// `other`) of `value` in `locale`.
///
/// An unknown locale falls back to its language subtag, then to `en`.
#[must_use]
pub fn category(locale: &str, value: f64, kind: PluralKind) -> &'static str {
    let Some(rules) = rules_for(locale, kind) else {
        return "other";
    };
    match rules.select(value) {
        Ok(category) => category_name(category),
        Err(_) => "other",
    }
}

fn rules_for(locale: &str, kind: PluralKind) -> Option<PluralRules> {
    let language = locale.split(['-', '_']).next().unwrap_or(locale);
    [locale, language, "en"]
        .into_iter()
        .filter_map(|candidate| candidate.parse::<LanguageIdentifier>().ok())
        .find_map(|langid| PluralRules::create(langid, kind.rule_type()).ok())
}

const fn category_name(category: PluralCategory) -> &'static str {
    match category {
        PluralCategory::ZERO => "zero",
        PluralCategory::ONE => "one",
        PluralCategory::TWO => "two",
        PluralCategory::FEW => "few",
        PluralCategory::MANY => "many",
        PluralCategory::OTHER => "other",
    }
}
