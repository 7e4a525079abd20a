//! Translated UI strings for reward and transaction texts.

use handlebars::Handlebars;
use phf::phf_map;
use serde_json::{json, Value};

use crate::error::{Error, Result};

pub const DEFAULT_LOCALE: &str = "en";

static EN: phf::Map<&'static str, &'static str> = phf_map! {
    "reward.withLimit" => "up to {{reward}}",
    "reward.incentiveText" => "Earn {{potentialTotalReward}} with a quiz",
    "transaction.confirmationText" => "Congratulations, you earned {{oneOrMoreRewards}}!",
    "transaction.confirmationTextUnspecified" => "Congratulations, you earned a reward!",
    "enum.two" => "{{first}} and {{second}}",
    "enum.moreThanTwo" => "{{commaSeparated}}, and {{last}}",
    "dismissDialog.rewardUnspecifiedText" => "Are you sure you want to miss out on this offer?",
    "dismissDialog.rewardSpecifiedText" => "Are you sure you want to miss out on {{rewardName}}?",
    "dismissDialog.dismissButton" => "Give up",
    "dismissDialog.resumeButton" => "Continue and claim reward",
};

static DE: phf::Map<&'static str, &'static str> = phf_map! {
    "reward.withLimit" => "bis zu {{reward}}",
    "reward.incentiveText" => "Verdiene {{potentialTotalReward}} mit einem Quiz",
    "transaction.confirmationText" => "Herzlichen Glückwunsch zu {{oneOrMoreRewards}}!",
    "transaction.confirmationTextUnspecified" => "Deine Belohnung ist unterwegs!",
    "enum.two" => "{{first}} und {{second}}",
    "enum.moreThanTwo" => "{{commaSeparated}} und {{last}}",
    "dismissDialog.rewardUnspecifiedText" => "Willst du dir das Angebot wirklich entgehen lassen?",
    "dismissDialog.rewardSpecifiedText" => "Willst du die Aktion wirklich beenden? Du verpasst {{rewardName}}.",
    "dismissDialog.dismissButton" => "Aufgeben",
    "dismissDialog.resumeButton" => "Weitermachen und Belohnung erhalten",
};

static FR: phf::Map<&'static str, &'static str> = phf_map! {
    "reward.withLimit" => "Jusqu‘à {{reward}}",
    "reward.incentiveText" => "Gagne {{potentialTotalReward}} avec un quiz",
    "transaction.confirmationText" => "Félicitations, tu as gagné {{oneOrMoreRewards}} !",
    "transaction.confirmationTextUnspecified" => "Félicitations, tu as gagné une récompense !",
    "enum.two" => "{{first}} et {{second}}",
    "enum.moreThanTwo" => "{{commaSeparated}}, et {{last}}",
    "dismissDialog.rewardUnspecifiedText" => "Es-tu sûr de vouloir quitter et manquer cette offre ?",
    "dismissDialog.rewardSpecifiedText" => "Es-tu sûr de vouloir quitter et manquer {{rewardName}} ?",
    "dismissDialog.dismissButton" => "Quitter et renoncer à la récompense",
    "dismissDialog.resumeButton" => "Continuer et réclamer la récompense",
};

fn table(locale: &str) -> Option<&'static phf::Map<&'static str, &'static str>> {
    match locale {
        "en" => Some(&EN),
        "de" => Some(&DE),
        "fr" => Some(&FR),
        _ => None,
    }
}

pub fn is_supported_locale(locale: &str) -> bool {
    table(locale).is_some()
}

fn language_code(locale: &str) -> String {
    locale.chars().take(2).collect::<String>().to_lowercase()
}

fn expand_locale(requested: &str) -> [String; 3] {
    [
        requested.to_string(),
        requested.replace('_', "-"),
        language_code(requested),
    ]
}

/// Render a handlebars template without HTML escaping.
pub fn render_template_str(tmpl: &str, data: &Value) -> String {
    let mut reg = Handlebars::new();
    // Texts end up in native labels, not in markup.
    reg.register_escape_fn(handlebars::no_escape);
    reg.render_template(tmpl, data).unwrap_or_else(|e| {
        log::warn!("could not render template {:?}: {}", tmpl, e);
        tmpl.to_string()
    })
}

/// Picks translations following a locale preference list.
///
/// Candidates are tried in order: the override locale, the device languages,
/// then [`DEFAULT_LOCALE`]. Each candidate is also tried with `_` replaced by
/// `-` and reduced to its two-letter language code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Localizer {
    override_locale: Option<String>,
    languages: Vec<String>,
}

impl Localizer {
    pub fn new(override_locale: Option<String>, languages: Vec<String>) -> Self {
        Self {
            override_locale: override_locale.filter(|l| !l.trim().is_empty()),
            languages,
        }
    }

    pub fn with_override(mut self, locale: impl Into<String>) -> Self {
        self.override_locale = Some(locale.into());
        self
    }

    /// Two-letter code of the most preferred language.
    pub fn language_code(&self) -> String {
        self.override_locale
            .as_deref()
            .or_else(|| self.languages.first().map(String::as_str))
            .map(language_code)
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let requested = self
            .override_locale
            .iter()
            .chain(self.languages.iter())
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_LOCALE));
        for locale in requested {
            for candidate in expand_locale(locale) {
                if !candidate.is_empty() && !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    pub fn template(&self, key: &str) -> Option<&'static str> {
        self.candidates()
            .iter()
            .filter_map(|locale| table(locale))
            .find_map(|t| t.get(key).copied())
    }

    /// Translate `key` and fill its placeholders from `data`. Unknown keys
    /// come back untranslated.
    pub fn translate(&self, key: &str, data: &Value) -> String {
        match self.template(key) {
            Some(tmpl) => render_template_str(tmpl, data),
            None => key.to_string(),
        }
    }
}

/// Join items into a natural-language list: `A`, `A and B`, `A, B, and C`.
pub fn enumerate_as_text(items: &[String], l10n: &Localizer) -> Result<String> {
    match items {
        [] => Err(Error::InvalidArgument(
            "please supply one or more strings to enumerate".to_string(),
        )),
        [only] => Ok(only.clone()),
        [first, second] => Ok(l10n.translate("enum.two", &json!({"first": first, "second": second}))),
        [head @ .., last] => Ok(l10n.translate(
            "enum.moreThanTwo",
            &json!({"commaSeparated": head.join(", "), "last": last}),
        )),
    }
}
