//! Reward offers and grants, and the texts summarizing them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

use crate::error::{Error, Result};
use crate::i18n::{enumerate_as_text, Localizer};

/// One reward offered by an ad or granted by a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_max_amount"))]
pub struct Reward {
    /// What the user has to do to earn it, e.g. `callback` or `call2ActionStarted`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub reward_type: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub max_amount: Option<f64>,
    #[validate(length(min = 1))]
    pub currency: String,
}

fn validate_max_amount(reward: &Reward) -> std::result::Result<(), ValidationError> {
    match reward.max_amount {
        Some(max) if max < reward.amount => {
            let mut error = ValidationError::new("max_amount");
            error.message = Some("maxAmount must not be lower than amount".into());
            Err(error)
        }
        _ => Ok(()),
    }
}

impl Reward {
    /// Trusted constructor: the amount invariants are not checked here. Use
    /// [`Reward::validated`] for values that did not originate in code.
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            reward_type: None,
            amount,
            max_amount: None,
            currency: currency.into(),
        }
    }

    pub fn with_max_amount(mut self, max_amount: f64) -> Self {
        self.max_amount = Some(max_amount);
        self
    }

    pub fn with_type(mut self, reward_type: impl Into<String>) -> Self {
        self.reward_type = Some(reward_type.into());
        self
    }

    /// Reject negative amounts, a `max_amount` below `amount` and an empty currency.
    pub fn validated(self) -> Result<Self> {
        self.validate().map_err(|e| {
            Error::InvalidArgument(format!("invalid reward {} {}: {}", self.amount, self.currency, e))
        })?;
        Ok(self)
    }

    /// Build a reward from server JSON, rejecting shapes that break the
    /// amount invariants.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        Reward::deserialize(value)
            .map_err(|e| e.to_string())
            .and_then(|reward| reward.validated().map_err(|e| e.to_string()))
            .map_err(|e| format!("invalid reward {}: {}", value, e))
    }

    /// `up to 20 flintstones` when capped, `5 spears` otherwise, empty when
    /// there is no amount at all.
    pub fn value_description(&self, l10n: &Localizer) -> String {
        match self.max_amount {
            Some(max) if max > self.amount => l10n.translate(
                "reward.withLimit",
                &json!({"reward": format!("{} {}", max, self.currency)}),
            ),
            _ if self.amount > 0.0 => format!("{} {}", self.amount, self.currency),
            _ => String::new(),
        }
    }

    pub fn debug_value_description(&self, l10n: &Localizer) -> String {
        format!(
            "{} for {}",
            self.value_description(l10n),
            self.reward_type.as_deref().unwrap_or("unknown")
        )
    }
}

/// Parse a list of reward objects, dropping (and logging) invalid entries.
pub fn rewards_from_values(values: &[Value]) -> Vec<Reward> {
    values
        .iter()
        .filter_map(|value| match Reward::from_value(value) {
            Ok(reward) => Some(reward),
            Err(e) => {
                log::warn!("ignoring reward: {}", e);
                None
            }
        })
        .collect()
}

pub(crate) fn deserialize_rewards<'de, D>(deserializer: D) -> std::result::Result<Vec<Reward>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(values) => Ok(rewards_from_values(&values)),
        _ => Ok(Vec::new()),
    }
}

/// Returns one reward per currency, in first-seen order.
///
/// `amount` is the sum of the amounts in that currency. `max_amount` sums each
/// reward's maximum, counting rewards without one at their plain amount; it
/// stays `None` if no reward in the currency is capped.
pub fn summarize(rewards: &[Reward]) -> Vec<Reward> {
    struct Totals<'a> {
        currency: &'a str,
        amount: f64,
        max_amount: f64,
        capped: bool,
    }

    let mut totals: Vec<Totals> = Vec::new();
    for reward in rewards {
        let idx = match totals.iter().position(|t| t.currency == reward.currency) {
            Some(idx) => idx,
            None => {
                totals.push(Totals {
                    currency: &reward.currency,
                    amount: 0.0,
                    max_amount: 0.0,
                    capped: false,
                });
                totals.len() - 1
            }
        };
        let t = &mut totals[idx];
        t.amount += reward.amount;
        t.max_amount += reward.max_amount.unwrap_or(reward.amount);
        t.capped |= reward.max_amount.is_some();
    }

    totals
        .into_iter()
        .map(|t| Reward {
            reward_type: None,
            amount: t.amount,
            max_amount: t.capped.then_some(t.max_amount),
            currency: t.currency.to_string(),
        })
        .collect()
}

fn described(rewards: &[Reward], l10n: &Localizer) -> Vec<String> {
    rewards
        .iter()
        .map(|reward| reward.value_description(l10n))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Lists the summarized rewards, e.g. `5 spears and 20 flintstones`.
pub fn enumerate_rewards_as_text(rewards: &[Reward], l10n: &Localizer) -> Result<String> {
    enumerate_as_text(&described(&summarize(rewards), l10n), l10n)
}

/// The total a user can earn, e.g. `up to 10 spears`.
pub fn potential_total_reward_text(rewards: &[Reward], l10n: &Localizer) -> Option<String> {
    let summarized = summarize(rewards);
    match summarized.as_slice() {
        [] => None,
        [single] => {
            let total = single.amount;
            let max_total = single.max_amount.unwrap_or(total);
            let mut types: Vec<Option<&str>> = Vec::new();
            for reward in rewards {
                let t = reward.reward_type.as_deref();
                if !types.contains(&t) {
                    types.push(t);
                }
            }
            if max_total > total || types.len() > 1 {
                Some(l10n.translate(
                    "reward.withLimit",
                    &json!({"reward": format!("{} {}", max_total, single.currency)}),
                ))
            } else {
                Some(format!("{} {}", total, single.currency))
            }
        }
        many => enumerate_as_text(&described(many, l10n), l10n).ok(),
    }
}

/// `Earn up to 10 spears with a quiz`, or `None` without rewards.
pub fn incentive_text_for_rewards(rewards: &[Reward], l10n: &Localizer) -> Option<String> {
    let potential_total_reward = potential_total_reward_text(rewards, l10n)?;
    Some(l10n.translate(
        "reward.incentiveText",
        &json!({"potentialTotalReward": potential_total_reward}),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l10n() -> Localizer {
        Localizer::default()
    }

    fn mocked_rewards() -> Vec<Reward> {
        vec![
            Reward::new(3.0, "spears")
                .with_max_amount(5.0)
                .with_type("call2ActionStarted"),
            Reward::new(3.0, "spears").with_max_amount(5.0).with_type("callback"),
            Reward::new(10.0, "flintstones")
                .with_max_amount(20.0)
                .with_type("callback"),
        ]
    }

    #[test]
    fn value_description_variants() {
        let l10n = l10n();
        assert_eq!(
            Reward::new(10.0, "flintstones")
                .with_max_amount(20.0)
                .value_description(&l10n),
            "up to 20 flintstones"
        );
        assert_eq!(
            Reward::new(5.0, "spears").with_max_amount(5.0).value_description(&l10n),
            "5 spears"
        );
        assert_eq!(Reward::new(0.0, "spears").value_description(&l10n), "");
        assert_eq!(Reward::new(2.5, "gems").value_description(&l10n), "2.5 gems");
    }

    #[test]
    fn debug_value_description_names_the_type() {
        let reward = Reward::new(5.0, "spears").with_type("callback");
        assert_eq!(reward.debug_value_description(&l10n()), "5 spears for callback");
    }

    #[test]
    fn summarize_keeps_first_seen_currency_order() {
        let rewards = vec![
            Reward::new(3.0, "spears"),
            Reward::new(10.0, "flintstones").with_max_amount(20.0),
        ];
        let summarized = summarize(&rewards);
        assert_eq!(summarized.len(), 2);
        assert_eq!(summarized[0], Reward::new(3.0, "spears"));
        assert_eq!(
            summarized[1],
            Reward::new(10.0, "flintstones").with_max_amount(20.0)
        );
    }

    #[test]
    fn summarize_adds_up_amounts_per_currency() {
        let summarized = summarize(&mocked_rewards());
        assert_eq!(
            summarized,
            vec![
                Reward::new(6.0, "spears").with_max_amount(10.0),
                Reward::new(10.0, "flintstones").with_max_amount(20.0),
            ]
        );
    }

    #[test]
    fn summarize_counts_uncapped_rewards_at_their_amount() {
        let rewards = vec![
            Reward::new(10.0, "gems"),
            Reward::new(1.0, "gems").with_max_amount(2.0),
        ];
        assert_eq!(
            summarize(&rewards),
            vec![Reward::new(11.0, "gems").with_max_amount(12.0)]
        );
    }

    #[test]
    fn incentive_text_uses_capped_total_for_one_currency() {
        let rewards = vec![
            Reward::new(3.0, "spears").with_max_amount(5.0),
            Reward::new(3.0, "spears").with_max_amount(5.0),
        ];
        assert_eq!(
            incentive_text_for_rewards(&rewards, &l10n()).as_deref(),
            Some("Earn up to 10 spears with a quiz")
        );
    }

    #[test]
    fn incentive_text_exact_amount_without_cap() {
        let rewards = vec![Reward::new(3.0, "spears"), Reward::new(4.0, "spears")];
        assert_eq!(
            incentive_text_for_rewards(&rewards, &l10n()).as_deref(),
            Some("Earn 7 spears with a quiz")
        );
    }

    #[test]
    fn incentive_text_caps_when_reward_types_are_mixed() {
        let rewards = vec![
            Reward::new(3.0, "spears").with_type("callback"),
            Reward::new(4.0, "spears").with_type("call2ActionStarted"),
        ];
        assert_eq!(
            incentive_text_for_rewards(&rewards, &l10n()).as_deref(),
            Some("Earn up to 7 spears with a quiz")
        );
    }

    #[test]
    fn incentive_text_enumerates_several_currencies() {
        assert_eq!(
            incentive_text_for_rewards(&mocked_rewards(), &l10n()).as_deref(),
            Some("Earn up to 10 spears and up to 20 flintstones with a quiz")
        );
    }

    #[test]
    fn incentive_text_is_none_without_rewards() {
        assert_eq!(incentive_text_for_rewards(&[], &l10n()), None);
    }

    #[test]
    fn enumerate_rewards_lists_each_currency() {
        let rewards = vec![
            Reward::new(5.0, "spears").with_type("call2ActionStarted"),
            Reward::new(20.0, "flintstones").with_type("callback"),
        ];
        assert_eq!(
            enumerate_rewards_as_text(&rewards, &l10n()).unwrap(),
            "5 spears and 20 flintstones"
        );
        assert!(enumerate_rewards_as_text(&[], &l10n()).is_err());
    }

    #[test]
    fn from_value_maps_fields_and_rejects_broken_invariants() {
        let reward = Reward::from_value(&json!({
            "type": "callback",
            "amount": 10,
            "maxAmount": 20,
            "currency": "flintstones",
            "unknownField": true
        }))
        .unwrap();
        assert_eq!(
            reward,
            Reward::new(10.0, "flintstones")
                .with_max_amount(20.0)
                .with_type("callback")
        );

        assert!(Reward::from_value(&json!({"amount": -1, "currency": "spears"})).is_err());
        assert!(
            Reward::from_value(&json!({"amount": 5, "maxAmount": 2, "currency": "spears"}))
                .is_err()
        );
        assert!(Reward::from_value(&json!({"amount": 5})).is_err());
    }

    #[test]
    fn validated_checks_code_built_rewards() {
        assert!(Reward::new(5.0, "spears").with_max_amount(10.0).validated().is_ok());
        assert!(matches!(
            Reward::new(-1.0, "spears").validated(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Reward::new(5.0, "spears").with_max_amount(2.0).validated().is_err());
        assert!(Reward::new(5.0, "").validated().is_err());
    }

    #[test]
    fn rewards_from_values_skips_invalid_entries() {
        let values = vec![
            json!({"amount": 5, "currency": "spears"}),
            json!("not a reward"),
            json!({"amount": 1, "currency": "gems"}),
        ];
        let rewards = rewards_from_values(&values);
        assert_eq!(rewards.len(), 2);
        assert_eq!(rewards[1].currency, "gems");
    }
}
