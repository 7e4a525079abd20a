//! Reward grants reported by the server that wait for client confirmation.

use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::i18n::Localizer;
use crate::protocol::timestamp_from_value;
use crate::reward::{enumerate_rewards_as_text, Reward};

/// Sends confirmations for the given transactions to the server.
pub type ConfirmFn = Rc<dyn Fn(&[Transaction])>;

#[derive(Clone)]
pub struct Transaction {
    pub ad_id: String,
    pub transaction_id: String,
    pub conversion_timestamp: Option<DateTime<Utc>>,
    pub reward: Option<Reward>,
    confirm_fn: ConfirmFn,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("ad_id", &self.ad_id)
            .field("transaction_id", &self.transaction_id)
            .field("conversion_timestamp", &self.conversion_timestamp)
            .field("reward", &self.reward)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.ad_id == other.ad_id
            && self.transaction_id == other.transaction_id
            && self.conversion_timestamp == other.conversion_timestamp
            && self.reward == other.reward
    }
}

impl Transaction {
    fn from_value(value: &Value, confirm_fn: &ConfirmFn) -> Result<Self, String> {
        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| format!("transaction without {}: {}", name, value))
        };
        let reward = match value.get("reward") {
            None | Some(Value::Null) => None,
            Some(raw) => match Reward::from_value(raw) {
                Ok(reward) => Some(reward),
                Err(e) => {
                    log::warn!("ignoring transaction reward: {}", e);
                    None
                }
            },
        };
        Ok(Self {
            ad_id: field("adId")?,
            transaction_id: field("transactionId")?,
            conversion_timestamp: value
                .get("conversionTimestamp")
                .and_then(timestamp_from_value),
            reward,
            confirm_fn: Rc::clone(confirm_fn),
        })
    }

    /// Confirm just this transaction. Fire and forget.
    pub fn confirm(&self) {
        (self.confirm_fn)(std::slice::from_ref(self));
    }

    pub fn reward_confirmation_text(&self, l10n: &Localizer) -> Option<String> {
        let reward = self.reward.as_ref()?;
        Some(l10n.translate(
            "transaction.confirmationText",
            &json!({"oneOrMoreRewards": reward.value_description(l10n)}),
        ))
    }
}

/// A batch of open transactions together with texts summarizing it.
#[derive(Clone, Default)]
pub struct Transactions {
    items: Vec<Transaction>,
    summarized_rewards_text: Option<String>,
    summarized_reward_confirmation_text: Option<String>,
    confirm_fn: Option<ConfirmFn>,
}

impl fmt::Debug for Transactions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transactions")
            .field("items", &self.items)
            .field("summarized_rewards_text", &self.summarized_rewards_text)
            .field(
                "summarized_reward_confirmation_text",
                &self.summarized_reward_confirmation_text,
            )
            .finish_non_exhaustive()
    }
}

impl Deref for Transactions {
    type Target = [Transaction];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<'a> IntoIterator for &'a Transactions {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Transactions {
    /// E.g. `5 spears and 20 flintstones`; `None` when no transaction carries a reward.
    pub fn summarized_rewards_text(&self) -> Option<&str> {
        self.summarized_rewards_text.as_deref()
    }

    /// E.g. `Congratulations, you earned 5 spears and 20 flintstones!`.
    pub fn summarized_reward_confirmation_text(&self) -> Option<&str> {
        self.summarized_reward_confirmation_text.as_deref()
    }

    pub fn rewards(&self) -> Vec<Reward> {
        self.items.iter().filter_map(|t| t.reward.clone()).collect()
    }

    /// Confirm the whole batch in one request.
    pub fn confirm_all(&self) {
        if let Some(confirm_fn) = &self.confirm_fn {
            if !self.items.is_empty() {
                confirm_fn(&self.items);
            }
        }
    }
}

/// Build the transaction batch of an `openTransactions` event.
///
/// Anything but a non-empty array yields an empty batch. Entries without
/// `adId`/`transactionId` and repeated transaction ids are skipped.
pub fn transactions_from_json(
    raw: Option<&Value>,
    confirm_fn: ConfirmFn,
    l10n: &Localizer,
) -> Transactions {
    let Some(Value::Array(values)) = raw else {
        return Transactions::default();
    };

    let mut items: Vec<Transaction> = Vec::with_capacity(values.len());
    for value in values {
        match Transaction::from_value(value, &confirm_fn) {
            Ok(transaction) => {
                if items
                    .iter()
                    .any(|t| t.transaction_id == transaction.transaction_id)
                {
                    log::warn!(
                        "dropping duplicate transaction id {}",
                        transaction.transaction_id
                    );
                    continue;
                }
                items.push(transaction);
            }
            Err(e) => log::warn!("ignoring transaction: {}", e),
        }
    }
    if items.is_empty() {
        return Transactions::default();
    }

    let rewards: Vec<Reward> = items.iter().filter_map(|t| t.reward.clone()).collect();
    let summarized_rewards_text = if rewards.is_empty() {
        None
    } else {
        enumerate_rewards_as_text(&rewards, l10n).ok()
    };
    let summarized_reward_confirmation_text = Some(match &summarized_rewards_text {
        Some(text) => l10n.translate(
            "transaction.confirmationText",
            &json!({"oneOrMoreRewards": text}),
        ),
        None => l10n.translate("transaction.confirmationTextUnspecified", &json!({})),
    });

    Transactions {
        items,
        summarized_rewards_text,
        summarized_reward_confirmation_text,
        confirm_fn: Some(confirm_fn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    type Confirmed = Rc<RefCell<Vec<Vec<String>>>>;

    fn recording_confirm() -> (ConfirmFn, Confirmed) {
        let confirmed: Confirmed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&confirmed);
        let confirm_fn: ConfirmFn = Rc::new(move |batch: &[Transaction]| {
            sink.borrow_mut()
                .push(batch.iter().map(|t| t.transaction_id.clone()).collect());
        });
        (confirm_fn, confirmed)
    }

    fn open_transactions() -> Value {
        json!([
            {
                "adId": "adId2",
                "transactionId": "4712",
                "conversionTimestamp": "2016-04-24T16:00:00Z",
                "reward": {"amount": 5, "currency": "spears", "type": "call2ActionStarted"}
            },
            {
                "adId": "adId1",
                "transactionId": "4711",
                "conversionTimestamp": "2016-04-24T16:00:00Z",
                "reward": {"amount": 20, "currency": "flintstones", "type": "callback"}
            }
        ])
    }

    #[test]
    fn empty_or_malformed_input_gives_empty_batch() {
        let l10n = Localizer::default();
        for raw in [None, Some(json!([])), Some(json!({"not": "a list"}))] {
            let (confirm_fn, confirmed) = recording_confirm();
            let transactions = transactions_from_json(raw.as_ref(), confirm_fn, &l10n);
            assert!(transactions.is_empty());
            assert_eq!(transactions.summarized_rewards_text(), None);
            assert_eq!(transactions.summarized_reward_confirmation_text(), None);
            transactions.confirm_all();
            assert!(confirmed.borrow().is_empty());
        }
    }

    #[test]
    fn batch_carries_summary_texts() {
        let (confirm_fn, _) = recording_confirm();
        let raw = open_transactions();
        let transactions = transactions_from_json(Some(&raw), confirm_fn, &Localizer::default());
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].ad_id, "adId2");
        assert_eq!(
            transactions[0].reward,
            Some(Reward::new(5.0, "spears").with_type("call2ActionStarted"))
        );
        assert!(transactions[0].conversion_timestamp.is_some());
        assert_eq!(
            transactions.summarized_rewards_text(),
            Some("5 spears and 20 flintstones")
        );
        assert_eq!(
            transactions.summarized_reward_confirmation_text(),
            Some("Congratulations, you earned 5 spears and 20 flintstones!")
        );
        assert_eq!(
            transactions[1]
                .reward_confirmation_text(&Localizer::default())
                .as_deref(),
            Some("Congratulations, you earned 20 flintstones!")
        );
    }

    #[test]
    fn confirm_passes_only_the_single_transaction() {
        let (confirm_fn, confirmed) = recording_confirm();
        let raw = open_transactions();
        let transactions = transactions_from_json(Some(&raw), confirm_fn, &Localizer::default());
        for transaction in &transactions {
            transaction.confirm();
        }
        assert_eq!(
            *confirmed.borrow(),
            vec![vec!["4712".to_string()], vec!["4711".to_string()]]
        );
    }

    #[test]
    fn confirm_all_passes_the_whole_batch() {
        let (confirm_fn, confirmed) = recording_confirm();
        let raw = open_transactions();
        let transactions = transactions_from_json(Some(&raw), confirm_fn, &Localizer::default());
        transactions.confirm_all();
        assert_eq!(
            *confirmed.borrow(),
            vec![vec!["4712".to_string(), "4711".to_string()]]
        );
    }

    #[test]
    fn duplicates_and_incomplete_entries_are_skipped() {
        let (confirm_fn, _) = recording_confirm();
        let raw = json!([
            {"adId": "a", "transactionId": "1"},
            {"adId": "a", "transactionId": "1"},
            {"adId": "b"},
            "garbage"
        ]);
        let transactions = transactions_from_json(Some(&raw), confirm_fn, &Localizer::default());
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions.summarized_rewards_text(), None);
        assert_eq!(
            transactions.summarized_reward_confirmation_text(),
            Some("Congratulations, you earned a reward!")
        );
        assert_eq!(transactions[0].reward_confirmation_text(&Localizer::default()), None);
    }
}
