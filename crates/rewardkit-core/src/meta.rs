use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::i18n::Localizer;
use crate::protocol::{AdCreative, AdResponse};
use crate::reward::{incentive_text_for_rewards, potential_total_reward_text, summarize, Reward};

pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 200;

/// An image attached to an ad, e.g. the `header` thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdImage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// URL with `{{width}}` and `{{height}}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl AdImage {
    /// Image URL for the requested size. Missing dimensions become `0`, which
    /// the image server reads as "keep aspect ratio". Without a template the
    /// precomputed `url` is returned unchanged.
    pub fn url(&self, width: Option<u32>, height: Option<u32>) -> Option<String> {
        match &self.url_template {
            Some(template) => Some(
                template
                    .replacen("{{width}}", &width.unwrap_or(0).to_string(), 1)
                    .replacen("{{height}}", &height.unwrap_or(0).to_string(), 1),
            ),
            None => self.url.clone(),
        }
    }
}

/// What the embedder gets to know about a loaded ad before showing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdMetaInfo {
    pub potential_rewards: Vec<Reward>,
    /// Total of the first currency on offer.
    pub maximal_reward: Option<Reward>,
    pub incentive_text: Option<String>,
    pub ad: Option<AdCreative>,
    pub images: Vec<AdImage>,
    potential_total_reward: Option<String>,
}

impl AdMetaInfo {
    pub fn from_response(response: &AdResponse, l10n: &Localizer) -> Self {
        let potential_rewards = response.rewards.clone();
        Self {
            maximal_reward: summarize(&potential_rewards).into_iter().next(),
            incentive_text: incentive_text_for_rewards(&potential_rewards, l10n),
            potential_total_reward: potential_total_reward_text(&potential_rewards, l10n),
            ad: response.ad.clone(),
            images: response.images.clone(),
            potential_rewards,
        }
    }

    /// URL of the `header` image, squared to `width` (default 200).
    pub fn squared_thumbnail_url(&self, width: Option<u32>) -> Option<String> {
        self.images
            .iter()
            .find(|image| image.kind.as_deref() == Some("header"))
            .and_then(|image| image.url(Some(width.unwrap_or(DEFAULT_THUMBNAIL_WIDTH)), None))
    }

    /// Question asked before the user abandons the ad.
    pub fn dismiss_prompt(&self, l10n: &Localizer) -> String {
        match &self.potential_total_reward {
            Some(reward_name) => l10n.translate(
                "dismissDialog.rewardSpecifiedText",
                &json!({"rewardName": reward_name}),
            ),
            None => l10n.translate("dismissDialog.rewardUnspecifiedText", &json!({})),
        }
    }
}
