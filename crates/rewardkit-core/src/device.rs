use serde::Deserialize;

/// What the placement tells the ad server about the device it runs on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceInfo {
    pub user_agent: String,
    /// Preferred languages, most preferred first (`de-DE`, `en`, ...).
    #[serde(default)]
    pub languages: Vec<String>,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            user_agent: format!("rewardkit/{}", env!("CARGO_PKG_VERSION")),
            languages: vec!["en".to_string()],
        }
    }
}

fn two_letter(language: &str) -> String {
    language.chars().take(2).collect()
}

impl DeviceInfo {
    pub fn new(user_agent: impl Into<String>, languages: Vec<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            languages,
        }
    }

    /// Two-letter code of the most preferred language.
    pub fn language(&self) -> String {
        self.languages
            .first()
            .map(|l| two_letter(l))
            .unwrap_or_else(|| "en".to_string())
    }

    /// Unique two-letter codes of all preferred languages, in preference order.
    pub fn language_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        for code in self.languages.iter().map(|l| two_letter(l)) {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        if codes.is_empty() {
            codes.push(self.language());
        }
        codes
    }

    pub fn platform_type(&self) -> &'static str {
        let ua = self.user_agent.as_str();
        if ua.contains("Windows") {
            "Windows"
        } else if ua.contains("iPhone") {
            "iOS"
        } else if ua.contains("Macintosh") {
            "Macintosh"
        } else if ua.contains("Android") {
            "Android"
        } else if ua.contains("Linux") {
            "Linux"
        } else {
            "Unknown"
        }
    }
}
