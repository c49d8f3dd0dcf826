use serde::Deserialize;

use crate::scraper::{AdCard, ScraperConfig};

/// Builds the page scripts used by the scraper and reads their results
pub struct CardExtractor {
    config: ScraperConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCard {
    #[serde(default)]
    text: String,
    media_url: Option<String>,
    link: Option<String>,
}

impl CardExtractor {
    pub fn new(config: ScraperConfig) -> Self {
        Self { config }
    }

    fn selector_literal(&self) -> String {
        format!("'{}'", self.config.card_selector.replace('\'', "\\'"))
    }

    /// JavaScript returning the number of cards currently on the page
    pub fn count_script(&self) -> String {
        format!(
            "document.querySelectorAll({}).length",
            self.selector_literal()
        )
    }

    /// JavaScript returning the current document height
    pub fn height_script(&self) -> &'static str {
        "document.body ? document.body.scrollHeight : 0"
    }

    /// JavaScript scrolling to the bottom and returning the height it scrolled to
    pub fn scroll_script(&self) -> &'static str {
        "(() => { window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight; })()"
    }

    /// Generate JavaScript collecting every card on the page
    ///
    /// Each card yields its visible text, the first image/video source and
    /// the first outbound link.
    pub fn cards_script(&self) -> String {
        let selector = self.selector_literal();

        format!(
            r#"
            (() => {{
                const cards = [];
                for (const el of document.querySelectorAll({selector})) {{
                    const video = el.querySelector('video');
                    const img = el.querySelector('img:not([alt])') || el.querySelector('img');
                    const link = el.querySelector('a[href]');
                    cards.push({{
                        text: el.innerText || '',
                        mediaUrl: video ? (video.src || video.poster || null) : (img ? img.src : null),
                        link: link ? link.href : null
                    }});
                }}
                return cards;
            }})()
            "#
        )
    }

    /// Convert the result of [`cards_script`](Self::cards_script) into cards,
    /// dropping the ones without the configured marker.
    pub fn parse_cards(&self, value: serde_json::Value) -> Vec<AdCard> {
        let raw: Vec<RawCard> = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Unexpected card data from page: {}", e);
                return Vec::new();
            }
        };

        raw.into_iter()
            .filter(|card| card.text.contains(&self.config.card_marker))
            .map(|card| AdCard {
                text: card.text.trim().to_string(),
                media_url: card.media_url.filter(|u| !u.is_empty()),
                link: card.link.filter(|u| !u.is_empty()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scripts_use_selector() {
        let config = ScraperConfig {
            card_selector: "div.card[data-kind='ad']".to_string(),
            ..Default::default()
        };
        let extractor = CardExtractor::new(config);

        assert!(extractor
            .count_script()
            .contains(r"'div.card[data-kind=\'ad\']'"));
        assert!(extractor.cards_script().contains("querySelectorAll('div.card"));
    }

    #[test]
    fn test_parse_cards_filters_marker() {
        let extractor = CardExtractor::new(ScraperConfig::default());
        let value = json!([
            { "text": " Library ID: 123\nStarted running on 1 May 2024 ", "mediaUrl": "https://cdn/x.jpg", "link": "" },
            { "text": "Sponsored", "mediaUrl": null, "link": null }
        ]);

        let cards = extractor.parse_cards(value);
        assert_eq!(cards.len(), 1);
        assert!(cards[0].text.starts_with("Library ID: 123"));
        assert_eq!(cards[0].media_url.as_deref(), Some("https://cdn/x.jpg"));
        assert_eq!(cards[0].link, None);
    }

    #[test]
    fn test_parse_cards_bad_shape() {
        let extractor = CardExtractor::new(ScraperConfig::default());
        assert!(extractor.parse_cards(json!({ "oops": true })).is_empty());
        assert!(extractor.parse_cards(json!(null)).is_empty());
    }
}
