//! Keyword-prefix intent classification.

use crate::provider::Capability;

/// Image-intent keywords, matched as case-insensitive prefixes in this order.
pub const DEFAULT_IMAGE_KEYWORDS: &[&str] = &[
    "صورة", "ارسم", "تخيل", "توليد", "صمم", "image", "imagine", "draw",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub capability: Capability,
    /// For images: the text after the keyword; otherwise the whole input.
    pub payload: String,
}

impl Intent {
    /// An image request with nothing to draw.
    pub fn is_empty_image_prompt(&self) -> bool {
        self.capability == Capability::Image && self.payload.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    keywords: Vec<String>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_KEYWORDS.iter().copied())
    }
}

impl IntentClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(Into::into)
                .filter(|k| !k.trim().is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, raw_text: &str) -> Intent {
        let text = raw_text.trim();
        for keyword in &self.keywords {
            if let Some(rest) = strip_prefix_ignore_case(text, keyword) {
                return Intent {
                    capability: Capability::Image,
                    payload: rest.trim().to_string(),
                };
            }
        }
        Intent {
            capability: Capability::Text,
            payload: text.to_string(),
        }
    }
}

/// Compare char by char so the returned slice stays on a boundary of `text`
/// even when lowercasing changes byte lengths.
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or("", |(i, _)| &text[i..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_trimmed_verbatim() {
        let intent = IntentClassifier::default().classify("  كيف حالك؟ \n");
        assert_eq!(intent.capability, Capability::Text);
        assert_eq!(intent.payload, "كيف حالك؟");
    }

    #[test]
    fn test_english_keyword_is_case_insensitive() {
        let intent = IntentClassifier::default().classify("DRAW a red fox at dawn");
        assert_eq!(intent.capability, Capability::Image);
        assert_eq!(intent.payload, "a red fox at dawn");
    }

    #[test]
    fn test_arabic_keyword_is_stripped() {
        let intent = IntentClassifier::default().classify("ارسم قطة في الفضاء");
        assert_eq!(intent.capability, Capability::Image);
        assert_eq!(intent.payload, "قطة في الفضاء");
    }

    #[test]
    fn test_bare_keyword_yields_empty_prompt() {
        let intent = IntentClassifier::default().classify("ارسم");
        assert_eq!(intent.capability, Capability::Image);
        assert_eq!(intent.payload, "");
        assert!(intent.is_empty_image_prompt());
    }

    #[test]
    fn test_keyword_must_be_a_prefix() {
        let intent = IntentClassifier::default().classify("please draw a cat");
        assert_eq!(intent.capability, Capability::Text);
    }

    #[test]
    fn test_first_keyword_in_order_wins() {
        let classifier = IntentClassifier::new(["im", "image"]);
        let intent = classifier.classify("image of a boat");
        assert_eq!(intent.payload, "age of a boat");
    }

    #[test]
    fn test_imagine_is_recognized() {
        let intent = IntentClassifier::default().classify("Imagine a castle");
        assert_eq!(intent.capability, Capability::Image);
        assert_eq!(intent.payload, "a castle");
    }

    #[test]
    fn test_prefix_helper_handles_multibyte_case_folding() {
        assert_eq!(strip_prefix_ignore_case("ÄBC rest", "äbc"), Some(" rest"));
        assert_eq!(strip_prefix_ignore_case("ab", "abc"), None);
    }
}
