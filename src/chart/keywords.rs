//! Analytics tool detection.

use crate::config::DEFAULT_CHART_KEYWORDS;

/// Case-insensitive substring set identifying tools whose output may carry a
/// chart. This is a heuristic; misses are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsKeywords {
    words: Vec<String>,
}

impl AnalyticsKeywords {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        let name = tool_name.to_lowercase();
        self.words.iter().any(|w| name.contains(w.as_str()))
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

impl Default for AnalyticsKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_CHART_KEYWORDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_matches_case_insensitively() {
        let kw = AnalyticsKeywords::default();
        assert!(kw.matches("agent-sales-analytics"));
        assert!(kw.matches("Query_Genie"));
        assert!(kw.matches("execute_query"));
        assert!(!kw.matches("web_search"));
    }

    #[test]
    fn blank_words_never_match_everything() {
        let kw = AnalyticsKeywords::new(["", "  ", "Revenue"]);
        assert_eq!(kw.words(), ["revenue".to_string()]);
        assert!(!kw.matches("weather"));
        assert!(kw.matches("revenue_tool"));
    }
}
