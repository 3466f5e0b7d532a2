use once_cell::sync::Lazy;
use regex::Regex;

static PHRASE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());

/// Local keyword matching for sources without server-side full-text search.
///
/// A query is bare tokens plus optional quoted phrases. A record matches iff
/// every phrase and every token appears as a case-insensitive substring of
/// title + abstract. All conditions are conjunctive; there is no OR or
/// negation operator.
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    phrases: Vec<String>,
    tokens: Vec<String>,
}

impl QueryMatcher {
    pub fn parse(query: &str) -> Self {
        let lowered = query.to_lowercase();

        let phrases = PHRASE_RE
            .captures_iter(&lowered)
            .map(|c| c[1].to_string())
            .collect();

        let remaining = PHRASE_RE.replace_all(&lowered, " ");
        let tokens = remaining
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect();

        Self { phrases, tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty() && self.tokens.is_empty()
    }

    pub fn matches(&self, title: &str, abstract_text: &str) -> bool {
        let haystack = format!("{} {}", title.to_lowercase(), abstract_text.to_lowercase());

        self.phrases.iter().all(|p| haystack.contains(p.as_str()))
            && self.tokens.iter().all(|t| haystack.contains(t.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_tokens_are_conjunctive() {
        let m = QueryMatcher::parse("liver microbiome");
        assert!(m.matches("Liver disease", "changes in the gut microbiome"));
        assert!(!m.matches("Liver disease", "no mention of the other term"));
    }

    #[test]
    fn quoted_phrase_must_match_exactly() {
        let m = QueryMatcher::parse(r#""biliary atresia" outcome"#);
        assert!(m.matches("Biliary atresia outcomes in infants", ""));
        // Both words present but not adjacent: the phrase fails.
        assert!(!m.matches("Atresia of the biliary tree", "outcome data"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let m = QueryMatcher::parse(r#""Gut-Liver AXIS""#);
        assert!(m.matches("", "the gut-liver axis in cirrhosis"));
    }

    #[test]
    fn phrase_and_tokens_both_required() {
        let m = QueryMatcher::parse(r#""bile acid" transplant"#);
        assert!(m.matches("Bile acid signalling", "after liver transplant"));
        assert!(!m.matches("Bile acid signalling", "no surgery mentioned"));
    }

    #[test]
    fn empty_query_matches_everything() {
        let m = QueryMatcher::parse("");
        assert!(m.is_empty());
        assert!(m.matches("anything", "at all"));
    }
}
