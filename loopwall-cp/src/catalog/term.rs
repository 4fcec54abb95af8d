//! Search term parsing
//!
//! A block's search term is free text with optional exclusion tokens: a
//! token prefixed with `-` rejects matches, everything else is ANDed as the
//! inclusion query. Matching is case-insensitive throughout, so tokens are
//! lowercased at parse time.

/// A parsed search term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    /// Tokens that must all appear in a candidate's text
    pub include: Vec<String>,
    /// Tokens that reject a candidate on substring match
    pub exclude: Vec<String>,
}

impl SearchTerm {
    pub fn parse(raw: &str) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();

        for token in raw.split_whitespace() {
            if let Some(stripped) = token.strip_prefix('-') {
                if !stripped.is_empty() {
                    exclude.push(stripped.to_lowercase());
                }
            } else {
                include.push(token.to_lowercase());
            }
        }

        SearchTerm { include, exclude }
    }

    /// The inclusion tokens re-joined, used for exact-phrase ranking
    pub fn phrase(&self) -> String {
        self.include.join(" ")
    }

    /// True when nothing would be searched for
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_include_and_exclude_tokens() {
        let term = SearchTerm::parse("dogs -puppy");
        assert_eq!(term.include, vec!["dogs"]);
        assert_eq!(term.exclude, vec!["puppy"]);
    }

    #[test]
    fn lowercases_tokens() {
        let term = SearchTerm::parse("Space Documentary -NASA");
        assert_eq!(term.include, vec!["space", "documentary"]);
        assert_eq!(term.exclude, vec!["nasa"]);
        assert_eq!(term.phrase(), "space documentary");
    }

    #[test]
    fn bare_dash_is_ignored() {
        let term = SearchTerm::parse("cats -");
        assert_eq!(term.include, vec!["cats"]);
        assert!(term.exclude.is_empty());
    }

    #[test]
    fn empty_input_parses_empty() {
        assert!(SearchTerm::parse("   ").is_empty());
    }
}
