use std::fmt;
use thiserror::Error;

/// Error for a malformed `like` pattern literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid pattern `{literal}`: {reason}")]
pub struct PatternError {
    pub literal: String,
    pub reason: String,
}

/// One element of a `like` pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternElem {
    /// A literal character to match exactly.
    Char(char),
    /// `*`: matches zero or more characters.
    Wildcard,
}

/// The pattern language of the `like` operator: literal characters plus
/// the `*` wildcard. In the textual form `\*` is a literal star and `\\`
/// a literal backslash; any other escape is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    elems: Vec<PatternElem>,
}

impl Pattern {
    pub fn new(elems: Vec<PatternElem>) -> Self {
        Self { elems }
    }

    /// Parses the textual pattern form.
    pub fn parse(literal: &str) -> Result<Self, PatternError> {
        let mut elems = Vec::new();
        let mut chars = literal.chars();
        while let Some(c) = chars.next() {
            match c {
                '*' => elems.push(PatternElem::Wildcard),
                '\\' => match chars.next() {
                    Some('*') => elems.push(PatternElem::Char('*')),
                    Some('\\') => elems.push(PatternElem::Char('\\')),
                    other => {
                        return Err(PatternError {
                            literal: literal.to_string(),
                            reason: match other {
                                Some(c) => format!("unknown escape `\\{c}`"),
                                None => "dangling escape".to_string(),
                            },
                        });
                    }
                },
                c => elems.push(PatternElem::Char(c)),
            }
        }
        Ok(Self { elems })
    }

    pub fn elems(&self) -> &[PatternElem] {
        &self.elems
    }

    /// Greedy wildcard match with backtracking, over characters.
    pub fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = text.chars().collect();
        let pat = &self.elems;

        let (mut t, mut p) = (0usize, 0usize);
        let mut star: Option<(usize, usize)> = None; // (pattern pos after *, text pos it consumed to)

        while t < text.len() {
            match pat.get(p) {
                Some(PatternElem::Char(c)) if *c == text[t] => {
                    t += 1;
                    p += 1;
                }
                Some(PatternElem::Wildcard) => {
                    star = Some((p + 1, t));
                    p += 1;
                }
                _ => match star {
                    // Let the last wildcard swallow one more character.
                    Some((after, consumed)) => {
                        p = after;
                        t = consumed + 1;
                        star = Some((after, consumed + 1));
                    }
                    None => return false,
                },
            }
        }
        while let Some(PatternElem::Wildcard) = pat.get(p) {
            p += 1;
        }
        p == pat.len()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for elem in &self.elems {
            match elem {
                PatternElem::Wildcard => write!(f, "*")?,
                PatternElem::Char('*') => write!(f, "\\*")?,
                PatternElem::Char('\\') => write!(f, "\\\\")?,
                PatternElem::Char(c) => write!(f, "{}", c)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, text: &str) -> bool {
        Pattern::parse(pattern).unwrap().matches(text)
    }

    #[test]
    fn literal_patterns_match_exactly() {
        assert!(matches("abc", "abc"));
        assert!(!matches("abc", "abd"));
        assert!(!matches("abc", "abcd"));
        assert!(matches("", ""));
        assert!(!matches("", "x"));
    }

    #[test]
    fn wildcard_matches_zero_or_more() {
        assert!(matches("*", ""));
        assert!(matches("*", "anything"));
        assert!(matches("a*c", "ac"));
        assert!(matches("a*c", "abbbc"));
        assert!(!matches("a*c", "abbbd"));
        assert!(matches("*.txt", "notes.txt"));
        assert!(!matches("*.txt", "notes.txt.bak"));
    }

    #[test]
    fn multiple_wildcards_backtrack() {
        assert!(matches("a*b*c", "aXbYc"));
        assert!(matches("a*b*c", "abbc"));
        assert!(matches("*a*", "bab"));
        assert!(!matches("a*b*c", "acb"));
    }

    #[test]
    fn escapes_produce_literal_characters() {
        assert!(matches("\\*", "*"));
        assert!(!matches("\\*", "x"));
        assert!(matches("\\\\", "\\"));
        assert!(matches("a\\*b", "a*b"));
        assert!(!matches("a\\*b", "aXb"));
    }

    #[test]
    fn bad_escapes_are_rejected() {
        assert!(Pattern::parse("\\n").is_err());
        assert!(Pattern::parse("abc\\").is_err());
    }

    #[test]
    fn display_reproduces_the_literal_form() {
        for raw in ["a*c", "\\*lit\\*", "no\\\\escape", "*"] {
            assert_eq!(Pattern::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn matching_is_over_characters_not_bytes() {
        assert!(matches("ca*é", "cañé"));
        assert!(!matches("c?e", "cae")); // `?` is an ordinary character
    }
}
