//! Prompt templates with `{key}` placeholders.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub id: String,
    pub raw_text: String,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw_text: raw_text.into(),
        }
    }

    /// Names of the `{identifier}` tokens present in the text.
    pub fn placeholders(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        scan(&self.raw_text, |token| {
            if is_placeholder_name(token) {
                names.insert(token.to_string());
            }
            None
        });
        names
    }

    pub fn render(&self, bindings: &HashMap<String, String>) -> String {
        render(&self.raw_text, bindings)
    }
}

/// Replace every `{key}` whose key is bound; anything else stays byte-for-byte.
///
/// Single pass: substituted values are never re-scanned for tokens.
pub fn render(text: &str, bindings: &HashMap<String, String>) -> String {
    if bindings.is_empty() {
        return text.to_string();
    }
    scan(text, |token| bindings.get(token).map(String::as_str))
}

fn is_placeholder_name(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Walk `text`, offering the inside of each innermost `{...}` pair to
/// `replace`. Returns the text with accepted replacements applied.
fn scan<'a, F>(text: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        let close = after_open.find('}');
        let nested_open = after_open.find('{');
        match close {
            Some(close) if nested_open.map_or(true, |n| n > close) => {
                let token = &after_open[..close];
                match replace(token) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after_open[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_every_occurrence() {
        let out = render("{who} met {who} at {place}", &bindings(&[("who", "Ann"), ("place", "noon")]));
        assert_eq!(out, "Ann met Ann at noon");
    }

    #[test]
    fn unresolved_tokens_left_verbatim() {
        let text = "Plan for {topic} in {language}";
        let out = render(text, &bindings(&[("topic", "sheds")]));
        assert_eq!(out, "Plan for sheds in {language}");
    }

    #[test]
    fn values_are_not_rescanned() {
        let out = render("{a} {b}", &bindings(&[("a", "{b}"), ("b", "x")]));
        assert_eq!(out, "{b} x");
    }

    #[test]
    fn json_examples_in_prompts_survive() {
        let text = "Reply as {\"title\": string, \"steps\": []} about {topic}.";
        let out = render(text, &bindings(&[("topic", "sheds")]));
        assert_eq!(out, "Reply as {\"title\": string, \"steps\": []} about sheds.");
    }

    #[test]
    fn unbalanced_braces_are_kept() {
        let text = "open { only and {{topic}} and }";
        let out = render(text, &bindings(&[("topic", "x")]));
        assert_eq!(out, "open { only and {x} and }");
    }

    #[test]
    fn empty_bindings_return_text_unchanged() {
        assert_eq!(render("{a}", &HashMap::new()), "{a}");
    }

    #[test]
    fn placeholders_lists_identifier_tokens() {
        let template = PromptTemplate::new(
            "researcher",
            "Research {topic} for {audience}; answer as {\"summary\": \"...\"} {topic}",
        );
        let names: Vec<String> = template.placeholders().into_iter().collect();
        assert_eq!(names, vec!["audience".to_string(), "topic".to_string()]);
    }
}
