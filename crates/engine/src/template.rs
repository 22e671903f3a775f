//! Safe placeholder substitution for subject and body patterns.
//!
//! Patterns use `$identifier` (or `${identifier}`) placeholders, with `$$`
//! as an escape for a literal dollar sign. Substitution is *safe*: a
//! placeholder with no matching variable, a malformed placeholder, or a
//! trailing `$` passes through verbatim. Rendering never fails and never
//! drops text, and substituted values are not re-scanned for placeholders.

use std::collections::HashMap;

use crate::entity::recipient;

/// Render `pattern`, substituting every placeholder present in `vars` and
/// leaving every other placeholder untouched.
pub fn render(pattern: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        match tail.chars().next() {
            // "$$" escapes a literal dollar sign.
            Some('$') => {
                out.push('$');
                rest = &tail[1..];
            }
            // "${identifier}"
            Some('{') => match tail.find('}') {
                Some(end) if is_identifier(&tail[1..end]) => {
                    match vars.get(&tail[1..end]) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push('$');
                            out.push_str(&tail[..=end]);
                        }
                    }
                    rest = &tail[end + 1..];
                }
                // Unterminated or invalid braced placeholder: keep verbatim.
                _ => {
                    out.push('$');
                    rest = tail;
                }
            },
            // "$identifier"
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let len = tail
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                    .unwrap_or(tail.len());
                match vars.get(&tail[..len]) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('$');
                        out.push_str(&tail[..len]);
                    }
                }
                rest = &tail[len..];
            }
            // Lone or trailing '$'.
            _ => {
                out.push('$');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build the variable map for a recipient: the reserved identifiers `name`,
/// `first_name`, `last_name`, `email` and `company`, overridden or extended
/// by the recipient's own extra variables.
pub fn recipient_vars(recipient: &recipient::Model) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("name".to_string(), recipient.display_name().to_string());
    vars.insert("first_name".to_string(), recipient.first_name.clone());
    vars.insert("last_name".to_string(), recipient.last_name.clone());
    vars.insert("email".to_string(), recipient.email.clone());
    vars.insert("company".to_string(), recipient.company.clone());

    if let Some(extra) = recipient.extra_variables.as_object() {
        for (key, value) in extra {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            vars.insert(key.clone(), rendered);
        }
    }

    vars
}
