//! Structured LDAP search filters
//!
//! Rendered to RFC 4515 text for a real directory, evaluated directly by the
//! in-memory one. Equality values are literal; only [`Filter::like`]
//! patterns treat `*` as a wildcard.

use super::ad_objects::DirectoryEntry;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Like(String, String),
    Present(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Literal match; a `*` in `value` is an ordinary character.
    pub fn eq(attribute: &str, value: impl Into<String>) -> Self {
        Filter::Eq(attribute.to_string(), value.into())
    }

    /// Substring match where `*` in `pattern` matches any run of characters.
    pub fn like(attribute: &str, pattern: impl Into<String>) -> Self {
        Filter::Like(attribute.to_string(), pattern.into())
    }

    pub fn present(attribute: &str) -> Self {
        Filter::Present(attribute.to_string())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Evaluate against an entry; attribute names and values compare
    /// case-insensitively.
    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::Eq(attr, value) => entry
                .get_all(attr)
                .is_some_and(|values| values.iter().any(|v| v.to_lowercase() == value.to_lowercase())),
            Filter::Like(attr, pattern) => entry
                .get_all(attr)
                .is_some_and(|values| values.iter().any(|v| wildcard_match(pattern, v))),
            Filter::Present(attr) => entry.get_all(attr).is_some_and(|v| !v.is_empty()),
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(attr, value) => write!(f, "({}={})", attr, escape_value(value)),
            Filter::Like(attr, pattern) => {
                write!(f, "({}=", attr)?;
                for (i, part) in pattern.split('*').enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    f.write_str(&escape_value(part))?;
                }
                f.write_str(")")
            }
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
        }
    }
}

/// RFC 4515 value escaping.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\5c"),
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// Case-insensitive glob where `*` matches any run of characters.
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let value = value.to_lowercase();
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if value.len() < first.len() + last.len() || !value.starts_with(first) || !value.ends_with(last) {
        return false;
    }
    let mut rest = &value[first.len()..value.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(pos) => rest = &rest[pos + middle.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested_filter() {
        let filter = Filter::and([
            Filter::eq("objectClass", "user"),
            Filter::not(Filter::eq("objectClass", "computer")),
            Filter::eq("sAMAccountName", "a(b)"),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=user)(!(objectClass=computer))(sAMAccountName=a\\28b\\29))"
        );
    }

    #[test]
    fn test_render_keeps_wildcards_only_in_like() {
        assert_eq!(Filter::like("displayName", "*").to_string(), "(displayName=*)");
        assert_eq!(Filter::like("name", "IT*\\x").to_string(), "(name=IT*\\5cx)");
        assert_eq!(Filter::eq("sAMAccountName", "a*").to_string(), "(sAMAccountName=a\\2a)");
        assert_eq!(Filter::eq("cn", "{*}").to_string(), "(cn={\\2a})");
        assert_eq!(Filter::present("gPLink").to_string(), "(gPLink=*)");
    }

    #[test]
    fn test_eq_matches_literally() {
        let mut entry = DirectoryEntry::new("CN=alice,CN=Users,DC=x,DC=y");
        entry.set("sAMAccountName", vec!["alice".into()]);
        assert!(Filter::eq("sAMAccountName", "ALICE").matches(&entry));
        assert!(!Filter::eq("sAMAccountName", "*").matches(&entry));
        assert!(!Filter::eq("sAMAccountName", "a*").matches(&entry));
        assert!(Filter::like("sAMAccountName", "a*").matches(&entry));

        entry.set("sAMAccountName", vec!["a*".into()]);
        assert!(Filter::eq("sAMAccountName", "a*").matches(&entry));
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("Default*", "default domain policy"));
        assert!(wildcard_match("*policy", "Default Domain Policy"));
        assert!(wildcard_match("d*m*y", "Default Domain Policy"));
        assert!(!wildcard_match("d*x*y", "Default Domain Policy"));
        assert!(!wildcard_match("ab*ba", "aba"));
        assert!(wildcard_match("Test", "TEST"));
        assert!(!wildcard_match("Test", "Tests"));
    }

    #[test]
    fn test_matches_multi_valued_attribute() {
        let mut entry = DirectoryEntry::new("CN=PC1,CN=Computers,DC=x,DC=y");
        entry.set("objectClass", vec!["top".into(), "user".into(), "computer".into()]);
        entry.set("sAMAccountName", vec!["PC1$".into()]);

        let users = Filter::and([
            Filter::eq("objectClass", "user"),
            Filter::not(Filter::eq("objectClass", "computer")),
        ]);
        assert!(!users.matches(&entry));
        assert!(Filter::eq("samaccountname", "pc1$").matches(&entry));
        assert!(Filter::or([Filter::present("gPLink"), Filter::eq("objectClass", "computer")]).matches(&entry));
    }
}
