//! Ordered, case-insensitive, multi-valued header list.
//!
//! The teacher's live request/response types (`src/http/request.rs`,
//! `src/http/response.rs`) store headers as `HashMap<String, String>`,
//! which can hold only one value per name and loses insertion order. The
//! dead draft parser (`src/http_processor.rs`, since removed) modeled
//! headers as `Vec<(String, String)>` instead — closer to what ordered,
//! multi-valued lookup needs — so `HeaderMap` is grounded on that shape,
//! generalized into a small newtype with case-insensitive accessors.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn append(&mut self, name: &str, value: &str) {
        self.entries.push((name.to_string(), value.to_string()));
    }

    /// Removes every existing value for `name` and inserts a single one.
    pub fn set(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.append(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// First value for `name`, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses one header line (already stripped of its line terminator):
    /// split at the first `:`, trim HTAB/SP off both sides. Lines with no
    /// `:` are discarded by the caller, not here (§4.2).
    pub fn parse_line(line: &str) -> Option<(String, String)> {
        let (name, value) = line.split_once(':')?;
        Some((
            name.trim_matches([' ', '\t']).to_string(),
            value.trim_matches([' ', '\t']).to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.append("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
    }

    #[test]
    fn get_all_preserves_insertion_order_for_multivalued_headers() {
        let mut h = HeaderMap::new();
        h.append("Set-Cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn set_replaces_all_prior_values() {
        let mut h = HeaderMap::new();
        h.append("X-Foo", "1");
        h.append("X-Foo", "2");
        h.set("x-foo", "3");
        assert_eq!(h.get_all("X-Foo"), vec!["3"]);
    }

    #[test]
    fn parse_line_trims_both_sides() {
        let (name, value) = HeaderMap::parse_line("  Host : example.com  ").unwrap();
        assert_eq!(name, "Host");
        assert_eq!(value, "example.com");
    }

    #[test]
    fn parse_line_without_colon_is_none() {
        assert!(HeaderMap::parse_line("not-a-header").is_none());
    }
}
