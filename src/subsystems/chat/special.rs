//! Canned replies that bypass retrieval entirely.

/// Fixed input → reply pairs. Matching is exact and case-sensitive.
const SPECIAL_REPLIES: &[(&str, &str)] = &[
    ("0", "This is an invalid query."),
    ("betscout", "Betscout is not a valid query. Did you mean Netscout?"),
    ("Give me account details", "Sorry we are not allowed to disclose private information."),
    ("hi", "Hello! How can I assist you today?"),
];

/// Lookup over the fixed special-reply table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialReplyTable;

impl SpecialReplyTable {
    pub fn lookup(&self, input: &str) -> Option<&'static str> {
        SPECIAL_REPLIES
            .iter()
            .find(|(key, _)| *key == input)
            .map(|(_, reply)| *reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_hits() {
        let table = SpecialReplyTable;
        assert_eq!(table.lookup("hi"), Some("Hello! How can I assist you today?"));
        assert_eq!(table.lookup("0"), Some("This is an invalid query."));
    }

    #[test]
    fn case_and_whitespace_matter() {
        let table = SpecialReplyTable;
        assert_eq!(table.lookup("Hi"), None);
        assert_eq!(table.lookup(" hi"), None);
        assert_eq!(table.lookup("give me account details"), None);
    }
}
