//! Term extraction for the auto-linker.

/// Common English words dropped during term extraction.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was", "one",
    "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now", "old", "see",
    "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she", "too", "use", "with",
    "from", "this", "that", "have", "will", "your", "what", "when", "where", "which", "while",
    "about", "after", "again", "also", "been", "before", "being", "between", "both", "does",
    "each", "into", "just", "like", "make", "more", "most", "only", "other", "over", "same",
    "should", "some", "such", "than", "them", "then", "there", "these", "they", "those",
    "through", "under", "until", "very", "were", "would",
];

/// Domain terms that trigger the technical-term scoring bonus.
const TECHNICAL_TERMS: &[&str] = &[
    "api", "sql", "http", "https", "json", "yaml", "xml", "grpc", "rest", "graphql", "database",
    "schema", "index", "query", "select", "insert", "update", "delete", "join", "server",
    "client", "async", "await", "thread", "mutex", "auth", "oauth", "token", "jwt", "cache",
    "queue", "retry", "backoff", "timeout", "webhook", "endpoint", "docker", "kubernetes",
    "git", "tls", "ssl", "tcp", "udp", "dns", "regex", "cli", "sdk", "repo", "branch", "merge",
    "deploy", "migration", "backup", "encryption",
];

/// Extract scoring terms from task text: lowercase, punctuation
/// stripped, whitespace split, stopwords dropped, tokens of length >= 3
/// kept, deduplicated in first-seen order.
#[must_use]
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
    {
        if STOPWORDS.contains(&token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            terms.push(token.to_string());
        }
    }
    terms
}

/// Whether a term is in the technical vocabulary.
#[must_use]
pub fn is_technical(term: &str) -> bool {
    TECHNICAL_TERMS.contains(&term)
}
