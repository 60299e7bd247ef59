//! Lexical helpers for the query pipeline
//!
//! Tokenization, stopword removal, abbreviation expansion, category
//! detection and the cheap local pre-filter. Everything here is pure and
//! allocation-light; the scorer builds on these.

use crate::config::{CategoryRule, PrefilterConfig};
use std::collections::HashSet;

/// Indonesian question stopwords; carry no retrieval signal
const STOPWORDS: &[&str] = &[
    "apa", "bagaimana", "cara", "untuk", "dan", "atau", "yang", "dengan",
    "ke", "dari", "buat", "membuat", "mengurus", "mendaftar", "mencetak",
    "dimana", "kapan", "berapa", "adalah", "itu", "ini", "saya", "kamu",
];

/// Common public-service abbreviations and their long forms
const SYNONYMS: &[(&str, &[&str])] = &[
    ("ktp", &["kartu", "tanda", "penduduk"]),
    ("kk", &["kartu", "keluarga"]),
    ("kadis", &["kepala", "dinas"]),
    ("kominfo", &["dinas", "komunikasi", "informatika", "diskominfo"]),
    ("dukcapil", &["dinas", "kependudukan", "catatan", "sipil", "disdukcapil"]),
    ("dishub", &["dinas", "perhubungan"]),
    ("dinkes", &["dinas", "kesehatan"]),
    ("disnaker", &["dinas", "ketenagakerjaan"]),
    ("sktm", &["surat", "keterangan", "tidak", "mampu"]),
    ("siup", &["surat", "izin", "usaha", "perdagangan"]),
    ("umkm", &["usaha", "mikro", "kecil", "menengah"]),
    ("pungli", &["pungutan", "liar"]),
    ("bansos", &["bantuan", "sosial"]),
    ("damkar", &["pemadam", "kebakaran"]),
    ("nib", &["nomor", "induk", "berusaha"]),
    ("nisn", &["nomor", "induk", "siswa", "nasional"]),
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn synonyms_of(word: &str) -> Option<&'static [&'static str]> {
    SYNONYMS
        .iter()
        .find(|(abbrev, _)| *abbrev == word)
        .map(|(_, expansions)| *expansions)
}

/// Replace punctuation with spaces and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let replaced: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove configured redundant phrases, case-insensitively.
pub fn strip_phrases(text: &str, phrases: &[String]) -> String {
    let mut result = text.to_string();
    for phrase in phrases {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            continue;
        }
        while let Some((start, end)) = find_ignore_case(&result, phrase) {
            result.replace_range(start..end, " ");
        }
    }
    normalize_text(&result)
}

/// Byte range of the first case-insensitive occurrence of `needle` in
/// `haystack`. Case folding is done per char, so the returned range is
/// always on `haystack` char boundaries; lowercasing the whole string
/// does not guarantee that ('İ' folds to two chars and shifts every
/// following byte offset).
fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle_lower: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle_lower.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        if let Some(end) = match_at(haystack, start, &needle_lower) {
            return Some((start, end));
        }
    }
    None
}

fn match_at(haystack: &str, start: usize, needle_lower: &[char]) -> Option<usize> {
    let mut matched = 0;
    for (offset, c) in haystack[start..].char_indices() {
        for folded in c.to_lowercase() {
            if matched < needle_lower.len() && folded == needle_lower[matched] {
                matched += 1;
            } else {
                return None;
            }
        }
        if matched == needle_lower.len() {
            return Some(start + offset + c.len_utf8());
        }
    }
    None
}

/// Case-folded content terms: stopwords dropped, short tokens dropped.
pub fn content_terms(text: &str) -> Vec<String> {
    normalize_text(text)
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|w| w.len() > 2 && !is_stopword(w))
        .collect()
}

/// Content terms plus the long forms of any known abbreviations, as a set.
pub fn expanded_term_set(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in normalize_text(text).split_whitespace() {
        let word = word.to_lowercase();
        if let Some(expansions) = synonyms_of(&word) {
            set.extend(expansions.iter().map(|s| s.to_string()));
        }
        if word.len() > 2 && !is_stopword(&word) {
            set.insert(word);
        }
    }
    set
}

/// Does `term` (or any of its known long-form words) occur in `candidate`?
pub fn term_matches(term: &str, candidate: &HashSet<String>) -> bool {
    if candidate.contains(term) {
        return true;
    }
    synonyms_of(term)
        .map(|expansions| expansions.iter().any(|s| candidate.contains(*s)))
        .unwrap_or(false)
}

/// First category rule whose keywords occur in the question, if any.
pub fn detect_category<'a>(question: &str, rules: &'a [CategoryRule]) -> Option<&'a CategoryRule> {
    let lower = question.to_lowercase();
    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| lower.contains(&kw.to_lowercase())))
}

/// Local rejection before any oracle call. Returns the rejection reason,
/// or `None` when the query may proceed.
pub fn hard_filter(question: &str, config: &PrefilterConfig) -> Option<String> {
    let normalized = normalize_text(&question.to_lowercase());
    let padded = format!(" {normalized} ");

    for term in &config.blocked_terms {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && padded.contains(&format!(" {term} ")) {
            return Some(format!(
                "Pertanyaan menyinggung topik di luar layanan ({term})"
            ));
        }
    }

    if normalized.split_whitespace().count() < config.min_words {
        return Some("Pertanyaan terlalu pendek atau tidak jelas".to_string());
    }

    None
}
