//! Relevance oracle client
//!
//! One opaque text-reasoning collaborator covering three calls: query
//! pre-filtering/reformulation, binary relevance judgment of a retrieved
//! candidate, and summarization of document snippets. Spoken to over an
//! OpenAI-compatible chat completions endpoint.
//!
//! Transport failures surface as `ServiceError::Collaborator` and are
//! degraded at the pipeline boundary. A reply that arrives but cannot be
//! parsed fails open: the model's formatting mistake must not block the
//! user.

use crate::errors::{Result, ServiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Pre-filter outcome: is the query answerable and in-domain, and what is
/// the cleaned-up retrieval form of it.
#[derive(Debug, Clone)]
pub struct PreFilterVerdict {
    pub valid: bool,
    pub reason: String,
    pub clean_question: String,
}

/// Relevance judgment of one candidate against the user's query.
#[derive(Debug, Clone)]
pub struct RelevanceVerdict {
    pub relevant: bool,
    pub reason: String,
    pub reformulated_question: String,
}

#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    /// Validate the query is in-domain and reformulate it for retrieval
    async fn reformulate(&self, question: &str) -> Result<PreFilterVerdict>;
    /// Does `candidate_text` actually answer `question`?
    async fn judge(&self, question: &str, candidate_text: &str) -> Result<RelevanceVerdict>;
    /// Condense document snippets into a short answer
    async fn summarize(&self, texts: &[String], max_sentences: usize) -> Result<String>;
}

const PRE_FILTER_PROMPT: &str = r#"Anda adalah AI filter untuk pertanyaan terkait layanan publik dan pemerintahan daerah.

Balas HANYA dalam format JSON berikut:
{"valid": true/false, "reason": "<penjelasan>", "clean_question": "<pertanyaan yang sudah dibersihkan>"}

Anggap pertanyaan VALID jika membahas layanan publik, perizinan, dokumen kependudukan, fasilitas umum, atau program pemerintah yang dapat diakses masyarakat.
Tandai TIDAK VALID jika membahas daerah lain, gosip, opini pribadi, atau pertanyaan yang terlalu pendek dan ambigu.
Bersihkan ejaan dan tanda baca pada "clean_question" tanpa mengubah maksud pertanyaan.
JANGAN BERIKAN PENJELASAN DI LUAR JSON."#;

const RELEVANCE_PROMPT: &str = r#"Tugas Anda mengevaluasi apakah hasil pencarian RAG sesuai dengan maksud pertanyaan pengguna.
Balas hanya JSON:
{"relevant": true/false, "reason": "...", "reformulated_question": "..."}

Relevan jika topik masih berkaitan dengan layanan publik, fasilitas, dokumen, kebijakan, atau prosedur administratif yang informatif bagi pengguna.
Tidak relevan jika membahas konteks berbeda, hal pribadi, gosip, atau opini.
Jika tidak relevan, ubah pertanyaan jadi versi singkat berbentuk tanya maks. 12 kata."#;

const SUMMARIZER_PROMPT: &str = "Anda adalah asisten yang ahli dalam meringkas dokumen panjang \
menjadi versi singkat yang mudah dipahami.";

/// Maximum words kept of a reformulated question
const REFORMULATION_WORD_CAP: usize = 12;

/// HTTP client for an OpenAI-compatible chat completions endpoint
pub struct ChatOracle {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatOracle {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_sec: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| ServiceError::collaborator("oracle", e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    async fn chat(
        &self,
        system_prompt: &str,
        user_message: &str,
        temperature: f32,
        top_p: f32,
    ) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt.trim() },
                { "role": "user", "content": user_message.trim() }
            ],
            "temperature": temperature,
            "top_p": top_p
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::collaborator("oracle", e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::collaborator(
                "oracle",
                format!("HTTP {}", response.status()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::collaborator("oracle", e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ServiceError::collaborator("oracle", "empty completion"));
        }

        Ok(content)
    }
}

#[async_trait]
impl RelevanceOracle for ChatOracle {
    async fn reformulate(&self, question: &str) -> Result<PreFilterVerdict> {
        let content = self.chat(PRE_FILTER_PROMPT, question, 0.0, 0.6).await?;

        let verdict = match extract_json(&content) {
            Some(v) => PreFilterVerdict {
                valid: v.get("valid").and_then(Value::as_bool).unwrap_or(true),
                reason: str_field(&v, "reason"),
                clean_question: {
                    let cleaned = str_field(&v, "clean_question");
                    if cleaned.is_empty() {
                        question.to_string()
                    } else {
                        cleaned
                    }
                },
            },
            None => {
                tracing::warn!(content = %truncate(&content, 100), "pre-filter reply had no JSON, failing open");
                PreFilterVerdict {
                    valid: true,
                    reason: "oracle returned no JSON".to_string(),
                    clean_question: question.to_string(),
                }
            }
        };

        Ok(verdict)
    }

    async fn judge(&self, question: &str, candidate_text: &str) -> Result<RelevanceVerdict> {
        let user_prompt = format!("User: {question}\nRAG Result: {candidate_text}");
        let content = self.chat(RELEVANCE_PROMPT, &user_prompt, 0.1, 0.5).await?;

        let verdict = match extract_json(&content) {
            Some(v) => RelevanceVerdict {
                relevant: v.get("relevant").and_then(Value::as_bool).unwrap_or(true),
                reason: str_field(&v, "reason"),
                reformulated_question: cap_words(
                    &str_field(&v, "reformulated_question"),
                    REFORMULATION_WORD_CAP,
                ),
            },
            None => {
                tracing::warn!(content = %truncate(&content, 100), "relevance reply had no JSON, failing open");
                RelevanceVerdict {
                    relevant: true,
                    reason: "oracle returned no JSON".to_string(),
                    reformulated_question: String::new(),
                }
            }
        };

        Ok(verdict)
    }

    async fn summarize(&self, texts: &[String], max_sentences: usize) -> Result<String> {
        let combined: String = texts.join("\n\n");
        // Bound the prompt so a large document set stays within the model
        let snippet = truncate(&combined, 4000);
        let user_prompt = format!(
            "Ringkas teks berikut menjadi maksimal {max_sentences} kalimat yang padat, jelas, \
             dan tetap mempertahankan konteks penting.\n\nTeks:\n{snippet}"
        );

        let content = self.chat(SUMMARIZER_PROMPT, &user_prompt, 0.4, 0.7).await?;
        Ok(content.trim().to_string())
    }
}

/// Pull the first `{...}` block out of a model reply. Models wrap JSON in
/// prose often enough that plain `serde_json::from_str` is not an option.
fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    format!("{}...", words[..max_words].join(" "))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_wrapped_reply() {
        let reply = "Berikut hasilnya:\n{\"valid\": false, \"reason\": \"terlalu pendek\"}\nSekian.";
        let v = extract_json(reply).unwrap();
        assert_eq!(v["valid"], false);
        assert_eq!(v["reason"], "terlalu pendek");
    }

    #[test]
    fn test_extract_json_none_without_braces() {
        assert!(extract_json("tidak ada json di sini").is_none());
    }

    #[test]
    fn test_extract_json_invalid_body() {
        assert!(extract_json("{not valid json}").is_none());
    }

    #[test]
    fn test_cap_words_truncates_long_reformulation() {
        let long = "a b c d e f g h i j k l m n o";
        let capped = cap_words(long, 12);
        assert_eq!(capped, "a b c d e f g h i j k l...");
    }

    #[test]
    fn test_cap_words_keeps_short_text() {
        assert_eq!(cap_words("syarat membuat ktp", 12), "syarat membuat ktp");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("pengurusan", 4), "peng");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
