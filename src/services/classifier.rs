// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation classification.
//!
//! Sends each conversation to a hosted LLM and parses the verdict. Any
//! failure anywhere (no key, transport error, unusable reply) falls back
//! to a deterministic keyword heuristic, so analysis always produces a
//! verdict per conversation.

use crate::models::Email;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Keywords the fallback heuristic scans for, matched as lowercase
/// substrings.
const NETWORKING_KEYWORDS: &[&str] = &[
    "job", "career", "opportunity", "position", "hiring", "interview",
    "network", "connect", "linkedin", "meeting", "coffee", "chat",
    "mentor", "advice", "industry", "conference", "event", "speak",
    "partnership", "collaborate", "business", "startup", "company",
];

const SYSTEM_PROMPT: &str = "You are an expert at identifying networking conversations in \
                             professional emails. Always respond with valid JSON.";

/// Classification verdict for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_networking: bool,
    pub networking_score: f64,
    pub conversation_summary: String,
    pub networking_type: String,
}

/// A conversation judged to be a networking exchange, with the contact
/// it belongs to.
#[derive(Debug, Clone)]
pub struct ConversationAnalysis {
    pub contact_email: String,
    pub verdict: Verdict,
}

/// LLM-backed conversation classifier.
#[derive(Clone)]
pub struct ClassifierService {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ClassifierService {
    /// Create a classifier. Without an API key every conversation goes
    /// through the keyword heuristic.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key,
        }
    }

    /// Create a classifier against a different API endpoint (tests).
    pub fn with_base_url(api_key: Option<String>, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Classify every conversation and keep the networking ones.
    ///
    /// Per-conversation failures never abort the batch; the heuristic
    /// covers them.
    pub async fn analyze_conversations(
        &self,
        conversations: &[Vec<Email>],
    ) -> Vec<ConversationAnalysis> {
        let mut results = Vec::new();

        for conversation in conversations {
            let Some(first) = conversation.first() else {
                continue;
            };

            let verdict = self.classify_conversation(conversation).await;
            if !verdict.is_networking {
                continue;
            }

            // The contact is whichever side of the first message is not
            // the mailbox owner
            let contact_email = if first.sender_email != first.user_email {
                first.sender_email.clone()
            } else {
                first.recipient_email.clone()
            }
            .unwrap_or_default();

            results.push(ConversationAnalysis {
                contact_email,
                verdict,
            });
        }

        results
    }

    /// Classify one conversation, falling back to the heuristic on any
    /// failure.
    pub async fn classify_conversation(&self, conversation: &[Email]) -> Verdict {
        let Some(api_key) = self.api_key.as_deref() else {
            return keyword_heuristic(conversation);
        };

        match self.request_verdict(api_key, conversation).await {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(error = %err, "LLM classification failed, using keyword heuristic");
                keyword_heuristic(conversation)
            }
        }
    }

    async fn request_verdict(
        &self,
        api_key: &str,
        conversation: &[Email],
    ) -> anyhow::Result<Verdict> {
        let body = serde_json::json!({
            "model": "gpt-3.5-turbo",
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(conversation) }
            ],
            "temperature": 0.3,
            "max_tokens": 300
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("chat completion returned HTTP {}", response.status());
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("parsing chat completion response")?;

        let content = completion
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .context("chat completion had no choices")?;

        serde_json::from_str(content).context("verdict was not valid JSON")
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Render a conversation the way the LLM prompt expects it: one block
/// per message, labeled You/Them relative to the mailbox owner.
fn build_conversation_text(conversation: &[Email]) -> String {
    let owner = conversation.first().and_then(|e| e.user_email.clone());

    conversation
        .iter()
        .map(|email| {
            let direction = if email.sender_email == owner {
                "You"
            } else {
                "Them"
            };
            let subject = email.subject.as_deref().unwrap_or("");
            let excerpt = email
                .snippet
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(email.body.as_deref())
                .unwrap_or("");
            format!("{}: {}\n{}", direction, subject, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(conversation: &[Email]) -> String {
    format!(
        "Analyze this email conversation and determine if it's a networking conversation.\n\
         \n\
         A networking conversation includes:\n\
         - Professional connections\n\
         - Job opportunities\n\
         - Career advice\n\
         - Industry discussions\n\
         - Business partnerships\n\
         - Mentorship\n\
         - Professional introductions\n\
         - Conference/event discussions\n\
         \n\
         Conversation:\n\
         {}\n\
         \n\
         Please respond in JSON format:\n\
         {{\n\
         \x20   \"is_networking\": true,\n\
         \x20   \"networking_score\": 8,\n\
         \x20   \"conversation_summary\": \"Brief summary of the conversation...\",\n\
         \x20   \"networking_type\": \"job_opportunity\"\n\
         }}",
        build_conversation_text(conversation)
    )
}

/// Deterministic keyword fallback. The score is 5 plus the number of
/// distinct keywords present, capped at 10; non-matches score 0.
pub fn keyword_heuristic(conversation: &[Email]) -> Verdict {
    let text = conversation
        .iter()
        .map(|email| {
            let subject = email.subject.as_deref().unwrap_or("");
            let excerpt = email
                .snippet
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(email.body.as_deref())
                .unwrap_or("");
            format!("{} {}", subject, excerpt)
        })
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let matches = NETWORKING_KEYWORDS
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count();
    let is_networking = matches > 0;

    let first_subject = conversation
        .first()
        .and_then(|email| email.subject.as_deref())
        .unwrap_or("No Subject");

    Verdict {
        is_networking,
        networking_score: if is_networking {
            (5 + matches).min(10) as f64
        } else {
            0.0
        },
        conversation_summary: format!("Conversation about {}", first_subject),
        networking_type: if is_networking {
            "professional_connection".to_string()
        } else {
            "unknown".to_string()
        },
    }
}
