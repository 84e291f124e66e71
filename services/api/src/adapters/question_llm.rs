//! services/api/src/adapters/question_llm.rs
//!
//! This module contains the adapter for the question-writing LLM.
//! It implements the `QuestionGenerator` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You write multiple-choice quiz questions.

Rules:
- Every question has exactly ONE correct answer and exactly THREE wrong answers.
- The four options must be clearly different from each other.
- Keep questions self-contained; never refer to "the previous question".
- Match the requested difficulty tier:
  - easy: recall of common facts and basic definitions
  - medium: applying a concept or combining two facts
  - hard: multi-step reasoning, precise details, edge cases
- Do not repeat or rephrase any of the questions listed as already asked.

Respond with ONLY a JSON array, no prose, in this exact shape:
[
  {
    "question": "...",
    "correct_answer": "...",
    "wrong_answers": ["...", "...", "..."],
    "explanation": "one or two sentences on why the answer is correct"
  }
]"#;

const USER_INPUT_TEMPLATE: &str = r#"TOPIC: {topic}
SUBTOPIC: {subtopic}
DIFFICULTY TIER: {tier}
PLAYER LEVEL: {level}
NUMBER OF QUESTIONS: {count}

ALREADY ASKED:
{recent}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use quiz_supply_core::{
    domain::RawQuestion,
    ports::{GenerationRequest, PortError, PortResult, QuestionGenerator},
};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `QuestionGenerator` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiQuestionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuestionAdapter {
    /// Creates a new `OpenAiQuestionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    fn render_prompt(request: &GenerationRequest) -> String {
        let recent = if request.recent_questions.is_empty() {
            "(none)".to_string()
        } else {
            request
                .recent_questions
                .iter()
                .map(|q| format!("- {}", q))
                .collect::<Vec<_>>()
                .join("\n")
        };
        USER_INPUT_TEMPLATE
            .replace("{topic}", &request.topic)
            .replace("{subtopic}", request.subtopic.as_deref().unwrap_or("(any)"))
            .replace("{tier}", request.tier.as_str())
            .replace("{level}", request.knowledge_level.as_str())
            .replace("{count}", &request.count.to_string())
            .replace("{recent}", &recent)
    }
}

/// One question as the model writes it. Field aliases cover the usual variations.
#[derive(Debug, Deserialize)]
struct GeneratedItem {
    #[serde(alias = "text", alias = "question_text")]
    question: String,
    #[serde(alias = "answer", alias = "correct")]
    correct_answer: String,
    #[serde(alias = "incorrect_answers", alias = "distractors")]
    wrong_answers: Vec<String>,
    #[serde(default)]
    explanation: String,
}

impl From<GeneratedItem> for RawQuestion {
    fn from(item: GeneratedItem) -> Self {
        RawQuestion {
            text: item.question,
            correct_answer: item.correct_answer,
            wrong_answers: item.wrong_answers,
            explanation: item.explanation,
        }
    }
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").unwrap())
}

/// Extracts the questions from a model reply.
///
/// Accepts a bare array, an object with a `questions` array, or either of those
/// wrapped in a markdown code fence. Items that do not match the expected shape
/// are skipped rather than failing the whole batch.
pub fn parse_questions(reply: &str) -> PortResult<Vec<RawQuestion>> {
    let body = code_fence()
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            // Tolerate prose around the array.
            let start = body.find('[');
            let end = body.rfind(']');
            match (start, end) {
                (Some(s), Some(e)) if s < e => serde_json::from_str(&body[s..=e])
                    .map_err(|e| PortError::Unexpected(format!("Unparseable generator reply: {}", e)))?,
                _ => {
                    return Err(PortError::Unexpected(
                        "Generator reply contained no JSON array.".to_string(),
                    ))
                }
            }
        }
    };

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(PortError::Unexpected(
                    "Generator reply object has no `questions` array.".to_string(),
                ))
            }
        },
        _ => {
            return Err(PortError::Unexpected(
                "Generator reply is not a list of questions.".to_string(),
            ))
        }
    };

    let total = items.len();
    let questions: Vec<RawQuestion> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<GeneratedItem>(item).ok())
        .map(RawQuestion::from)
        .collect();
    if questions.len() < total {
        tracing::debug!(total, parsed = questions.len(), "Skipped malformed generated items");
    }
    Ok(questions)
}

//=========================================================================================
// `QuestionGenerator` Trait Implementation
//=========================================================================================

#[async_trait]
impl QuestionGenerator for OpenAiQuestionAdapter {
    async fn generate(&self, request: &GenerationRequest) -> PortResult<Vec<RawQuestion>> {
        if request.count == 0 {
            return Ok(Vec::new());
        }

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::render_prompt(request))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(PortError::Unexpected(
                "Question generation LLM returned no choices in its response.".to_string(),
            ));
        };
        let Some(content) = choice.message.content else {
            return Err(PortError::Unexpected(
                "Question generation LLM response contained no text content.".to_string(),
            ));
        };
        parse_questions(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_supply_core::domain::{KnowledgeLevel, Tier};

    #[test]
    fn parses_a_fenced_array_and_skips_malformed_items() {
        let reply = r#"Here you go:
```json
[
  {"question": "What is 2 + 2?", "correct_answer": "4", "wrong_answers": ["3", "5", "22"], "explanation": "Basic sum."},
  {"question": "Missing answers"},
  {"text": "Capital of France?", "answer": "Paris", "incorrect_answers": ["Lyon", "Nice", "Lille"]}
]
```"#;
        let questions = parse_questions(reply).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].correct_answer, "4");
        assert_eq!(questions[1].text, "Capital of France?");
        assert!(questions[1].explanation.is_empty());
    }

    #[test]
    fn parses_an_object_wrapper_and_surrounding_prose() {
        let wrapped = r#"{"questions": [{"question": "Q", "correct_answer": "A", "wrong_answers": ["B", "C", "D"]}]}"#;
        assert_eq!(parse_questions(wrapped).unwrap().len(), 1);

        let prose = r#"Sure! [{"question": "Q", "correct_answer": "A", "wrong_answers": ["B", "C", "D"]}] Enjoy."#;
        assert_eq!(parse_questions(prose).unwrap().len(), 1);
    }

    #[test]
    fn rejects_replies_without_questions() {
        assert!(parse_questions("I cannot help with that.").is_err());
        assert!(parse_questions(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn prompt_lists_recent_questions() {
        let request = GenerationRequest {
            topic: "Geography".to_string(),
            subtopic: None,
            tier: Tier::Hard,
            knowledge_level: KnowledgeLevel::Advanced,
            count: 4,
            recent_questions: vec!["Capital of Peru?".to_string()],
        };
        let prompt = OpenAiQuestionAdapter::render_prompt(&request);
        assert!(prompt.contains("TOPIC: Geography"));
        assert!(prompt.contains("SUBTOPIC: (any)"));
        assert!(prompt.contains("DIFFICULTY TIER: hard"));
        assert!(prompt.contains("NUMBER OF QUESTIONS: 4"));
        assert!(prompt.contains("- Capital of Peru?"));
    }
}
