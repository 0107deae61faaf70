//! End-to-end question answering on top of retrieval.
//!
//! [`AnswerPipeline`] retrieves context for a question, builds the grounded
//! system prompt, generates an answer through the configured chat model,
//! and persists the exchange. The pipeline never raises past its boundary:
//! missing context and generation failures both produce a well-formed
//! response, localized to the language of the question.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::conversation::ConversationStore;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::DocumentChunk;
use crate::retrieval::Retriever;

const HISTORY_MAX_MESSAGES: usize = 5;
const PREVIEW_CHARS: usize = 200;

const SYSTEM_PROMPT_TEMPLATE: &str = "You are a documentation assistant. Answer the question \
using only the documentation below. Reply in the language of the question, concisely and \
accurately. If the documentation does not cover the question, say so.\n\n\
Documentation:\n{context}\n\nConversation history:\n{history}";

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub conversation_id: Option<String>,
    /// Client-supplied history; ignored when a persisted conversation is
    /// found.
    pub history: Vec<ChatMessage>,
    pub top_k: usize,
    pub include_sources: bool,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            conversation_id: None,
            history: Vec::new(),
            top_k: 3,
            include_sources: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReference {
    pub title: String,
    pub file_path: String,
    pub chunk_index: i64,
    pub similarity_score: f64,
    pub content_preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceReference>,
    pub confidence_score: f64,
    pub response_time_ms: u64,
    pub intent: String,
    pub conversation_id: Option<String>,
}

pub struct AnswerPipeline {
    retriever: Retriever,
    chat: Arc<dyn ChatModel>,
    conversations: Option<Arc<ConversationStore>>,
    docs_root: PathBuf,
}

impl AnswerPipeline {
    pub fn new(
        retriever: Retriever,
        chat: Arc<dyn ChatModel>,
        conversations: Option<Arc<ConversationStore>>,
        docs_root: PathBuf,
    ) -> Self {
        Self {
            retriever,
            chat,
            conversations,
            docs_root,
        }
    }

    /// Answer a question. Total: every failure mode maps to a response.
    pub async fn answer(&self, request: &AnswerRequest) -> AnswerResponse {
        let started = Instant::now();
        let intent = self.retriever.classify(&request.question);

        let relevant = self
            .retriever
            .retrieve(&request.question, request.top_k)
            .await;

        if relevant.is_empty() {
            return self.no_context_response(request, intent.as_str(), started);
        }

        let context = build_context(&relevant, &self.docs_root);
        let history = self.effective_history(request).await;
        let system_prompt = SYSTEM_PROMPT_TEMPLATE
            .replace("{context}", &context)
            .replace("{history}", &build_history(&history));

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(request.question.clone()),
        ];

        let answer = match self.chat.complete(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                return self.error_response(request, intent.as_str(), &e.to_string(), started);
            }
        };

        let sources = if request.include_sources {
            source_references(&relevant, &self.docs_root)
        } else {
            Vec::new()
        };
        let confidence_score = confidence(&relevant, &answer);
        let conversation_id = self.persist_exchange(request, &answer).await;

        let response_time_ms = started.elapsed().as_millis() as u64;
        info!(
            intent = intent.as_str(),
            sources = sources.len(),
            response_time_ms,
            "answer generated"
        );

        AnswerResponse {
            answer,
            sources,
            confidence_score,
            response_time_ms,
            intent: intent.as_str().to_string(),
            conversation_id,
        }
    }

    /// Persisted history wins over client-supplied history.
    async fn effective_history(&self, request: &AnswerRequest) -> Vec<ChatMessage> {
        let Some(store) = &self.conversations else {
            return request.history.clone();
        };
        let Some(id) = &request.conversation_id else {
            return request.history.clone();
        };

        match store.get_messages(id, Some(HISTORY_MAX_MESSAGES)).await {
            Ok(messages) if !messages.is_empty() => messages
                .into_iter()
                .map(|m| ChatMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            Ok(_) => request.history.clone(),
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "failed to load history");
                request.history.clone()
            }
        }
    }

    /// Store the question/answer pair; persistence failures never break
    /// the response.
    async fn persist_exchange(&self, request: &AnswerRequest, answer: &str) -> Option<String> {
        let store = self.conversations.as_ref()?;

        let conversation_id = match &request.conversation_id {
            Some(id) => match store.get_conversation(id).await {
                Ok(Some(conv)) => conv.id,
                _ => self.create_conversation(store, &request.question).await?,
            },
            None => self.create_conversation(store, &request.question).await?,
        };

        if let Err(e) = store
            .append_message(&conversation_id, "user", &request.question)
            .await
        {
            warn!(error = %e, "failed to persist user message");
        }
        if let Err(e) = store
            .append_message(&conversation_id, "assistant", answer)
            .await
        {
            warn!(error = %e, "failed to persist assistant message");
        }

        Some(conversation_id)
    }

    async fn create_conversation(
        &self,
        store: &ConversationStore,
        question: &str,
    ) -> Option<String> {
        let title: String = question.trim().chars().take(50).collect();
        let title = if title.is_empty() {
            "New conversation".to_string()
        } else {
            title
        };

        match store.create_conversation(Some(&title)).await {
            Ok(conv) => Some(conv.id),
            Err(e) => {
                warn!(error = %e, "failed to create conversation");
                None
            }
        }
    }

    fn no_context_response(
        &self,
        request: &AnswerRequest,
        intent: &str,
        started: Instant,
    ) -> AnswerResponse {
        let answer = if is_chinese(&request.question) {
            "抱歉，我在现有文档中没有找到与您的问题相关的信息。请尝试：\n\n\
             1. 重新表述您的问题\n\
             2. 使用更具体的关键词\n\
             3. 查看官方文档获取最新信息"
                .to_string()
        } else {
            "I couldn't find relevant information in the documentation to answer your question. \
             Please try:\n\n\
             1. Rephrasing your question\n\
             2. Using more specific keywords\n\
             3. Checking the official documentation for the latest information"
                .to_string()
        };

        AnswerResponse {
            answer,
            sources: Vec::new(),
            confidence_score: 0.0,
            response_time_ms: started.elapsed().as_millis() as u64,
            intent: intent.to_string(),
            conversation_id: None,
        }
    }

    fn error_response(
        &self,
        request: &AnswerRequest,
        intent: &str,
        error: &str,
        started: Instant,
    ) -> AnswerResponse {
        let answer = if is_chinese(&request.question) {
            format!("抱歉，处理您的问题时出现了技术错误。请稍后重试。\n\n错误详情：{error}")
        } else {
            format!(
                "I apologize, but I encountered a technical error while processing your \
                 question. Please try again later.\n\nError details: {error}"
            )
        };

        AnswerResponse {
            answer,
            sources: Vec::new(),
            confidence_score: 0.0,
            response_time_ms: started.elapsed().as_millis() as u64,
            intent: intent.to_string(),
            conversation_id: None,
        }
    }
}

/// Whether the text contains CJK Unified Ideographs.
fn is_chinese(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

fn build_context(relevant: &[(DocumentChunk, f64)], docs_root: &std::path::Path) -> String {
    if relevant.is_empty() {
        return "No relevant documentation found.".to_string();
    }

    let mut parts = Vec::with_capacity(relevant.len());
    for (i, (chunk, score)) in relevant.iter().enumerate() {
        let section = chunk
            .heading
            .as_ref()
            .map(|h| format!("Section: {h}\n"))
            .unwrap_or_default();
        parts.push(format!(
            "Document {}: {}\n{}Source: {}\nRelevance: {:.2}\n\n{}\n---",
            i + 1,
            chunk.title,
            section,
            chunk.relative_path(docs_root),
            score,
            chunk.content
        ));
    }

    parts.join("\n\n")
}

fn build_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return "No previous conversation.".to_string();
    }

    let start = history.len().saturating_sub(HISTORY_MAX_MESSAGES);
    history[start..]
        .iter()
        .map(|m| {
            let role = if m.role == "user" { "User" } else { "Assistant" };
            format!("{role}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn source_references(
    relevant: &[(DocumentChunk, f64)],
    docs_root: &std::path::Path,
) -> Vec<SourceReference> {
    relevant
        .iter()
        .map(|(chunk, score)| {
            let mut preview: String = chunk.content.chars().take(PREVIEW_CHARS).collect();
            if chunk.content.chars().count() > PREVIEW_CHARS {
                preview.push_str("...");
            }
            SourceReference {
                title: chunk.title.clone(),
                file_path: chunk.relative_path(docs_root),
                chunk_index: chunk.chunk_index,
                similarity_score: *score,
                content_preview: preview,
            }
        })
        .collect()
}

/// Weighted blend of average similarity, source diversity, and answer
/// length, rounded to two decimals.
fn confidence(relevant: &[(DocumentChunk, f64)], answer: &str) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }

    let avg_similarity: f64 =
        relevant.iter().map(|(_, s)| s).sum::<f64>() / relevant.len() as f64;
    let source_diversity = (relevant.len() as f64 / 3.0).min(1.0);
    let answer_length_factor = (answer.chars().count() as f64 / 500.0).min(1.0);

    let score = avg_similarity * 0.6 + source_diversity * 0.3 + answer_length_factor * 0.1;
    (score.min(1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::embedding::EmbeddingGateway;
    use crate::models::DocumentMetadata;
    use crate::store::{ChunkStore, InMemoryStore};
    use anyhow::Result;
    use async_trait::async_trait;

    struct CannedChat {
        reply: Option<String>,
    }

    #[async_trait]
    impl ChatModel for CannedChat {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String> {
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => anyhow::bail!("model unavailable"),
            }
        }
    }

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingGateway for ConstantEmbedder {
        fn model_name(&self) -> &str {
            "constant"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunk(path: &str, content: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("{path}#0"),
            document_path: path.to_string(),
            title: "Guide".to_string(),
            content: content.to_string(),
            chunk_index: 0,
            start_char: 0,
            end_char: content.len().max(1),
            heading: Some("Setup".to_string()),
            heading_level: Some(2),
            metadata: DocumentMetadata::default(),
            word_count: content.split_whitespace().count(),
        }
    }

    async fn pipeline_with(
        store: Arc<InMemoryStore>,
        reply: Option<&str>,
        conversations: Option<Arc<ConversationStore>>,
    ) -> AnswerPipeline {
        let retriever = Retriever::new(
            store,
            Arc::new(ConstantEmbedder),
            RetrievalConfig {
                similarity_threshold: 0.5,
                top_k: 3,
                candidate_limit: 100,
            },
        );
        AnswerPipeline::new(
            retriever,
            Arc::new(CannedChat {
                reply: reply.map(str::to_string),
            }),
            conversations,
            PathBuf::from("docs"),
        )
    }

    #[tokio::test]
    async fn no_context_is_localized() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline_with(store, Some("unused"), None).await;

        let en = pipeline.answer(&AnswerRequest::new("how do plugins work")).await;
        assert!(en.answer.contains("Rephrasing"));
        assert_eq!(en.confidence_score, 0.0);
        assert!(en.sources.is_empty());

        let zh = pipeline.answer(&AnswerRequest::new("插件如何工作")).await;
        assert!(zh.answer.contains("重新表述"));
    }

    #[tokio::test]
    async fn answers_with_sources_and_confidence() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_document(
                "guide/setup.md",
                "fp",
                &[chunk("guide/setup.md", "Install the package and run it.")],
                &[vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let pipeline = pipeline_with(store, Some("Run the installer."), None).await;
        let response = pipeline.answer(&AnswerRequest::new("how do I install")).await;

        assert_eq!(response.answer, "Run the installer.");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].file_path, "setup.md");
        assert!(response.confidence_score > 0.0);
        assert_eq!(response.intent, "concept_learning");
    }

    #[tokio::test]
    async fn generation_failure_maps_to_error_response() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_document(
                "guide/setup.md",
                "fp",
                &[chunk("guide/setup.md", "Install the package.")],
                &[vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let pipeline = pipeline_with(store, None, None).await;
        let response = pipeline.answer(&AnswerRequest::new("how do I install")).await;
        assert!(response.answer.contains("technical error"));
        assert_eq!(response.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn exchange_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let conversations = Arc::new(
            ConversationStore::connect(&dir.path().join("conv.sqlite"))
                .await
                .unwrap(),
        );

        let store = Arc::new(InMemoryStore::new());
        store
            .upsert_document(
                "guide/setup.md",
                "fp",
                &[chunk("guide/setup.md", "Install the package.")],
                &[vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let pipeline = pipeline_with(store, Some("Done."), Some(conversations.clone())).await;
        let response = pipeline.answer(&AnswerRequest::new("how do I install")).await;

        let conversation_id = response.conversation_id.expect("conversation created");
        let messages = conversations
            .get_messages(&conversation_id, None)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].content, "Done.");
    }

    #[test]
    fn confidence_blend() {
        let chunks = vec![
            (chunk("a.md", "x"), 0.9),
            (chunk("b.md", "y"), 0.8),
            (chunk("c.md", "z"), 0.7),
        ];
        let long_answer = "a".repeat(500);
        // 0.8 * 0.6 + 1.0 * 0.3 + 1.0 * 0.1 = 0.88
        assert!((confidence(&chunks, &long_answer) - 0.88).abs() < 1e-9);
        assert_eq!(confidence(&[], "anything"), 0.0);
    }

    #[test]
    fn context_includes_chunk_details() {
        let relevant = vec![(chunk("guide/setup.md", "Install it."), 0.9)];
        let context = build_context(&relevant, std::path::Path::new("guide"));
        assert!(context.contains("Document 1: Guide"));
        assert!(context.contains("Section: Setup"));
        assert!(context.contains("Source: setup.md"));
        assert!(context.contains("Install it."));
    }

    #[test]
    fn history_truncated_to_recent() {
        let history: Vec<ChatMessage> = (0..15)
            .map(|i| ChatMessage::user(format!("message {i}")))
            .collect();
        let text = build_history(&history);
        assert!(!text.contains("message 9"));
        assert!(text.contains("message 10"));
        assert!(text.contains("message 14"));
    }
}
