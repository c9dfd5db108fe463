//! Query service: retrieve context, build a grounding prompt, ask the LLM.
//!
//! ```text
//! query ──embed──▶ VectorStore::similarity_search(k = top_k)
//!                        │ hits (minus those under min_score)
//!             none ◀─────┴─────▶ some
//!               │                  │ build_prompt(context, query)
//!          NO_ANSWER               ▼
//!                           ChatModel::complete([... transcript, prompt])
//! ```
//!
//! Transcript state is never global. A caller that wants a multi-turn
//! conversation owns a [`Conversation`] and passes it in; the HTTP server
//! keeps one per `session` parameter.

use anyhow::Result;
use std::sync::Arc;

use crate::config::QueryConfig;
use crate::llm::{ChatMessage, ChatModel};
use crate::models::SearchHit;
use crate::store::VectorStore;

/// Returned when retrieval finds nothing to ground an answer on.
pub const NO_ANSWER: &str = "I don't have an answer for that.";

/// A per-session chat transcript of human/assistant turns.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    max_turns: Option<usize>,
}

impl Conversation {
    /// `max_turns` bounds the number of human/assistant pairs kept;
    /// the oldest pairs are dropped first.
    pub fn new(max_turns: Option<usize>) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Record a completed exchange and apply the turn limit.
    fn push_exchange(&mut self, human: ChatMessage, assistant: ChatMessage) {
        self.messages.push(human);
        self.messages.push(assistant);
        self.trim();
    }

    fn trim(&mut self) {
        if let Some(max) = self.max_turns {
            let keep = max.saturating_mul(2);
            if self.messages.len() > keep {
                let excess = self.messages.len() - keep;
                self.messages.drain(..excess);
            }
        }
    }
}

/// Join retrieved chunks and wrap them with the question.
pub fn build_prompt(hits: &[SearchHit], query: &str) -> String {
    let context = hits
        .iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Based on the following context:\n{context}\n\n\
         Answer the question: {query}\n\
         Use only the context above. If it does not answer the question, \
         reply that you don't have an answer for that."
    )
}

pub struct QueryService {
    store: Arc<VectorStore>,
    llm: Arc<dyn ChatModel>,
    top_k: usize,
    min_score: Option<f64>,
}

impl QueryService {
    pub fn new(store: Arc<VectorStore>, llm: Arc<dyn ChatModel>, config: &QueryConfig) -> Self {
        Self {
            store,
            llm,
            top_k: config.top_k.max(1),
            min_score: config.min_score,
        }
    }

    /// Hits for `query` that clear the similarity floor.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>> {
        let mut hits = self.store.similarity_search(query, self.top_k).await?;
        if let Some(floor) = self.min_score {
            hits.retain(|h| h.score >= floor);
        }
        Ok(hits)
    }

    /// Answer `query`. With a conversation, the prompt is sent after the
    /// previous turns and the exchange is appended once the LLM replies;
    /// a failed call leaves the transcript unchanged.
    pub async fn answer(
        &self,
        query: &str,
        conversation: Option<&mut Conversation>,
    ) -> Result<String> {
        let hits = self.retrieve(query).await?;

        if hits.is_empty() {
            crate::debug_event!("query", "no context", "{}", query);
            if let Some(conv) = conversation {
                conv.push_exchange(ChatMessage::human(query), ChatMessage::assistant(NO_ANSWER));
            }
            return Ok(NO_ANSWER.to_string());
        }

        crate::debug_event!(
            "query",
            "retrieved",
            "{} hits, best {:.3} from {}",
            hits.len(),
            hits[0].score,
            hits[0].metadata.source
        );

        let prompt = ChatMessage::human(build_prompt(&hits, query));

        let reply = match conversation {
            Some(conv) => {
                let mut messages = conv.messages().to_vec();
                messages.push(prompt.clone());
                let reply = self.llm.complete(&messages).await?;
                conv.push_exchange(prompt, ChatMessage::assistant(reply.clone()));
                reply
            }
            None => self.llm.complete(std::slice::from_ref(&prompt)).await?,
        };

        Ok(reply)
    }
}
