//! In-memory doubles for application service tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use tsumugi::{
    ChunkScope, ConversationStore, ConversationTurn, Document, DocumentChunk, DocumentRepository,
    DomainError, EmbeddingService, ModelProvider, ModelStream, ModelStreamEvent, ModelUsage,
    ToolSchema, UsageRange, UsageRecord, UsageRepository, UsageScope, UsageSummary, UsageTotals,
};

#[derive(Default)]
pub struct InMemoryConversationStore {
    turns: Mutex<HashMap<String, Vec<ConversationTurn>>>,
    appends: AtomicUsize,
}

impl InMemoryConversationStore {
    pub fn with_history(conversation_id: &str, turns: Vec<ConversationTurn>) -> Self {
        let store = Self::default();
        store
            .turns
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), turns);
        store
    }

    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn history(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        self.turns
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        conversation_id: &str,
        turn: &ConversationTurn,
    ) -> Result<(), DomainError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.turns
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn read_all(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>, DomainError> {
        Ok(self.history(conversation_id))
    }
}

/// One scripted item of a model response
#[derive(Clone)]
pub enum Scripted {
    Event(ModelStreamEvent),
    /// The stream yields an error at this point
    Fail(String),
}

/// Model double that replays scripted responses and records its inputs.
///
/// Scripts are consumed in order; the last one repeats forever.
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Vec<Scripted>>>,
    calls: Mutex<Vec<(Vec<ConversationTurn>, Vec<ToolSchema>)>>,
    fail_open: bool,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Vec<Scripted>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            calls: Mutex::new(Vec::new()),
            fail_open: false,
        }
    }

    /// A model whose stream cannot even be opened
    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn messages_of_call(&self, index: usize) -> Vec<ConversationTurn> {
        self.calls.lock().unwrap()[index].0.clone()
    }

    pub fn tools_of_call(&self, index: usize) -> Vec<ToolSchema> {
        self.calls.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedModel {
    async fn stream(
        &self,
        messages: &[ConversationTurn],
        tools: &[ToolSchema],
    ) -> Result<ModelStream, DomainError> {
        self.calls
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.to_vec()));

        if self.fail_open {
            return Err(DomainError::ExternalService("model unavailable".to_string()));
        }

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.len() > 1 {
                scripts.pop_front().unwrap()
            } else {
                scripts.front().cloned().unwrap_or_default()
            }
        };

        let items: Vec<Result<ModelStreamEvent, DomainError>> = script
            .into_iter()
            .map(|item| match item {
                Scripted::Event(event) => Ok(event),
                Scripted::Fail(message) => Err(DomainError::ExternalService(message)),
            })
            .collect();

        Ok(Box::pin(stream::iter(items)))
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        "gpt-4o-mini"
    }
}

/// Chunks stored newest-last; candidates come back newest first
#[derive(Default)]
pub struct InMemoryDocumentRepository {
    chunks: Mutex<Vec<DocumentChunk>>,
    documents: Mutex<Vec<Document>>,
}

impl InMemoryDocumentRepository {
    pub fn with_chunks(chunks: Vec<DocumentChunk>) -> Self {
        let repo = Self::default();
        *repo.chunks.lock().unwrap() = chunks;
        repo
    }

    pub fn chunks(&self) -> Vec<DocumentChunk> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn find_candidates(
        &self,
        scope: &ChunkScope,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>, DomainError> {
        let chunks = self.chunks.lock().unwrap();
        Ok(chunks
            .iter()
            .rev()
            .filter(|c| match scope {
                ChunkScope::Thread { user_id, thread_id } => {
                    &c.user_id == user_id && c.thread_id.as_ref() == Some(thread_id)
                }
                ChunkScope::User { user_id } => &c.user_id == user_id,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn save_document(
        &self,
        document: &Document,
        chunks: &[DocumentChunk],
    ) -> Result<Document, DomainError> {
        self.documents.lock().unwrap().push(document.clone());
        self.chunks.lock().unwrap().extend(chunks.iter().cloned());
        Ok(document.clone())
    }
}

/// Embeds known texts to fixed vectors, anything else to `fallback`
pub struct StaticEmbedding {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl StaticEmbedding {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingService for StaticEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, DomainError> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingService for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, DomainError> {
        Err(DomainError::ExternalService("embedding quota exceeded".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        Err(DomainError::ExternalService("embedding quota exceeded".to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryUsageRepository {
    records: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageRepository {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }

    fn in_scope(scope: &UsageScope, record: &UsageRecord) -> bool {
        match scope {
            UsageScope::User(id) => record.user_id.as_ref() == Some(id),
            UsageScope::ApiKey(id) => record.api_key_id.as_ref() == Some(id),
        }
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn create(&self, record: &UsageRecord) -> Result<UsageRecord, DomainError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(record.clone())
    }

    async fn list(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<Vec<UsageRecord>, DomainError> {
        let mut records: Vec<UsageRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| Self::in_scope(scope, r) && range.contains(r.created_at))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn summarize(
        &self,
        scope: &UsageScope,
        range: UsageRange,
    ) -> Result<UsageSummary, DomainError> {
        let mut by_model: Vec<ModelUsage> = Vec::new();
        for record in self.list(scope, range).await? {
            let position = by_model
                .iter()
                .position(|m| m.provider == record.provider && m.model == record.model);
            let entry = match position {
                Some(i) => &mut by_model[i],
                None => {
                    by_model.push(ModelUsage {
                        provider: record.provider.clone(),
                        model: record.model.clone(),
                        totals: UsageTotals::default(),
                    });
                    by_model.last_mut().unwrap()
                }
            };
            entry.totals.tokens_in += record.tokens_in;
            entry.totals.tokens_out += record.tokens_out;
            entry.totals.tokens_total += record.tokens_total;
            entry.totals.cost += record.cost;
            entry.totals.count += 1;
        }
        Ok(UsageSummary::from_models(by_model))
    }
}
