//! ABOUTME: Document and Question storage (§4.10-§4.12), mirroring the Job Registry's
//! ABOUTME: trait-plus-backend split so stages run against a fake in tests

use async_trait::async_trait;
use docflow_core::{
    Classification, CognitiveLevel, Difficulty, Document, DocumentId, Question, QuestionId,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Other(String),
}

/// A transaction spanning a `DocumentStore` + `QuestionStore` pair that
/// share the same backing connection (the Postgres CLI wiring hands both
/// trait objects the same `PostgresStore`; see `begin_transaction`). The
/// in-memory fakes have nothing to coordinate since each write already
/// takes its `RwLock` for the whole batch, so `InMemory` is a true no-op.
pub enum StoreTx {
    Postgres(deadpool_postgres::Client),
    InMemory,
}

impl StoreTx {
    async fn begin_postgres(pool: &deadpool_postgres::Pool) -> Result<Self, PersistenceError> {
        let client = pool
            .get()
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        Ok(Self::Postgres(client))
    }

    fn client(&self) -> Result<&deadpool_postgres::Client, PersistenceError> {
        match self {
            Self::Postgres(client) => Ok(client),
            Self::InMemory => Err(PersistenceError::Other(
                "expected a Postgres transaction handle, got an in-memory one".to_string(),
            )),
        }
    }

    pub async fn commit(self) -> Result<(), PersistenceError> {
        match self {
            Self::Postgres(client) => client
                .batch_execute("COMMIT")
                .await
                .map_err(|e| PersistenceError::Transient(e.to_string())),
            Self::InMemory => Ok(()),
        }
    }

    /// Best-effort; the caller already has the real error to propagate, so
    /// a failed rollback is swallowed rather than masking it.
    pub async fn rollback(self) {
        if let Self::Postgres(client) = self {
            let _ = client.batch_execute("ROLLBACK").await;
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: Document) -> Result<(), PersistenceError>;
    async fn get(&self, document_id: DocumentId) -> Result<Document, PersistenceError>;

    /// Opens a transaction shared with a `QuestionStore` backed by the
    /// same connection, for stages that must commit a document and its
    /// questions atomically (§4.10 rule 7).
    async fn begin_transaction(&self) -> Result<StoreTx, PersistenceError>;
    async fn insert_in_tx(&self, tx: &StoreTx, document: Document) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait QuestionStore: Send + Sync {
    async fn insert_many(&self, questions: Vec<Question>) -> Result<Vec<QuestionId>, PersistenceError>;
    async fn insert_many_in_tx(
        &self,
        tx: &StoreTx,
        questions: Vec<Question>,
    ) -> Result<Vec<QuestionId>, PersistenceError>;
    async fn get_many(&self, ids: &[QuestionId]) -> Result<Vec<Question>, PersistenceError>;

    /// Applies `(question_id, classification)` pairs, setting
    /// `is_classified = true` on each updated row.
    async fn apply_classifications(
        &self,
        classifications: Vec<(QuestionId, Classification)>,
    ) -> Result<(), PersistenceError>;

    /// Applies `(question_id, embedding)` pairs, setting `is_embedded =
    /// true` on each updated row.
    async fn apply_embeddings(
        &self,
        embeddings: Vec<(QuestionId, Vec<f32>)>,
    ) -> Result<(), PersistenceError>;
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, Document>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: Document) -> Result<(), PersistenceError> {
        self.documents.write().insert(document.id, document);
        Ok(())
    }

    async fn get(&self, document_id: DocumentId) -> Result<Document, PersistenceError> {
        self.documents
            .read()
            .get(&document_id)
            .cloned()
            .ok_or(PersistenceError::DocumentNotFound(document_id))
    }

    async fn begin_transaction(&self) -> Result<StoreTx, PersistenceError> {
        Ok(StoreTx::InMemory)
    }

    async fn insert_in_tx(&self, _tx: &StoreTx, document: Document) -> Result<(), PersistenceError> {
        self.insert(document).await
    }
}

#[derive(Default)]
pub struct InMemoryQuestionStore {
    questions: RwLock<HashMap<QuestionId, Question>>,
}

impl InMemoryQuestionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored question, for assertions in tests that have
    /// no other way to recover question ids once `run_job` returns.
    #[must_use]
    pub fn all(&self) -> Vec<Question> {
        self.questions.read().values().cloned().collect()
    }
}

#[async_trait]
impl QuestionStore for InMemoryQuestionStore {
    async fn insert_many(&self, questions: Vec<Question>) -> Result<Vec<QuestionId>, PersistenceError> {
        let mut store = self.questions.write();
        let mut ids = Vec::with_capacity(questions.len());
        for question in questions {
            ids.push(question.id);
            store.insert(question.id, question);
        }
        Ok(ids)
    }

    async fn insert_many_in_tx(
        &self,
        _tx: &StoreTx,
        questions: Vec<Question>,
    ) -> Result<Vec<QuestionId>, PersistenceError> {
        self.insert_many(questions).await
    }

    async fn get_many(&self, ids: &[QuestionId]) -> Result<Vec<Question>, PersistenceError> {
        let store = self.questions.read();
        ids.iter()
            .map(|id| store.get(id).cloned().ok_or(PersistenceError::QuestionNotFound(*id)))
            .collect()
    }

    async fn apply_classifications(
        &self,
        classifications: Vec<(QuestionId, Classification)>,
    ) -> Result<(), PersistenceError> {
        let mut store = self.questions.write();
        for (id, classification) in classifications {
            let question = store
                .get_mut(&id)
                .ok_or(PersistenceError::QuestionNotFound(id))?;
            question.apply_classification(classification);
        }
        Ok(())
    }

    async fn apply_embeddings(
        &self,
        embeddings: Vec<(QuestionId, Vec<f32>)>,
    ) -> Result<(), PersistenceError> {
        let mut store = self.questions.write();
        for (id, embedding) in embeddings {
            let question = store
                .get_mut(&id)
                .ok_or(PersistenceError::QuestionNotFound(id))?;
            question.apply_embedding(embedding);
        }
        Ok(())
    }
}

/// Postgres-backed `DocumentStore`/`QuestionStore`. Schema migrations are
/// out of scope per the Non-goals; this assumes `documents` and
/// `questions` tables exist, the latter with a `pgvector` column sized to
/// the configured embedding dimension.
pub struct PostgresStore {
    pool: deadpool_postgres::Pool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    async fn connection(&self) -> Result<deadpool_postgres::Client, PersistenceError> {
        self.pool
            .get()
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))
    }
}

fn row_to_document(row: &tokio_postgres::Row) -> Document {
    let kind: String = row.get("kind");
    Document {
        id: DocumentId::from_uuid(row.get("id")),
        user_id: row.get("user_id"),
        original_filename: row.get("original_filename"),
        source_ref: row.get("source_ref"),
        job_id: docflow_core::JobId::from_uuid(row.get("job_id")),
        raw_markdown: row.get("raw_markdown"),
        cleaned_markdown: row.get("cleaned_markdown"),
        rewritten_markdown: row.get("rewritten_markdown"),
        kind: parse_kind(&kind),
        question_count: u32::try_from(row.get::<_, i32>("question_count")).unwrap_or(0),
    }
}

fn parse_kind(s: &str) -> docflow_core::DocumentKind {
    use docflow_core::DocumentKind;
    match s {
        "pdf" => DocumentKind::Pdf,
        "docx" => DocumentKind::Docx,
        "pptx" => DocumentKind::Pptx,
        "xlsx" => DocumentKind::Xlsx,
        "image" => DocumentKind::Image,
        "html" => DocumentKind::Html,
        "xml" => DocumentKind::Xml,
        _ => DocumentKind::Unknown,
    }
}

async fn insert_document_row(
    client: &deadpool_postgres::Client,
    document: &Document,
) -> Result<(), PersistenceError> {
    client
        .execute(
            "INSERT INTO documents (id, user_id, original_filename, source_ref, job_id, \
             raw_markdown, cleaned_markdown, rewritten_markdown, kind, question_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &document.id.as_uuid(),
                &document.user_id,
                &document.original_filename,
                &document.source_ref,
                &document.job_id.as_uuid(),
                &document.raw_markdown,
                &document.cleaned_markdown,
                &document.rewritten_markdown,
                &document.kind.to_string(),
                &i32::try_from(document.question_count).unwrap_or(i32::MAX),
            ],
        )
        .await
        .map_err(|e| PersistenceError::Transient(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn insert(&self, document: Document) -> Result<(), PersistenceError> {
        let client = self.connection().await?;
        insert_document_row(&client, &document).await
    }

    async fn get(&self, document_id: DocumentId) -> Result<Document, PersistenceError> {
        let client = self.connection().await?;
        let row = client
            .query_opt(
                "SELECT * FROM documents WHERE id = $1",
                &[&document_id.as_uuid()],
            )
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?
            .ok_or(PersistenceError::DocumentNotFound(document_id))?;
        Ok(row_to_document(&row))
    }

    async fn begin_transaction(&self) -> Result<StoreTx, PersistenceError> {
        StoreTx::begin_postgres(&self.pool).await
    }

    async fn insert_in_tx(&self, tx: &StoreTx, document: Document) -> Result<(), PersistenceError> {
        insert_document_row(tx.client()?, &document).await
    }
}

async fn insert_question_row(
    client: &deadpool_postgres::Client,
    question: &Question,
) -> Result<(), PersistenceError> {
    let options = serde_json::to_value(&question.options)
        .map_err(|e| PersistenceError::Other(e.to_string()))?;
    client
        .execute(
            "INSERT INTO questions (id, user_id, document_id, ordinal, text, kind, \
             options, image_refs, correct_answer, is_classified, is_embedded) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &question.id.as_uuid(),
                &question.user_id,
                &question.document_id.as_uuid(),
                &i32::try_from(question.ordinal).unwrap_or(0),
                &question.text,
                &question_kind_str(question.kind),
                &options,
                &question.image_refs,
                &question.correct_answer,
                &question.is_classified,
                &question.is_embedded,
            ],
        )
        .await
        .map_err(|e| PersistenceError::Transient(e.to_string()))?;
    Ok(())
}

async fn insert_questions(
    client: &deadpool_postgres::Client,
    questions: Vec<Question>,
) -> Result<Vec<QuestionId>, PersistenceError> {
    let mut ids = Vec::with_capacity(questions.len());
    for question in &questions {
        insert_question_row(client, question).await?;
        ids.push(question.id);
    }
    Ok(ids)
}

async fn update_classification_row(
    client: &deadpool_postgres::Client,
    id: QuestionId,
    classification: &Classification,
) -> Result<(), PersistenceError> {
    client
        .execute(
            "UPDATE questions SET topic = $2, subtopic = $3, difficulty = $4, \
             grade_level = $5, cognitive_level = $6, tags = $7, is_classified = true \
             WHERE id = $1",
            &[
                &id.as_uuid(),
                &classification.topic,
                &classification.subtopic,
                &classification.difficulty.as_str(),
                &classification.grade_level,
                &classification.cognitive_level.as_str(),
                &classification.tags,
            ],
        )
        .await
        .map_err(|e| PersistenceError::Transient(e.to_string()))?;
    Ok(())
}

async fn update_embedding_row(
    client: &deadpool_postgres::Client,
    id: QuestionId,
    embedding: Vec<f32>,
) -> Result<(), PersistenceError> {
    let vector = pgvector::Vector::from(embedding);
    client
        .execute(
            "UPDATE questions SET embedding = $2, is_embedded = true WHERE id = $1",
            &[&id.as_uuid(), &vector],
        )
        .await
        .map_err(|e| PersistenceError::Transient(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl QuestionStore for PostgresStore {
    async fn insert_many(&self, questions: Vec<Question>) -> Result<Vec<QuestionId>, PersistenceError> {
        let client = self.connection().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        match insert_questions(&client, questions).await {
            Ok(ids) => {
                client
                    .batch_execute("COMMIT")
                    .await
                    .map_err(|e| PersistenceError::Transient(e.to_string()))?;
                Ok(ids)
            }
            Err(e) => {
                let _ = client.batch_execute("ROLLBACK").await;
                Err(e)
            }
        }
    }

    async fn insert_many_in_tx(
        &self,
        tx: &StoreTx,
        questions: Vec<Question>,
    ) -> Result<Vec<QuestionId>, PersistenceError> {
        insert_questions(tx.client()?, questions).await
    }

    async fn get_many(&self, ids: &[QuestionId]) -> Result<Vec<Question>, PersistenceError> {
        let client = self.connection().await?;
        let uuids: Vec<uuid::Uuid> = ids.iter().map(docflow_core::QuestionId::as_uuid).collect();
        let rows = client
            .query("SELECT * FROM questions WHERE id = ANY($1)", &[&uuids])
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        if rows.len() != ids.len() {
            return Err(PersistenceError::Other(
                "some requested questions were not found".to_string(),
            ));
        }
        Ok(rows.iter().map(row_to_question).collect())
    }

    async fn apply_classifications(
        &self,
        classifications: Vec<(QuestionId, Classification)>,
    ) -> Result<(), PersistenceError> {
        let client = self.connection().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        for (id, classification) in &classifications {
            if let Err(e) = update_classification_row(&client, *id, classification).await {
                let _ = client.batch_execute("ROLLBACK").await;
                return Err(e);
            }
        }
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        Ok(())
    }

    async fn apply_embeddings(
        &self,
        embeddings: Vec<(QuestionId, Vec<f32>)>,
    ) -> Result<(), PersistenceError> {
        let client = self.connection().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        for (id, embedding) in embeddings {
            if let Err(e) = update_embedding_row(&client, id, embedding).await {
                let _ = client.batch_execute("ROLLBACK").await;
                return Err(e);
            }
        }
        client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| PersistenceError::Transient(e.to_string()))?;
        Ok(())
    }
}

fn question_kind_str(kind: docflow_core::QuestionKind) -> &'static str {
    use docflow_core::QuestionKind;
    match kind {
        QuestionKind::MultipleChoice => "multiple_choice",
        QuestionKind::OpenEnded => "open_ended",
        QuestionKind::TrueFalse => "true_false",
        QuestionKind::FillInBlank => "fill_in_blank",
    }
}

fn parse_question_kind(s: &str) -> docflow_core::QuestionKind {
    use docflow_core::QuestionKind;
    match s {
        "open_ended" => QuestionKind::OpenEnded,
        "true_false" => QuestionKind::TrueFalse,
        "fill_in_blank" => QuestionKind::FillInBlank,
        _ => QuestionKind::MultipleChoice,
    }
}

fn row_to_classification(row: &tokio_postgres::Row) -> Option<Classification> {
    let topic: Option<String> = row.get("topic");
    let difficulty: Option<Difficulty> = row
        .get::<_, Option<String>>("difficulty")
        .and_then(|s| Difficulty::parse(&s));
    let cognitive_level: Option<CognitiveLevel> = row
        .get::<_, Option<String>>("cognitive_level")
        .and_then(|s| CognitiveLevel::parse(&s));
    Some(Classification {
        topic: topic?,
        subtopic: row.get("subtopic"),
        difficulty: difficulty?,
        grade_level: row.get("grade_level"),
        cognitive_level: cognitive_level?,
        tags: row.get("tags"),
    })
}

fn row_to_question(row: &tokio_postgres::Row) -> Question {
    let options_value: serde_json::Value = row.get("options");
    let options = serde_json::from_value(options_value).unwrap_or_default();
    let is_classified: bool = row.get("is_classified");
    let is_embedded: bool = row.get("is_embedded");
    let classification = is_classified.then(|| row_to_classification(row)).flatten();
    let embedding = is_embedded.then(|| row.get::<_, pgvector::Vector>("embedding").to_vec());
    Question {
        id: QuestionId::from_uuid(row.get("id")),
        user_id: row.get("user_id"),
        document_id: DocumentId::from_uuid(row.get("document_id")),
        ordinal: u32::try_from(row.get::<_, i32>("ordinal")).unwrap_or(0),
        text: row.get("text"),
        kind: parse_question_kind(row.get("kind")),
        options,
        image_refs: row.get("image_refs"),
        correct_answer: row.get("correct_answer"),
        classification,
        is_classified,
        embedding,
        is_embedded,
    }
}
