#![allow(dead_code)]

use astro_query::agent_prompts::{GenerationRequest, RequestPurpose};
use astro_query::catalog::{Catalog, FieldInfo, TableInfo};
use astro_query::config::AgentConfig;
use astro_query::error::{AstroError, Result};
use astro_query::execution::{QueryExecutor, QueryResult};
use astro_query::execution_loop::CorrectionAgent;
use astro_query::llm::Generator;
use astro_query::schema_rag::{Embedder, Embedding, HashEmbedder, SchemaIndex, SchemaRetriever};
use astro_query::verifier::{Judge, Judgment};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMBEDDING_DIM: usize = 1024;

fn field(name: &str, data_type: &str, unit: &str, description: &str) -> FieldInfo {
    FieldInfo {
        name: name.to_string(),
        data_type: data_type.to_string(),
        length: "4".to_string(),
        unit: unit.to_string(),
        ucd: String::new(),
        description: description.to_string(),
    }
}

/// Small SDSS-like catalog: one star photometry table and two unrelated ones.
pub fn catalog() -> Catalog {
    Catalog::new(vec![
        TableInfo {
            name: "Star".to_string(),
            description: "Photometric catalog of stars with PSF magnitudes".to_string(),
            fields: vec![
                field("objID", "bigint", "", "Unique object identifier"),
                field("psfMag_r", "real", "mag", "PSF magnitude of the stars in the r band"),
                field("psfMag_g", "real", "mag", "PSF magnitude of the stars in the g band"),
            ],
        },
        TableInfo {
            name: "SpecObj".to_string(),
            description: "Spectroscopic redshift per plate fiber".to_string(),
            fields: vec![
                field("z", "real", "", "Final redshift"),
                field("class", "varchar", "", "Spectroscopic class: GALAXY, QSO"),
            ],
        },
        TableInfo {
            name: "Galaxy".to_string(),
            description: "Extended extragalactic objects".to_string(),
            fields: vec![field("petroRad_r", "real", "arcsec", "Petrosian radius in r")],
        },
    ])
}

pub async fn retriever() -> Arc<SchemaRetriever> {
    let embedder = Arc::new(HashEmbedder::new(EMBEDDING_DIM));
    let index = SchemaIndex::build(&catalog(), embedder.as_ref()).await.unwrap();
    Arc::new(SchemaRetriever::new(Arc::new(index), embedder).unwrap())
}

/// Embedder that fails its first `failures` calls, then delegates to a hash embedder.
pub struct FlakyEmbedder {
    inner: HashEmbedder,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HashEmbedder::new(EMBEDDING_DIM),
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AstroError::Embedding(
                "Embedding API error (503): upstream unavailable".to_string(),
            ));
        }
        self.inner.embed(text).await
    }
}

/// Retriever over the test catalog whose question embedding fails `failures` times.
pub async fn flaky_retriever(failures: usize) -> (Arc<SchemaRetriever>, Arc<FlakyEmbedder>) {
    let index = SchemaIndex::build(&catalog(), &HashEmbedder::new(EMBEDDING_DIM))
        .await
        .unwrap();
    let embedder = FlakyEmbedder::new(failures);
    let retriever = SchemaRetriever::new(Arc::new(index), embedder.clone()).unwrap();
    (Arc::new(retriever), embedder)
}

pub fn agent_config() -> AgentConfig {
    AgentConfig {
        min_score: None,
        ..AgentConfig::default()
    }
}

pub fn star_rows() -> QueryResult {
    QueryResult::new(
        vec!["objID".to_string(), "psfMag_r".to_string()],
        vec![
            vec![json!("1237648720693755918"), json!(13.2)],
            vec![json!("1237648720693755919"), json!(14.7)],
        ],
    )
}

/// Generator that replays scripted SQL responses and records every request.
pub struct ScriptedGenerator {
    sql: Mutex<VecDeque<Result<String>>>,
    explanation: Mutex<Option<Result<String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(sql: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            sql: Mutex::new(sql.into()),
            explanation: Mutex::new(Some(Ok("Finds bright stars.".to_string()))),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn with_explanation(sql: Vec<Result<String>>, explanation: Result<String>) -> Arc<Self> {
        Arc::new(Self {
            sql: Mutex::new(sql.into()),
            explanation: Mutex::new(Some(explanation)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made for SQL generation or repair, in order.
    pub fn sql_requests(&self) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|r| matches!(r.purpose, RequestPurpose::Generate | RequestPurpose::Repair))
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match request.purpose {
            RequestPurpose::Generate | RequestPurpose::Repair => {
                self.sql.lock().unwrap().pop_front().unwrap_or_else(|| {
                    Err(AstroError::GenerationTransport("script exhausted".to_string()))
                })
            }
            RequestPurpose::Explain => self
                .explanation
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok("Finds bright stars.".to_string())),
            RequestPurpose::Judge => Ok(r#"{"verdict": "pass", "reasoning": "ok"}"#.to_string()),
        }
    }
}

/// Executor that replays scripted outcomes, then keeps failing.
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<QueryResult>>>,
    fallback_error: String,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: Vec<Result<QueryResult>>) -> Arc<Self> {
        Self::build(outcomes, Duration::ZERO)
    }

    pub fn always_failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback_error: message.to_string(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(vec![Ok(star_rows())], delay)
    }

    fn build(outcomes: Vec<Result<QueryResult>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            fallback_error: "Invalid column name 'mag'.".to_string(),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, sql: &str, _row_limit: Option<u64>) -> Result<QueryResult> {
        self.calls.lock().unwrap().push(sql.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.outcomes.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(AstroError::Execution(self.fallback_error.clone())))
    }
}

/// Judge that replays scripted judgments, then passes.
pub struct ScriptedJudge {
    judgments: Mutex<VecDeque<Judgment>>,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    pub fn new(judgments: Vec<Judgment>) -> Arc<Self> {
        Arc::new(Self {
            judgments: Mutex::new(judgments.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn passing() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(&self, _question: &str, _sql: &str, _result: &QueryResult) -> Result<Judgment> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.judgments.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| Judgment::pass("matches the question")))
    }
}

pub async fn agent(
    generator: Arc<ScriptedGenerator>,
    executor: Arc<ScriptedExecutor>,
    judge: Arc<ScriptedJudge>,
    config: AgentConfig,
) -> CorrectionAgent {
    CorrectionAgent::new(retriever().await, generator, executor, judge, config).unwrap()
}
