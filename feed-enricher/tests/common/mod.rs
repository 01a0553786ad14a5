#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_enricher::enrichment::{
    GenerateError, ModelParams, PromptTemplates, RateLimitConfig, RateLimitedClient,
    StageContext, TextGenerator,
};
use feed_enricher::store::StoreStats;
use feed_enricher::types::{
    CandidateEntry, EnricherError, FeedEntry, Result, SourceItem, Stage, StageUpdate,
};
use feed_enricher::{EntryStore, FeedSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;
use whatlang::Lang;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn candidate(link: &str, source_url: &str, pub_date: DateTime<Utc>) -> CandidateEntry {
    CandidateEntry {
        link: link.to_string(),
        source_url: source_url.to_string(),
        title: format!("Title for {}", link),
        description: format!("Description for {}", link),
        pub_date,
    }
}

pub fn source_item(title: &str, link: &str, published_at: Option<DateTime<Utc>>) -> SourceItem {
    SourceItem {
        title: title.to_string(),
        link: Some(link.to_string()),
        description: format!("<p>{} body</p>", title),
        published_at,
    }
}

/// Minimal RSS 2.0 document; items without a date get no `<pubDate>`.
pub fn rss_document(items: &[(&str, &str, Option<DateTime<Utc>>)]) -> String {
    let mut body = String::new();
    for (title, link, published) in items {
        body.push_str("<item>");
        body.push_str(&format!("<title>{}</title>", title));
        body.push_str(&format!("<link>{}</link>", link));
        body.push_str(&format!("<description>{} body</description>", title));
        if let Some(published) = published {
            body.push_str(&format!("<pubDate>{}</pubDate>", published.to_rfc2822()));
        }
        body.push_str("</item>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Test</title><link>https://example.test</link><description>Test feed</description>{}</channel></rss>"#,
        body
    )
}

/// Source returning a fixed item list
pub struct StaticSource {
    pub url: String,
    pub lookback_days: i64,
    pub items: Vec<SourceItem>,
}

#[async_trait]
impl FeedSource for StaticSource {
    fn source_url(&self) -> &str {
        &self.url
    }

    fn lookback_days(&self) -> i64 {
        self.lookback_days
    }

    async fn pull(&self) -> Result<Vec<SourceItem>> {
        Ok(self.items.clone())
    }
}

/// Source whose every pull fails like an unreachable host
pub struct FailingSource {
    pub url: String,
}

#[async_trait]
impl FeedSource for FailingSource {
    fn source_url(&self) -> &str {
        &self.url
    }

    fn lookback_days(&self) -> i64 {
        7
    }

    async fn pull(&self) -> Result<Vec<SourceItem>> {
        Err(EnricherError::SourceFetch {
            url: self.url.clone(),
            reason: "connection refused".to_string(),
        })
    }
}

/// Generator replaying a fixed script of responses, then failing fatally
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<std::result::Result<String, GenerateError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<std::result::Result<String, GenerateError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &ModelParams,
    ) -> std::result::Result<String, GenerateError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GenerateError::Fatal("script exhausted".to_string())))
    }
}

type Responder = dyn Fn(&str) -> std::result::Result<String, GenerateError> + Send + Sync;

/// Generator answering every prompt through a closure
pub struct FnGenerator {
    respond: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl FnGenerator {
    pub fn new(
        respond: impl Fn(&str) -> std::result::Result<String, GenerateError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FnGenerator {
    async fn generate(
        &self,
        prompt: &str,
        _params: &ModelParams,
    ) -> std::result::Result<String, GenerateError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.respond)(prompt)
    }
}

/// Answers by prompt kind, recognizable from the default templates.
pub fn canned_responses(prompt: &str) -> std::result::Result<String, GenerateError> {
    if prompt.starts_with("Translate") {
        Ok("Translated text of the article".to_string())
    } else if prompt.contains("one-paragraph summary") {
        Ok("A short summary of the article.".to_string())
    } else if prompt.contains("engaging title") {
        Ok("\"A Better Title\"".to_string())
    } else if prompt.contains("Classify") {
        Ok("technology".to_string())
    } else {
        Err(GenerateError::Fatal("unexpected prompt".to_string()))
    }
}

pub fn no_wait_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        min_interval_ms: 0,
        base_delay_ms: 1,
        max_attempts: 3,
        max_total_backoff_ms: 100,
    }
}

pub fn stage_context(generator: Arc<dyn TextGenerator>, rate_limit: RateLimitConfig) -> StageContext {
    StageContext {
        client: Arc::new(RateLimitedClient::new(
            generator,
            ModelParams::default(),
            rate_limit,
        )),
        prompts: Arc::new(PromptTemplates::default()),
        target_language: Lang::Eng,
    }
}

pub fn vocabulary() -> Vec<String> {
    vec!["Politics".into(), "Sports".into(), "Technology".into()]
}

/// Store whose every call fails like a lost database connection
pub struct FailingStore;

fn unavailable<T>() -> Result<T> {
    Err(EnricherError::Store("database unavailable".to_string()))
}

#[async_trait]
impl EntryStore for FailingStore {
    async fn upsert(&self, _entries: &[CandidateEntry]) -> Result<usize> {
        unavailable()
    }

    async fn latest_pub_date(&self, _source_url: &str) -> Result<Option<DateTime<Utc>>> {
        unavailable()
    }

    async fn select_unprocessed(
        &self,
        _stage: Stage,
        _after: Option<Uuid>,
        _limit: usize,
    ) -> Result<Vec<FeedEntry>> {
        unavailable()
    }

    async fn apply_stage_update(&self, _id: Uuid, _update: &StageUpdate) -> Result<bool> {
        unavailable()
    }

    async fn get_entry(&self, _link: &str, _source_url: &str) -> Result<Option<FeedEntry>> {
        unavailable()
    }

    async fn stats(&self) -> Result<StoreStats> {
        unavailable()
    }
}

/// Local HTTP/1.1 server answering each connection with the next canned
/// response; the last response repeats once the list is used up.
pub struct CannedServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    pub async fn start(responses: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let counter = hits.clone();
        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let response = responses[n.min(responses.len() - 1)].clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    seen.lock().unwrap().push(request);
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url,
            hits,
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request (head and body) and return it as text
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= head_end + 4 + body_len {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    )
}

/// Server that accepts connections and never answers
pub async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    base_url
}

/// Address nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
