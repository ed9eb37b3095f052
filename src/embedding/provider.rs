// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers receive text that has already been normalized with
//! [`normalize_text`]. The search engine bounds every call with a timeout, so
//! implementations may block.

use anyhow::{anyhow, bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{EmbeddingProviderType, EngineSettings, DEFAULT_TIMEOUT_MS};
use crate::errors::ConfigError;

const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 256;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;
const FASTEMBED_DIMENSION: usize = 384;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Collapses newlines to spaces and trims, the form every provider receives.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the vector length this provider always produces, if fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Generates embeddings for the given texts.
    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result.pop().ok_or_else(|| anyhow!("No embedding returned"))
    }
}

/// Builds the provider selected by `settings`.
pub fn create_provider(
    settings: &EngineSettings,
) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
    let provider: Arc<dyn EmbeddingProvider> = match settings.provider {
        EmbeddingProviderType::Gemini => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                ConfigError::MissingCredential(settings.api_key_env.clone())
            })?;
            let mut provider = GeminiProvider::new(&settings.model, api_key, settings.timeout)
                .map_err(|e| ConfigError::Provider(format!("{:#}", e)))?;
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url);
            }
            if let Some(task_type) = &settings.task_type {
                provider = provider.with_task_type(task_type);
            }
            Arc::new(provider)
        }
        EmbeddingProviderType::Command => Arc::new(
            CommandProvider::new(settings.command.clone(), settings.model.clone())
                .with_timeout(settings.timeout),
        ),
        EmbeddingProviderType::Builtin => Arc::new(
            FastEmbedder::new(EmbeddingModel::AllMiniLML6V2)
                .map_err(|e| ConfigError::Provider(format!("{:#}", e)))?,
        ),
        EmbeddingProviderType::Hashing => Arc::new(HashingProvider::new(settings.dimension)),
        EmbeddingProviderType::Dummy => Arc::new(DummyProvider::new(settings.dimension)),
    };
    Ok(provider)
}

/// Provider backed by the Generative Language API `batchEmbedContents` call.
pub struct GeminiProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
    api_key: String,
    task_type: String,
}

#[derive(Deserialize)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbedding>,
}

#[derive(Deserialize)]
struct GeminiEmbedding {
    values: Vec<f32>,
}

impl GeminiProvider {
    pub fn new(model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let model = model.strip_prefix("models/").unwrap_or(model).to_string();
        Ok(Self {
            client,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model,
            api_key,
            task_type: DEFAULT_GEMINI_TASK_TYPE.to_string(),
        })
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the task type sent with every request.
    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:batchEmbedContents", self.base_url, self.model)
    }

    fn request_body(&self, texts: &[String]) -> Value {
        let model = format!("models/{}", self.model);
        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                    "taskType": self.task_type,
                })
            })
            .collect();
        serde_json::json!({ "requests": requests })
    }
}

impl EmbeddingProvider for GeminiProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(texts))
            .send()
            .context("Embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("Embedding API returned {}: {}", status, body.trim());
        }

        let parsed: GeminiBatchResponse = response
            .json()
            .context("Failed to parse embedding API response")?;
        if parsed.embeddings.len() != texts.len() {
            bail!(
                "Embedding API returned {} embeddings for {} texts",
                parsed.embeddings.len(),
                texts.len()
            );
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and must
/// print a JSON array of vectors, or an object holding one under
/// `embeddings`, `vectors` or `data`. The command runs in its own process
/// group; if it outlives the timeout the whole group is killed.
pub struct CommandProvider {
    command: String,
    model: String,
    timeout: Duration,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set how long the command may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        })
        .to_string();

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let deadline = Instant::now() + self.timeout;
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        // Pipes are serviced on their own threads so a chatty or non-reading
        // command cannot block us past the deadline.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(payload.as_bytes()) {
                // The command may exit without reading its input.
                Err(err) if err.kind() != std::io::ErrorKind::BrokenPipe => Err(err),
                _ => Ok(()),
            })
        });
        let stdout = child.stdout.take().map(spawn_pipe_reader);
        let stderr = child.stderr.take().map(spawn_pipe_reader);

        let status = match wait_until(&mut child, deadline)? {
            Some(status) => status,
            None => {
                terminate_command(&mut child);
                bail!("Embedding command timed out after {:?}", self.timeout);
            }
        };

        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| anyhow!("stdin writer thread panicked"))?
                .context("Failed to write embeddings payload to stdin")?;
        }
        let stdout = join_pipe_reader(stdout)?;
        let stderr = join_pipe_reader(stderr)?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&stdout);
        parse_command_output(stdout.trim())
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe_reader(reader: Option<thread::JoinHandle<Vec<u8>>>) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("command output reader panicked")),
        None => Ok(Vec::new()),
    }
}

/// Polls the child until it exits or `deadline` passes.
fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child
            .try_wait()
            .context("Failed to wait for embedding command")?
        {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(COMMAND_POLL_INTERVAL.min(deadline - now));
    }
}

/// Kills the command's process group, then reaps the shell.
fn terminate_command(child: &mut Child) {
    #[cfg(unix)]
    {
        // process_group(0) made the shell's pid the group id.
        let pgid = child.id() as libc::pid_t;
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn parse_command_output(stdout: &str) -> Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(stdout)
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<Vec<Vec<f32>>>>()
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

/// Local fastembed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: Mutex<TextEmbedding>,
    model_id: String,
    max_chars: usize,
}

impl FastEmbedder {
    pub fn new(model: EmbeddingModel) -> Result<Self> {
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder: Mutex::new(embedder),
            model_id,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> Option<usize> {
        Some(FASTEMBED_DIMENSION)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.max_chars);
        let mut embeddings = self
            .embedder
            .lock()
            .map_err(|_| anyhow!("fastembed model lock poisoned"))?
            .embed(&prepared, Some(DEFAULT_FASTEMBED_BATCH_SIZE))?;

        for embedding in embeddings.iter_mut() {
            l2_normalize(embedding);
        }

        Ok(embeddings)
    }
}

/// Offline provider that hashes words into a fixed number of buckets.
///
/// Texts sharing words get similar vectors. Deterministic across runs and
/// platforms, which makes it suitable for tests and air-gapped setups.
pub struct HashingProvider {
    model: String,
    dimension: usize,
}

impl HashingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: format!("hashing-{}", dimension),
            dimension,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&bytes[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Dummy provider that returns zero vectors (for testing/fallback).
pub struct DummyProvider {
    model: String,
    dimension: usize,
}

impl DummyProvider {
    /// Creates a new dummy provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension,
        }
    }
}

impl EmbeddingProvider for DummyProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors: Vec<Vec<f32>> = texts.iter().map(|_| vec![0.0; self.dimension]).collect();

        Ok(vectors)
    }
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
