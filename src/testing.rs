// Scripted collaborators shared by unit tests

use crate::analysis::{AnalysisService, TransportError};
use crate::storage::{UploadError, UploadFile, UploadGateway, UploadProgress};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub enum Script {
    Respond(Value),
    Fail(TransportError),
    Delay(Duration, Value),
    /// Answer `{"text": <question>}` after the given delay
    EchoAfter(Duration),
    /// Wait for the notify before answering
    Hold(Arc<Notify>, Value),
    Panic,
}

/// Analysis service that follows a script, then echoes questions back.
/// Tracks how many calls are in flight at once.
pub struct ScriptedService {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<(String, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, step: Script, question: &str) -> Result<Value, TransportError> {
        match step {
            Script::Respond(value) => Ok(value),
            Script::Fail(err) => Err(err),
            Script::Delay(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Script::EchoAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(json!({ "text": question }))
            }
            Script::Hold(gate, value) => {
                gate.notified().await;
                Ok(value)
            }
            Script::Panic => panic!("scripted panic"),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn analyze(&self, storage_key: &str, question: &str) -> Result<Value, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.calls
            .lock()
            .unwrap()
            .push((storage_key.to_string(), question.to_string()));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::EchoAfter(Duration::ZERO));

        self.run(step, question).await
    }
}

/// Upload gateway that replays fixed progress ticks, then answers with
/// `<prefix><file name>` or the scripted error.
pub struct ScriptedGateway {
    ticks: Vec<(u64, u64)>,
    outcome: Result<String, UploadError>,
    release: Option<Arc<Notify>>,
    uploads: AtomicUsize,
}

impl ScriptedGateway {
    pub fn succeeding(prefix: &str) -> Self {
        Self {
            ticks: Vec::new(),
            outcome: Ok(prefix.to_string()),
            release: None,
            uploads: AtomicUsize::new(0),
        }
    }

    pub fn failing(err: UploadError) -> Self {
        Self {
            outcome: Err(err),
            ..Self::succeeding("")
        }
    }

    pub fn with_ticks(mut self, ticks: Vec<(u64, u64)>) -> Self {
        self.ticks = ticks;
        self
    }

    pub fn held_by(mut self, gate: Arc<Notify>) -> Self {
        self.release = Some(gate);
        self
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UploadGateway for ScriptedGateway {
    async fn upload(
        &self,
        file: UploadFile,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<String, UploadError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        for (loaded, total) in &self.ticks {
            if let Some(tick) = UploadProgress::new(*loaded, *total) {
                on_progress(tick);
            }
        }
        if let Some(gate) = &self.release {
            gate.notified().await;
        }
        self.outcome
            .clone()
            .map(|prefix| format!("{}{}", prefix, file.name))
    }
}

pub fn csv_file(name: &str) -> UploadFile {
    UploadFile::new(name, None, bytes::Bytes::from_static(b"name,sales\nA,100\n"))
        .expect("csv file name")
}

pub fn test_config() -> crate::config::Config {
    use crate::config::{AnalysisConfig, Config, QueueConfig, ServerConfig, StorageConfig};

    Config {
        server: ServerConfig {
            port: 3000,
            host: "127.0.0.1".into(),
            cors_allowed_origins: vec!["http://localhost:5173".into()],
        },
        analysis: AnalysisConfig {
            url: "http://analysis.test/analyze".into(),
            timeout_secs: 5,
        },
        storage: StorageConfig {
            s3_bucket: "datasets".into(),
            s3_region: "ap-northeast-1".into(),
            s3_endpoint: None,
            key_prefix: "analytics".into(),
            s3_access_key_id: None,
            s3_secret_access_key: None,
        },
        queue: QueueConfig { capacity: 16 },
    }
}

/// App state backed by scripted collaborators. Must be called inside a runtime.
pub fn test_state(
    script: Vec<Script>,
    gateway: impl Into<Arc<ScriptedGateway>>,
) -> crate::models::AppState {
    let service = Arc::new(ScriptedService::new(script));
    let gateway: Arc<ScriptedGateway> = gateway.into();
    let chat = crate::queue::ChatHandle::spawn(
        crate::analysis::AnalysisInvoker::new(service),
        gateway,
        16,
    );
    crate::models::AppState {
        config: test_config(),
        chat,
    }
}
