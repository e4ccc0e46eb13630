//! Shared fixtures: a scripted HTTP transport, an in-memory settings store,
//! and an engine wired to a temporary SQLite database.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

use wpe_backup::api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use wpe_backup::config::{ApiConfig, ScheduleConfig};
use wpe_backup::credentials::ApiCredentials;
use wpe_backup::engine::{BackupEngine, EngineDeps};
use wpe_backup::schedule::SqliteScheduler;
use wpe_backup::settings::{Environment, InstallTarget, Settings, SettingsStore};
use wpe_backup::store::Database;

pub const TEST_BASE_URL: &str = "https://api.test.invalid/v1";

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct Call {
    pub method: &'static str,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub body: Option<String>,
}

impl Call {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn json_body(&self) -> serde_json::Value {
        let body = self.body.as_deref().expect("call should carry a body");
        serde_json::from_str(body).expect("body should be JSON")
    }
}

/// What the scripted transport does for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Delayed(Duration, u16, String),
    Fail(String),
    Panic,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self::Status(status, body.to_owned())
    }
}

type Handler = dyn Fn(&Call) -> Reply + Send + Sync;

/// [`HttpTransport`] answering from a closure and recording every call.
pub struct ScriptedTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(handler: impl Fn(&Call) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(move |_| reply.clone())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn answer(&self, call: Call) -> Result<HttpResponse, TransportError> {
        let reply = (self.handler)(&call);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        match reply {
            Reply::Status(status, body) => Ok(HttpResponse { status, body }),
            Reply::Delayed(delay, status, body) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse { status, body })
            }
            Reply::Fail(message) => Err(TransportError::new(message)),
            Reply::Panic => panic!("scripted transport panicked"),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.answer(Call {
            method: "GET",
            url: request.url,
            headers: request.headers,
            timeout: request.timeout,
            body: None,
        })
        .await
    }

    async fn post(
        &self,
        request: HttpRequest,
        body: String,
    ) -> Result<HttpResponse, TransportError> {
        self.answer(Call {
            method: "POST",
            url: request.url,
            headers: request.headers,
            timeout: request.timeout,
            body: Some(body),
        })
        .await
    }
}

/// Settings held in memory, validated like the file store.
#[derive(Debug)]
pub struct MemorySettings {
    settings: AsyncMutex<Settings>,
}

impl MemorySettings {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            settings: AsyncMutex::new(settings),
        })
    }

    pub async fn snapshot(&self) -> Settings {
        self.settings.lock().await.clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self) -> anyhow::Result<Settings> {
        Ok(self.settings.lock().await.clone())
    }

    async fn put(&self, settings: &Settings) -> anyhow::Result<()> {
        settings.validate()?;
        *self.settings.lock().await = settings.clone();
        Ok(())
    }
}

/// Settings that satisfy every backup precondition.
pub fn ready_settings() -> Settings {
    Settings {
        credentials: ApiCredentials::new("apiuser", "apipass"),
        target: InstallTarget {
            install_id: "inst-123".to_owned(),
            install_name: "acmesite".to_owned(),
            environment: Environment::Production,
        },
        notification_email: "ops@example.com".to_owned(),
        ..Settings::default()
    }
}

pub fn api_config() -> ApiConfig {
    ApiConfig {
        base_url: TEST_BASE_URL.to_owned(),
        ..ApiConfig::default()
    }
}

/// Engine plus handles on everything behind it.
pub struct TestEnv {
    pub tmp: tempfile::TempDir,
    pub db: Database,
    pub settings: Arc<MemorySettings>,
    pub transport: Arc<ScriptedTransport>,
    pub engine: BackupEngine,
}

pub async fn open_db(tmp: &tempfile::TempDir) -> Database {
    Database::open(&tmp.path().join("backup.db"))
        .await
        .expect("database should open")
}

pub async fn env_with(
    settings: Settings,
    transport: Arc<ScriptedTransport>,
    schedule: ScheduleConfig,
) -> TestEnv {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let db = open_db(&tmp).await;
    let settings = MemorySettings::new(settings);

    let engine = BackupEngine::new(EngineDeps {
        settings: Arc::clone(&settings) as Arc<dyn SettingsStore>,
        logs: Arc::new(db.log_store()),
        leases: Arc::new(db.lease_store()),
        scheduler: Arc::new(SqliteScheduler::new(db.pool().clone())),
        transport: Arc::clone(&transport) as Arc<dyn HttpTransport>,
        api: api_config(),
        schedule,
        retention_keep: 100,
    });
    engine.register_intervals().await;

    TestEnv {
        tmp,
        db,
        settings,
        transport,
        engine,
    }
}

pub async fn env(settings: Settings, transport: Arc<ScriptedTransport>) -> TestEnv {
    env_with(settings, transport, ScheduleConfig::default()).await
}

/// `{ "results": [...], "count": total }` for installs `first..first+len`.
pub fn install_page(first: usize, len: usize, total: usize) -> String {
    let results: Vec<serde_json::Value> = (first..first.saturating_add(len))
        .map(|n| {
            serde_json::json!({
                "id": format!("id-{n}"),
                "name": format!("site{n}"),
                "environment": "production",
            })
        })
        .collect();
    serde_json::json!({ "results": results, "count": total }).to_string()
}
