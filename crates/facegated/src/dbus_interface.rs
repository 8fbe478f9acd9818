use crate::admin::{AdminError, AdminGate};
use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use chrono::Utc;
use facegate_store::{Profile, Registration, StoreError};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use zbus::fdo;
use zbus::interface;

pub const BUS_NAME: &str = "org.facegate.Gate1";
pub const OBJECT_PATH: &str = "/org/facegate/Gate1";

/// Upper bound on log entries returned by one `AccessLogs` call.
const MAX_LOG_PAGE: u32 = 1000;

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
///
/// `Authenticate` is open to everyone. Every other mutating or listing
/// method takes an admin session token obtained from `Login`.
pub struct GateService {
    engine: EngineHandle,
    admin: Mutex<AdminGate>,
    config: Config,
}

impl GateService {
    pub fn new(engine: EngineHandle, admin: AdminGate, config: Config) -> Self {
        Self {
            engine,
            admin: Mutex::new(admin),
            config,
        }
    }

    async fn require_admin(&self, token: &str) -> fdo::Result<()> {
        self.admin
            .lock()
            .await
            .require(token, Utc::now())
            .map_err(admin_error)
    }
}

fn admin_error(e: AdminError) -> fdo::Error {
    match e {
        AdminError::InvalidPin | AdminError::NotAuthenticated => fdo::Error::AccessDenied(e.to_string()),
        AdminError::WeakPin => fdo::Error::InvalidArgs(e.to_string()),
        AdminError::Hash(_) => fdo::Error::Failed(e.to_string()),
    }
}

/// Run bcrypt work on the blocking pool so it never stalls the executor.
async fn off_executor<T, F>(work: F) -> fdo::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AdminError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| fdo::Error::Failed(format!("PIN worker failed: {e}")))?
        .map_err(admin_error)
}

fn engine_error(e: EngineError) -> fdo::Error {
    match e {
        EngineError::Store(StoreError::Registration(r)) => fdo::Error::InvalidArgs(r.to_string()),
        other => fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("encoding reply: {e}")))
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Match a captured image against the registered identities.
    /// Returns the access decision as JSON.
    async fn authenticate(&self, image_path: &str) -> fdo::Result<String> {
        tracing::info!(image = image_path, "authenticate requested");
        let decision = self
            .engine
            .authenticate(PathBuf::from(image_path))
            .await
            .map_err(engine_error)?;
        to_json(&decision)
    }

    /// Open an admin session. Returns the session token.
    async fn login(&self, pin: &str) -> fdo::Result<String> {
        let check = self.admin.lock().await.pin_check();
        let pin = pin.to_string();
        let verified = off_executor(move || check.verify(&pin)).await?;
        self.admin
            .lock()
            .await
            .open_session(verified, Utc::now())
            .map_err(admin_error)
    }

    async fn logout(&self, token: &str) -> fdo::Result<bool> {
        Ok(self.admin.lock().await.logout(token))
    }

    /// Whether the token belongs to a live session.
    async fn session_active(&self, token: &str) -> fdo::Result<bool> {
        Ok(self.admin.lock().await.is_authenticated(token, Utc::now()))
    }

    async fn change_pin(&self, token: &str, old_pin: &str, new_pin: &str) -> fdo::Result<()> {
        let check = {
            let mut admin = self.admin.lock().await;
            admin.require(token, Utc::now()).map_err(admin_error)?;
            admin.pin_check()
        };
        let (old_pin, new_pin) = (old_pin.to_string(), new_pin.to_string());
        let (verified, replacement) =
            off_executor(move || Ok((check.verify(&old_pin)?, check.hash_new(&new_pin)?))).await?;
        self.admin
            .lock()
            .await
            .commit_pin(token, verified, replacement, Utc::now())
            .map_err(admin_error)
    }

    /// Register a new identity from reference photos. Returns JSON.
    async fn register(
        &self,
        token: &str,
        name: &str,
        employee_id: &str,
        department: &str,
        notes: &str,
        photos: Vec<String>,
    ) -> fdo::Result<String> {
        self.require_admin(token).await?;
        tracing::info!(name, photos = photos.len(), "register requested");
        let request = Registration {
            name: name.to_string(),
            profile: Profile {
                employee_id: employee_id.to_string(),
                department: department.to_string(),
                notes: notes.to_string(),
            },
            photos: photos.into_iter().map(PathBuf::from).collect(),
        };
        let registered = self.engine.register(request).await.map_err(engine_error)?;
        to_json(&registered)
    }

    async fn delete_user(&self, token: &str, name: &str) -> fdo::Result<bool> {
        self.require_admin(token).await?;
        tracing::info!(name, "delete requested");
        self.engine
            .delete(name.to_string())
            .await
            .map_err(engine_error)
    }

    /// List registered identities, optionally filtered. Returns JSON.
    async fn list_users(&self, token: &str, search: &str) -> fdo::Result<String> {
        self.require_admin(token).await?;
        let search = Some(search.to_string()).filter(|s| !s.is_empty());
        let users = self.engine.users(search).await.map_err(engine_error)?;
        to_json(&users)
    }

    /// Most recent access-log entries, newest first. Returns JSON.
    async fn access_logs(&self, token: &str, limit: u32) -> fdo::Result<String> {
        self.require_admin(token).await?;
        let logs = self
            .engine
            .logs(limit.min(MAX_LOG_PAGE) as usize)
            .await
            .map_err(engine_error)?;
        to_json(&logs)
    }

    async fn statistics(&self, token: &str) -> fdo::Result<String> {
        self.require_admin(token).await?;
        let stats = self.engine.statistics().await.map_err(engine_error)?;
        to_json(&stats)
    }

    /// Re-embed every reference photo. Returns the number of matchable
    /// identities.
    async fn rebuild(&self, token: &str) -> fdo::Result<u32> {
        self.require_admin(token).await?;
        let count = self.engine.rebuild().await.map_err(engine_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// One-to-one comparison of two images. Returns JSON.
    async fn compare(&self, token: &str, image_a: &str, image_b: &str) -> fdo::Result<String> {
        self.require_admin(token).await?;
        let result = self
            .engine
            .compare(PathBuf::from(image_a), PathBuf::from(image_b))
            .await
            .map_err(engine_error)?;
        to_json(&result)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let stats = self.engine.statistics().await.map_err(engine_error)?;
        let cfg = &self.config;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "model": cfg.analyzer.model_name,
            "detector": cfg.analyzer.detector_backend,
            "metric": cfg.recognition.metric,
            "threshold": cfg.recognition.threshold,
            "verification_threshold": cfg.recognition.verification_threshold,
            "suspicion": cfg.suspicion,
            "registration": cfg.registration,
            "session_timeout_minutes": cfg.admin.session_timeout_minutes,
            "statistics": stats,
        })
        .to_string())
    }
}
