//! Process-wide training lock
//!
//! A single marker file (`training.lock`) holds the JSON [`LockToken`] of the
//! run that owns training. Creation uses `create_new`, so of two racing
//! acquirers exactly one wins. A token whose owner is gone (dead pid on this
//! host, or a heartbeat older than the staleness window) is reclaimable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tierwatch_common::time::age_of;

use crate::error::PipelineError;

/// Contents of the lock marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockToken {
    pub owner_id: Uuid,
    pub pid: u32,
    pub hostname: String,
    pub created_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl LockToken {
    fn for_current_process() -> Self {
        let now = Utc::now();
        Self {
            owner_id: Uuid::new_v4(),
            pid: std::process::id(),
            hostname: local_hostname(),
            created_at: now,
            heartbeat_at: now,
        }
    }
}

/// What is currently on disk at the lock path
#[derive(Debug, Clone, PartialEq)]
pub enum LockState {
    Free,
    Held(LockToken),
    Stale(String),
}

/// Lock marker location plus staleness policy
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    stale_after: Duration,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token currently on disk, if it parses
    pub fn read(&self) -> Result<Option<LockToken>, PipelineError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(lock_err("read", &self.path, e)),
        }
    }

    /// Classify the marker as free, live or stale
    pub fn inspect(&self) -> Result<LockState, PipelineError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LockState::Free),
            Err(e) => return Err(lock_err("read", &self.path, e)),
        };

        match serde_json::from_slice::<LockToken>(&bytes) {
            Ok(token) => Ok(match self.staleness(&token) {
                Some(reason) => LockState::Stale(reason),
                None => LockState::Held(token),
            }),
            Err(_) => {
                // A marker mid-write looks malformed for a moment; only an old one is debris
                let modified = fs::metadata(&self.path)
                    .and_then(|m| m.modified())
                    .map_err(|e| lock_err("stat", &self.path, e))?;
                let age = modified.elapsed().unwrap_or(Duration::ZERO);
                if age > self.stale_after {
                    Ok(LockState::Stale("unreadable marker".to_string()))
                } else {
                    Ok(LockState::Held(LockToken {
                        owner_id: Uuid::nil(),
                        pid: 0,
                        hostname: String::new(),
                        created_at: DateTime::<Utc>::from(modified),
                        heartbeat_at: DateTime::<Utc>::from(modified),
                    }))
                }
            }
        }
    }

    fn staleness(&self, token: &LockToken) -> Option<String> {
        let age = age_of(token.heartbeat_at);
        if age > self.stale_after {
            return Some(format!("heartbeat {}s old", age.as_secs()));
        }
        if token.hostname == local_hostname() && !pid_alive(token.pid) {
            return Some(format!("owner pid {} is not running", token.pid));
        }
        None
    }

    /// Remove the marker if it is stale; returns whether anything was removed
    pub fn recover_stale(&self) -> Result<bool, PipelineError> {
        match self.inspect()? {
            LockState::Stale(reason) => self.remove_marker(&reason),
            LockState::Free | LockState::Held(_) => Ok(false),
        }
    }

    /// Startup variant of [`recover_stale`](Self::recover_stale)
    ///
    /// Before this process has acquired anything, a marker naming our own pid
    /// on this host was left by an earlier process that had the same pid
    /// (typical for a containerized service running as pid 1).
    pub fn recover_orphaned(&self) -> Result<bool, PipelineError> {
        match self.inspect()? {
            LockState::Stale(reason) => self.remove_marker(&reason),
            LockState::Held(token)
                if token.pid == std::process::id() && token.hostname == local_hostname() =>
            {
                self.remove_marker(&format!("owner pid {} is this process", token.pid))
            }
            LockState::Free | LockState::Held(_) => Ok(false),
        }
    }

    fn remove_marker(&self, reason: &str) -> Result<bool, PipelineError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(lock_err("remove", &self.path, e)),
        }
        warn!(path = %self.path.display(), reason, "Removed stale training lock");
        Ok(true)
    }

    /// Try to take the lock; `Ok(None)` means a live owner holds it
    pub fn try_acquire(&self) -> Result<Option<LockGuard>, PipelineError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| lock_err("create_dir", parent, e))?;
        }

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(mut file) => {
                    let token = LockToken::for_current_process();
                    let payload = serde_json::to_vec(&token)
                        .map_err(|e| PipelineError::Lock(e.to_string()))?;
                    let written = file
                        .write_all(&payload)
                        .and_then(|()| file.sync_all());
                    if let Err(e) = written {
                        let _ = fs::remove_file(&self.path);
                        return Err(lock_err("write", &self.path, e));
                    }

                    debug!(path = %self.path.display(), owner_id = %token.owner_id, "Acquired training lock");
                    return Ok(Some(LockGuard {
                        path: self.path.clone(),
                        token,
                        heartbeat: None,
                        retired: Arc::new(Mutex::new(false)),
                    }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if !self.recover_stale()? {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(lock_err("create", &self.path, e)),
            }
        }

        Ok(None)
    }
}

/// Scoped ownership of the training lock
///
/// Dropping the guard removes the marker (if this guard still owns it) and
/// stops the heartbeat, on success and failure paths alike.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: LockToken,
    heartbeat: Option<JoinHandle<()>>,
    /// Set once the marker has been removed; an in-flight refresh checks it
    /// under the same mutex so it cannot resurrect a released marker.
    retired: Arc<Mutex<bool>>,
}

impl LockGuard {
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Refresh `heartbeat_at` every `interval` until the guard is dropped
    pub fn start_heartbeat(&mut self, interval: Duration) {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }

        let path = self.path.clone();
        let token = self.token.clone();
        let retired = Arc::clone(&self.retired);
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let path = path.clone();
                let token = token.clone();
                let retired = Arc::clone(&retired);
                let refreshed = tokio::task::spawn_blocking(move || {
                    let retired = retired.lock().unwrap_or_else(|p| p.into_inner());
                    if *retired {
                        return Ok(false);
                    }
                    refresh_heartbeat(&path, &token)
                })
                .await;
                match refreshed {
                    Ok(Ok(true)) => {}
                    Ok(Ok(false)) => {
                        warn!("Training lock no longer owned by this run, stopping heartbeat");
                        break;
                    }
                    Ok(Err(e)) => warn!(error = %e, "Lock heartbeat failed"),
                    Err(e) => warn!(error = %e, "Lock heartbeat task failed"),
                }
            }
        }));
    }

    /// Release explicitly, reporting I/O errors
    pub fn release(mut self) -> Result<(), PipelineError> {
        self.retire()
    }

    fn retire(&mut self) -> Result<(), PipelineError> {
        if let Some(handle) = self.heartbeat.take() {
            handle.abort();
        }
        let mut retired = self.retired.lock().unwrap_or_else(|p| p.into_inner());
        if *retired {
            return Ok(());
        }
        *retired = true;
        remove_if_owner(&self.path, &self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.retire() {
            warn!(error = %e, "Failed to remove training lock on drop");
        }
    }
}

fn owned_by(path: &Path, token: &LockToken) -> Result<bool, PipelineError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice::<LockToken>(&bytes)
            .map(|on_disk| on_disk.owner_id == token.owner_id)
            .unwrap_or(false)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(lock_err("read", path, e)),
    }
}

fn remove_if_owner(path: &Path, token: &LockToken) -> Result<(), PipelineError> {
    if !owned_by(path, token)? {
        return Ok(());
    }
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), owner_id = %token.owner_id, "Released training lock");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(lock_err("remove", path, e)),
    }
}

/// Rewrite the marker with a fresh heartbeat (temp file + rename)
fn refresh_heartbeat(path: &Path, token: &LockToken) -> Result<bool, PipelineError> {
    if !owned_by(path, token)? {
        return Ok(false);
    }

    let refreshed = LockToken {
        heartbeat_at: Utc::now(),
        ..token.clone()
    };
    let payload =
        serde_json::to_vec(&refreshed).map_err(|e| PipelineError::Lock(e.to_string()))?;

    let temp_path = path.with_extension(format!("lock.{}.tmp", token.owner_id));
    let mut file = File::create(&temp_path).map_err(|e| lock_err("write_temp", &temp_path, e))?;
    file.write_all(&payload)
        .and_then(|()| file.sync_all())
        .map_err(|e| lock_err("write_temp", &temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| lock_err("rename", path, e))?;

    debug!(owner_id = %token.owner_id, "Refreshed lock heartbeat");
    Ok(true)
}

fn lock_err(step: &str, path: &Path, e: std::io::Error) -> PipelineError {
    PipelineError::Lock(format!("{step} {}: {e}", path.display()))
}

/// Hostname used to decide whether a pid check is meaningful
pub fn local_hostname() -> String {
    fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(target_os = "linux")]
fn pid_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_alive(_pid: u32) -> bool {
    // No cheap liveness probe; rely on the heartbeat window
    true
}
