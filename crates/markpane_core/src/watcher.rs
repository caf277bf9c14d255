//! File watching with debounced live reload.
//!
//! [`FileWatcher`] turns OS notifications (or mtime polling when those are
//! unavailable) into bare change signals. [`debounce_loop`] coalesces bursts of
//! signals, re-reads the file and emits a [`WatchEvent`] only when its bytes
//! actually changed. [`LiveReload`] owns at most one such session at a time.

use notify::{Event as NotifyEvent, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Invalid watch path: {}", .0.display())]
    InvalidPath(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Events emitted to the host by the live-reload loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file content changed, carrying the new content.
    Changed(String),
    /// The file is gone; the session has ended.
    Removed(PathBuf),
    /// The file could not be read this time; watching continues.
    ReadFailed(String),
}

/// Configuration for the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Quiet period after the last change signal before re-reading
    pub debounce_ms: u64,
    /// Polling interval in milliseconds for fallback polling mode
    pub poll_interval_ms: u64,
    /// Skip the OS watcher and poll right away
    pub force_polling: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            poll_interval_ms: 1000,
            force_polling: false,
        }
    }
}

impl WatcherConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

enum Backend {
    Native(RecommendedWatcher),
    Polling(JoinHandle<()>),
}

/// Emits a signal on every OS-level change of one file.
///
/// Dropping the watcher releases the OS watch or stops the polling task.
pub struct FileWatcher {
    path: PathBuf,
    backend: Backend,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.backend {
            Backend::Native(_) => "native",
            Backend::Polling(_) => "polling",
        };
        f.debug_struct("FileWatcher")
            .field("path", &self.path)
            .field("backend", &backend)
            .finish()
    }
}

impl FileWatcher {
    /// Start watching `path`, sending `()` on `signals` for every change.
    ///
    /// Must be called within a tokio runtime when polling may be needed.
    pub fn new(
        path: &Path,
        config: &WatcherConfig,
        signals: UnboundedSender<()>,
    ) -> Result<Self, WatchError> {
        let file_path = path.to_path_buf();
        if file_path.file_name().is_none() {
            return Err(WatchError::InvalidPath(file_path));
        }

        if !config.force_polling {
            match Self::try_native_watcher(&file_path, signals.clone()) {
                Ok(watcher) => {
                    tracing::info!(path = ?file_path, "Started native file watcher");
                    return Ok(Self {
                        path: file_path,
                        backend: Backend::Native(watcher),
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        path = ?file_path,
                        "Native file watcher failed, falling back to polling"
                    );
                }
            }
        }

        let task = Self::spawn_polling_watcher(file_path.clone(), config.poll_interval(), signals);
        Ok(Self {
            path: file_path,
            backend: Backend::Polling(task),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_polling(&self) -> bool {
        matches!(self.backend, Backend::Polling(_))
    }

    fn try_native_watcher(
        file_path: &Path,
        signals: UnboundedSender<()>,
    ) -> Result<RecommendedWatcher, Box<dyn std::error::Error + Send + Sync>> {
        // Watch the parent directory, editors often replace the file itself.
        let (watch_target, file_name) = match (file_path.parent(), file_path.file_name()) {
            (Some(parent), Some(name)) => {
                let parent = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
                (parent.to_path_buf(), name.to_os_string())
            }
            _ => return Err(WatchError::InvalidPath(file_path.to_path_buf()).into()),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    let is_target_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(&file_name));

                    if is_target_file
                        && (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove())
                    {
                        let _ = signals.send(());
                    }
                }
                Err(e) => {
                    tracing::error!(?e, "File watcher error");
                }
            },
            notify::Config::default(),
        )?;

        watcher.watch(&watch_target, RecursiveMode::NonRecursive)?;

        Ok(watcher)
    }

    fn spawn_polling_watcher(
        file_path: PathBuf,
        poll_interval: Duration,
        signals: UnboundedSender<()>,
    ) -> JoinHandle<()> {
        fn stamp(path: &Path) -> Option<(SystemTime, u64)> {
            let metadata = std::fs::metadata(path).ok()?;
            Some((metadata.modified().ok()?, metadata.len()))
        }

        tokio::spawn(async move {
            let mut last_stamp = stamp(&file_path);

            tracing::info!(
                path = ?file_path,
                poll_interval_ms = poll_interval.as_millis() as u64,
                "Started polling-based file watcher"
            );

            loop {
                tokio::time::sleep(poll_interval).await;

                let current = stamp(&file_path);
                if current != last_stamp {
                    last_stamp = current;
                    if signals.send(()).is_err() {
                        break;
                    }
                }
            }
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Backend::Polling(task) = &self.backend {
            task.abort();
        }
    }
}

/// Coalesce change signals and emit content changes.
///
/// Every signal restarts the `debounce` timer. Once it elapses the file is
/// re-read; [`WatchEvent::Changed`] is sent only if the bytes differ from
/// `last_known`. A missing file ends the loop after exactly one
/// [`WatchEvent::Removed`].
pub async fn debounce_loop(
    path: PathBuf,
    mut last_known: Option<Vec<u8>>,
    debounce: Duration,
    mut signals: UnboundedReceiver<()>,
    events: UnboundedSender<WatchEvent>,
) {
    while signals.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, signals.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_elapsed) => break,
            }
        }

        let event = match std::fs::read(&path) {
            Ok(bytes) => {
                if last_known.as_deref() == Some(bytes.as_slice()) {
                    tracing::trace!(path = ?path, "Content unchanged, skipping reload");
                    continue;
                }
                last_known = Some(bytes.clone());
                match String::from_utf8(bytes) {
                    Ok(content) => WatchEvent::Changed(content),
                    Err(err) => {
                        tracing::warn!(?err, path = ?path, "Watched file is not valid UTF-8");
                        WatchEvent::ReadFailed(format!("{} is not valid UTF-8", path.display()))
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = ?path, "Watched file removed");
                let _ = events.send(WatchEvent::Removed(path));
                return;
            }
            Err(err) => {
                tracing::warn!(?err, path = ?path, "Failed to read watched file");
                WatchEvent::ReadFailed(format!("Failed to read {}: {err}", path.display()))
            }
        };

        if events.send(event).is_err() {
            return;
        }
    }
}

struct WatchSession {
    path: PathBuf,
    _watcher: FileWatcher,
    task: JoinHandle<()>,
    events: UnboundedReceiver<WatchEvent>,
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Owner of the live-reload session of one window.
///
/// At most one file is watched at a time; starting a new session tears the
/// previous one down first, so no signal of the old file can reach the new
/// session.
#[derive(Default)]
pub struct LiveReload {
    config: WatcherConfig,
    session: Option<WatchSession>,
}

impl std::fmt::Debug for LiveReload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReload")
            .field("config", &self.config)
            .field("watching", &self.watched_path())
            .finish()
    }
}

impl LiveReload {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn watched_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|session| session.path.as_path())
    }

    pub fn is_watching(&self) -> bool {
        self.session.is_some()
    }

    /// Start watching `path`. Watching the same path again is a no-op.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_watching(&mut self, path: impl Into<PathBuf>) -> Result<(), WatchError> {
        self.start_session(path.into(), None)
    }

    /// Like [`Self::start_watching`], for a file whose content was already
    /// rendered as `loaded`.
    ///
    /// If the file no longer matches `loaded`, a [`WatchEvent::Changed`]
    /// follows right away, so an edit landing between the load and the start
    /// of the watch is not lost.
    pub fn start_watching_from(
        &mut self,
        path: impl Into<PathBuf>,
        loaded: impl Into<Vec<u8>>,
    ) -> Result<(), WatchError> {
        self.start_session(path.into(), Some(loaded.into()))
    }

    fn start_session(&mut self, path: PathBuf, loaded: Option<Vec<u8>>) -> Result<(), WatchError> {
        if self.watched_path() == Some(path.as_path()) {
            return Ok(());
        }

        self.stop_watching();

        let current = std::fs::read(&path).map_err(|source| WatchError::Read {
            path: path.clone(),
            source,
        })?;
        let stale = loaded.as_ref().is_some_and(|loaded| *loaded != current);

        let (signal_tx, signal_rx) = unbounded_channel();
        let (event_tx, event_rx) = unbounded_channel();
        let watcher = FileWatcher::new(&path, &self.config, signal_tx.clone())?;
        if stale {
            tracing::debug!(path = ?path, "File changed since it was loaded");
            let _ = signal_tx.send(());
        }
        let task = tokio::spawn(debounce_loop(
            path.clone(),
            Some(loaded.unwrap_or(current)),
            self.config.debounce(),
            signal_rx,
            event_tx,
        ));

        tracing::debug!(path = ?path, "Live reload session started");

        self.session.replace(WatchSession {
            path,
            _watcher: watcher,
            task,
            events: event_rx,
        });

        Ok(())
    }

    /// Release the OS watch and cancel any pending debounce. Idempotent.
    pub fn stop_watching(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!(path = ?session.path, "Live reload session stopped");
        }
    }

    /// Next event of the current session.
    ///
    /// Returns `None` when nothing is watched. A [`WatchEvent::Removed`] ends
    /// the session before it is returned.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        let session = self.session.as_mut()?;
        let event = session.events.recv().await;
        match event {
            Some(WatchEvent::Removed(_)) | None => self.stop_watching(),
            _ => {}
        }
        event
    }
}
