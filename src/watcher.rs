//! Watching the script file and triggering reloads.
//!
//! The parent directory is watched rather than the file itself so editors
//! that save by writing a temp file and renaming it over the watched file keep
//! triggering reloads. Events for other files in that directory are dropped.
//!
//! A dedicated thread blocks on the event channel and calls the reload
//! callback synchronously; the frame loop never touches the filesystem.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;

/// Watcher tuning.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period used to fold a burst of write events into one reload.
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
        }
    }
}

/// Handle to a running watcher. Dropping it stops the watcher.
pub struct ReloadWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReloadWatcher {
    /// Start watching `path`.
    ///
    /// `on_reload` runs once on the calling thread before this returns, then
    /// on the watcher thread after every qualifying write.
    pub fn start<F>(path: &Path, config: WatchConfig, mut on_reload: F) -> Result<Self, WatchError>
    where
        F: FnMut(&Path) + Send + 'static,
    {
        let path = path.canonicalize().map_err(|source| WatchError::MissingFile {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| WatchError::MissingFile {
                path: path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file"),
            })?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        log::info!("Watching {}", path.display());

        // Eager reload so the grid reflects the script before any edit
        on_reload(&path);

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let loop_path = path.clone();
        let thread = std::thread::Builder::new()
            .name("replicube-reload".into())
            .spawn(move || {
                watch_loop(&loop_path, &file_name, &event_rx, &stop_rx, &config, &mut on_reload);
                log::debug!("Watcher loop for {} finished", loop_path.display());
            })
            .map_err(WatchError::Spawn)?;

        Ok(Self {
            path,
            watcher: Some(watcher),
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Canonical path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop observing and wait for the background thread to exit.
    /// A reload already in progress runs to completion first.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        // Dropping the OS watcher releases the watch and disconnects the event channel
        self.watcher = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Watcher thread for {} panicked", self.path.display());
            }
            log::info!("Stopped watching {}", self.path.display());
        }
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Write-class events. Creation and rename-into-place count because that is
/// how atomic saves show up.
pub fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    )
}

/// Returns the path of the watched file if `event` is a write to it.
fn write_target<'a>(event: &'a Event, file_name: &OsString) -> Option<&'a Path> {
    if !is_write_event(&event.kind) {
        return None;
    }
    event
        .paths
        .iter()
        .find(|p| p.file_name() == Some(file_name.as_os_str()))
        .map(PathBuf::as_path)
}

fn watch_loop<F>(
    path: &Path,
    file_name: &OsString,
    events: &Receiver<notify::Result<Event>>,
    stop: &Receiver<()>,
    config: &WatchConfig,
    on_reload: &mut F,
) where
    F: FnMut(&Path),
{
    loop {
        let received = select! {
            recv(stop) -> _ => return,
            recv(events) -> msg => msg,
        };

        // Channel closed: the OS watcher is gone, treat as shutdown
        let Ok(result) = received else {
            return;
        };

        let event = match result {
            Ok(event) => event,
            Err(e) => {
                log::warn!("Watch error on {}: {}", path.display(), e);
                continue;
            }
        };

        let Some(mut target) = write_target(&event, file_name).map(Path::to_path_buf) else {
            continue;
        };

        // Fold the rest of the burst (truncate + write, temp + rename) into one
        // reload. Only writes to the script push the quiet deadline back.
        let mut quiet_until = Instant::now() + config.debounce;
        loop {
            let wait = quiet_until.saturating_duration_since(Instant::now());
            select! {
                recv(stop) -> _ => return,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        if let Some(next) = write_target(&event, file_name) {
                            target = next.to_path_buf();
                            quiet_until = Instant::now() + config.debounce;
                        }
                    }
                    Ok(Err(e)) => log::warn!("Watch error on {}: {}", path.display(), e),
                    Err(_) => {
                        log::debug!("Event channel closed with a pending write on {}", target.display());
                        on_reload(&target);
                        return;
                    }
                },
                default(wait) => break,
            }
        }

        log::debug!("Write detected on {}", target.display());
        on_reload(&target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn test_write_event_classes() {
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_write_event(&EventKind::Create(CreateKind::File)));
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));

        assert!(!is_write_event(&EventKind::Access(AccessKind::Any)));
        assert!(!is_write_event(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_write_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
        assert!(!is_write_event(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
    }

    #[test]
    fn test_write_target_filters_by_file_name() {
        let name = OsString::from("cube.rhai");
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/tmp/scripts/other.rhai"));
        assert!(write_target(&event, &name).is_none());

        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(PathBuf::from("/tmp/scripts/cube.rhai"));
        assert_eq!(
            write_target(&event, &name),
            Some(Path::new("/tmp/scripts/cube.rhai"))
        );

        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/tmp/scripts/cube.rhai"));
        assert!(write_target(&event, &name).is_none());
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReloadWatcher::start(
            &dir.path().join("nope.rhai"),
            WatchConfig::default(),
            |_| {},
        );
        assert!(matches!(result, Err(WatchError::MissingFile { .. })));
    }

    #[test]
    fn test_loop_ends_when_channel_closes() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        drop(event_tx);

        let mut calls = 0;
        watch_loop(
            Path::new("/tmp/cube.rhai"),
            &OsString::from("cube.rhai"),
            &event_rx,
            &stop_rx,
            &WatchConfig::default(),
            &mut |_: &Path| calls += 1,
        );
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_burst_coalesces_into_one_reload() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        for _ in 0..5 {
            let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(PathBuf::from("/tmp/cube.rhai"));
            event_tx.send(Ok(event)).unwrap();
        }
        event_tx
            .send(Err(notify::Error::generic("transient")))
            .unwrap();

        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            drop(event_tx);
        });

        let mut calls = 0;
        watch_loop(
            Path::new("/tmp/cube.rhai"),
            &OsString::from("cube.rhai"),
            &event_rx,
            &stop_rx,
            &WatchConfig {
                debounce: Duration::from_millis(20),
            },
            &mut |_: &Path| calls += 1,
        );
        sender.join().unwrap();
        assert_eq!(calls, 1);
    }

    fn script_write() -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/tmp/cube.rhai")))
    }

    #[test]
    fn test_other_files_do_not_hold_back_reload() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        // One script write, then a steady stream of snapshot writes next to it
        event_tx.send(script_write()).unwrap();
        let sender = std::thread::spawn(move || {
            for _ in 0..60 {
                let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                    .add_path(PathBuf::from("/tmp/frame.json"));
                event_tx.send(Ok(event)).unwrap();
                std::thread::sleep(Duration::from_millis(10));
            }
        });

        let started = Instant::now();
        let mut fired = Vec::new();
        watch_loop(
            Path::new("/tmp/cube.rhai"),
            &OsString::from("cube.rhai"),
            &event_rx,
            &stop_rx,
            &WatchConfig {
                debounce: Duration::from_millis(50),
            },
            &mut |_: &Path| fired.push(started.elapsed()),
        );
        sender.join().unwrap();

        assert_eq!(fired.len(), 1);
        assert!(fired[0] < Duration::from_millis(400), "reload waited {:?}", fired[0]);
    }

    #[test]
    fn test_pending_write_survives_channel_close() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        event_tx.send(script_write()).unwrap();
        drop(event_tx);

        let mut calls = 0;
        watch_loop(
            Path::new("/tmp/cube.rhai"),
            &OsString::from("cube.rhai"),
            &event_rx,
            &stop_rx,
            &WatchConfig {
                debounce: Duration::from_millis(50),
            },
            &mut |_: &Path| calls += 1,
        );
        assert_eq!(calls, 1);
    }
}
