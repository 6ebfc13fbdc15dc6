//! Filesystem watching with debounced auto-capture.
//!
//! Directories are registered individually (ignored subtrees pruned, new
//! directories registered as they appear) and relevant events arm a
//! debounce deadline. The loop owns callback execution, so callbacks are
//! serialized by construction; events arriving during a callback queue in
//! the channel and collapse into a single pending run.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;
use walkdir::WalkDir;

use crate::config;
use crate::error::{Error, Result};

/// Poll granularity for the shutdown flag while idle.
const IDLE_POLL: Duration = Duration::from_millis(200);

/// Deadline-based debouncer: every trigger pushes the deadline out by the
/// full window; the action fires once per quiet window.
#[derive(Debug)]
pub struct Debouncer {
    duration: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration, deadline: None }
    }

    /// Arm (or re-arm) the debounce window.
    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.duration);
    }

    /// Consume the deadline if it has expired.
    pub fn fire_if_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Time until the pending deadline, `None` when disarmed.
    #[must_use]
    pub fn time_until_due(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}

/// Watch a project directory and invoke `on_change` after each quiet
/// window of relevant events.
///
/// Ignored subtrees are never registered; directories created while
/// watching are registered recursively. Returns `Ok(())` when `stop` is
/// set, or the first error from the callback or the watcher itself.
///
/// # Errors
///
/// Returns an error if the watcher cannot be created, a directory cannot
/// be registered, or the callback fails.
pub fn watch<F>(
    project_dir: &Path,
    debounce: Duration,
    stop: &Arc<AtomicBool>,
    mut on_change: F,
) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;

    add_dirs_recursive(&mut watcher, project_dir, project_dir)?;

    let mut debouncer = Debouncer::new(debounce);
    loop {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        if debouncer.fire_if_due() {
            on_change()?;
            continue;
        }

        let timeout = debouncer
            .time_until_due()
            .map_or(IDLE_POLL, |until| until.min(IDLE_POLL));
        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                handle_event(&mut watcher, project_dir, &event, &mut debouncer);
            }
            Ok(Err(e)) => return Err(Error::Watch(e.to_string())),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
    }
}

fn handle_event(
    watcher: &mut RecommendedWatcher,
    project_dir: &Path,
    event: &Event,
    debouncer: &mut Debouncer,
) {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    if !relevant {
        return;
    }

    let mut triggered = false;
    for path in &event.paths {
        if is_ignored_path(project_dir, path) {
            continue;
        }
        if matches!(event.kind, EventKind::Create(_)) && path.is_dir() {
            // New directory: register its whole subtree.
            let _ = add_dirs_recursive(watcher, project_dir, path);
        }
        triggered = true;
    }
    if triggered {
        debug!(kind = ?event.kind, "change detected, arming debounce");
        debouncer.trigger();
    }
}

fn add_dirs_recursive(
    watcher: &mut RecommendedWatcher,
    project_dir: &Path,
    root: &Path,
) -> Result<()> {
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || !is_ignored_path(project_dir, e.path())
    });
    for entry in walker {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        watcher
            .watch(entry.path(), RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch(format!("watch add {}: {e}", entry.path().display())))?;
    }
    Ok(())
}

/// Whether any component of the path (relative to the project root) is an
/// ignored directory name.
fn is_ignored_path(project_dir: &Path, path: &Path) -> bool {
    let Ok(rel) = path.strip_prefix(project_dir) else {
        return false;
    };
    rel.components().any(|part| {
        config::is_ignored_dir(&part.as_os_str().to_string_lossy())
    })
}

/// Owned stop flag for embedding the watcher in a long-lived process.
#[must_use]
pub fn stop_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        cond()
    }

    #[test]
    fn test_debouncer_coalesces_triggers() {
        let mut debouncer = Debouncer::new(Duration::from_millis(80));
        assert!(!debouncer.fire_if_due());

        debouncer.trigger();
        debouncer.trigger();
        debouncer.trigger();
        assert!(!debouncer.fire_if_due());

        std::thread::sleep(Duration::from_millis(120));
        assert!(debouncer.fire_if_due());
        // Consumed: a second check stays quiet.
        assert!(!debouncer.fire_if_due());
    }

    #[test]
    fn test_retrigger_extends_deadline() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        debouncer.trigger();
        std::thread::sleep(Duration::from_millis(60));
        debouncer.trigger();
        std::thread::sleep(Duration::from_millis(60));
        // 120ms after the first trigger but only 60ms after the second.
        assert!(!debouncer.fire_if_due());
        std::thread::sleep(Duration::from_millis(60));
        assert!(debouncer.fire_if_due());
    }

    #[test]
    fn test_ignored_path_components() {
        let root = Path::new("/p");
        assert!(is_ignored_path(root, Path::new("/p/.git/HEAD")));
        assert!(is_ignored_path(root, Path::new("/p/sub/node_modules/x.js")));
        assert!(is_ignored_path(root, Path::new("/p/.converge/converge.db")));
        assert!(!is_ignored_path(root, Path::new("/p/src/main.rs")));
        assert!(!is_ignored_path(root, Path::new("/q/elsewhere")));
    }

    #[test]
    fn test_watch_fires_once_per_burst_and_stops() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(Mutex::new(0u32));
        let stop = stop_flag();

        let watch_dir = dir.path().to_path_buf();
        let calls_in_loop = Arc::clone(&calls);
        let stop_in_loop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            watch(
                &watch_dir,
                Duration::from_millis(150),
                &stop_in_loop,
                move || {
                    *calls_in_loop.lock().unwrap() += 1;
                    Ok(())
                },
            )
        });

        // Give the watcher time to register, then burst several writes
        // inside one debounce window.
        std::thread::sleep(Duration::from_millis(200));
        for i in 0..5 {
            fs::write(dir.path().join("f.txt"), format!("v{i}\n")).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(
            wait_for(|| *calls.lock().unwrap() == 1, Duration::from_secs(5)),
            "burst should produce exactly one callback"
        );
        // No further callbacks without further events.
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(*calls.lock().unwrap(), 1);

        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_watch_propagates_callback_error() {
        let dir = TempDir::new().unwrap();
        let stop = stop_flag();

        let watch_dir = dir.path().to_path_buf();
        let stop_in_loop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            watch(
                &watch_dir,
                Duration::from_millis(50),
                &stop_in_loop,
                || Err(Error::Other("callback failed".to_string())),
            )
        });

        std::thread::sleep(Duration::from_millis(200));
        fs::write(dir.path().join("g.txt"), "x\n").unwrap();

        let result = handle.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_ignores_state_dir_events() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".converge")).unwrap();
        let calls = Arc::new(Mutex::new(0u32));
        let stop = stop_flag();

        let watch_dir = dir.path().to_path_buf();
        let calls_in_loop = Arc::clone(&calls);
        let stop_in_loop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            watch(
                &watch_dir,
                Duration::from_millis(100),
                &stop_in_loop,
                move || {
                    *calls_in_loop.lock().unwrap() += 1;
                    Ok(())
                },
            )
        });

        std::thread::sleep(Duration::from_millis(200));
        fs::write(dir.path().join(".converge").join("scratch"), "x\n").unwrap();
        std::thread::sleep(Duration::from_millis(400));

        assert_eq!(*calls.lock().unwrap(), 0);
        stop.store(true, Ordering::Relaxed);
        handle.join().unwrap().unwrap();
    }
}
