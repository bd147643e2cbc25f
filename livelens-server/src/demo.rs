//! Demo application: a small menu driving a content area
//!
//! Used by the `livelens` binary and by the end-to-end tests.

use livelens_core::{download, render, Action, Enumerated, Record, RenderTarget, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Title {
    Mr,
    Mrs,
}

livelens_core::enumerated!(Title { Mr, Mrs });

const TICK: Duration = Duration::from_millis(100);

/// Percentage shared by every progress view, advanced by one background thread
fn fake_progress() -> &'static Arc<AtomicU32> {
    static PROGRESS: OnceLock<Arc<AtomicU32>> = OnceLock::new();
    PROGRESS.get_or_init(|| {
        let percent = Arc::new(AtomicU32::new(0));
        let ticker = percent.clone();
        thread::spawn(move || loop {
            let next = (ticker.load(Ordering::Relaxed) + 1) % 100;
            ticker.store(next, Ordering::Relaxed);
            thread::sleep(TICK);
        });
        percent
    })
}

pub fn progress_record(percent: u32) -> Record {
    Record::new("Progress")
        .field("speed", "10kb/s")
        .field("max", "10MB")
        .field("percent", percent)
}

/// Populate the active tree with the demo menu
pub fn client_menu() {
    render("Hello World");

    let menu = render("Loading Menu...");
    let content = render("Click on a menu item above");

    let pusher = Arc::new(AtomicBool::new(false));
    let progress_content = content.clone();

    let items: Vec<Value> = vec![
        link("Say Hi", &content, say_hi),
        link("Calculator", &content, calculator),
        Action::link("Show file copy progress", move || {
            show_progress(&progress_content, &pusher);
        })
        .into(),
        Action::link("Download greeting", || -> anyhow::Result<()> {
            download("hello.txt", "text/plain", || b"Hello from LiveLens\n".to_vec())?;
            Ok(())
        })
        .into(),
    ];
    menu.set(items);
}

fn link(label: &str, content: &RenderTarget, f: fn(&RenderTarget)) -> Value {
    let content = content.clone();
    Action::link(label, move || f(&content)).into()
}

fn say_hi(content: &RenderTarget) {
    let target = content.clone();
    content.set(Action::form2(
        "Please enter your details",
        ["name", "title"],
        move |name: String, title: Title| target.set(format!("Hi {} {}", title.name(), name)),
    ));
}

fn calculator(content: &RenderTarget) {
    let target = content.clone();
    content.set(Action::form2("Add", ["a", "b"], move |a: i64, b: i64| {
        target.set(format!("Result: {}", a + b))
    }));
}

fn showing_progress(target: &RenderTarget) -> bool {
    matches!(target.get(), Some(Value::Record(record)) if record.type_name == "Progress")
}

/// Show progress in `content`, starting a pusher unless one already runs
///
/// Returns whether a new pusher thread was started.
fn show_progress(content: &RenderTarget, running: &Arc<AtomicBool>) -> bool {
    let percent = fake_progress().clone();
    content.set(progress_record(percent.load(Ordering::Relaxed)));
    if running.swap(true, Ordering::SeqCst) {
        return false;
    }

    // Keep pushing while this target still shows progress and its tree is alive
    let target = content.clone();
    let running = running.clone();
    thread::spawn(move || loop {
        thread::sleep(TICK);
        if showing_progress(&target) {
            target.set(progress_record(percent.load(Ordering::Relaxed)));
            continue;
        }
        running.store(false, Ordering::SeqCst);
        // A click may have reopened the view before the flag was cleared
        if showing_progress(&target) && !running.swap(true, Ordering::SeqCst) {
            continue;
        }
        debug!(node = %target.id(), "Progress view closed");
        break;
    });
    true
}
