//! Live session dashboard.
//!
//! A background repaint loop over the persisted state document: one spinner
//! line per session plus a header bar for overall task progress. Strictly a
//! consumer; it never writes state. Stopped by dropping the handle or via
//! the shared cancel flag.

use crate::state::{StateStore, TaskStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Repaint interval.
const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

/// Handle over the running dashboard loop.
pub struct Dashboard {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    multi: MultiProgress,
}

impl Dashboard {
    /// Start repainting from `store` until stopped.
    pub fn spawn(store: StateStore) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let multi = MultiProgress::new();

        let loop_stop = stop.clone();
        let loop_multi = multi.clone();
        let handle = tokio::spawn(async move {
            let header = loop_multi.add(ProgressBar::new(0));
            header.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▓░"),
            );
            header.set_prefix("tasks");

            let spinner_style = ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            let mut session_bars: HashMap<usize, ProgressBar> = HashMap::new();

            while !loop_stop.load(Ordering::Relaxed) {
                if let Ok(state) = store.load() {
                    header.set_length(state.tasks.len() as u64);
                    header.set_position(state.count_tasks(TaskStatus::Completed) as u64);
                    header.set_message(state.current_phase.clone());

                    for session in &state.sessions {
                        let bar = session_bars.entry(session.session_id).or_insert_with(|| {
                            let bar = loop_multi.add(ProgressBar::new_spinner());
                            bar.set_style(spinner_style.clone());
                            bar.enable_steady_tick(Duration::from_millis(120));
                            bar
                        });
                        let doing = session
                            .current_task
                            .as_deref()
                            .map(|id| format!("working {}", id))
                            .unwrap_or_else(|| format!("{:?}", session.status).to_lowercase());
                        bar.set_message(format!(
                            "session {} · {} · {} done",
                            session.session_id,
                            doing,
                            session.completed_tasks.len()
                        ));
                    }
                }
                tokio::time::sleep(REFRESH_INTERVAL).await;
            }

            for bar in session_bars.values() {
                bar.finish_and_clear();
            }
            header.finish_and_clear();
        });

        Self {
            stop,
            handle,
            multi,
        }
    }

    /// Stop the loop and clear the bars.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.await;
        let _ = self.multi.clear();
    }
}
