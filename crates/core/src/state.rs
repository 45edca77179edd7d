//! Cross-run session state.
//!
//! Everything that outlives a single agent run lives here: the working
//! directory pointer, the TODO list, registered background processes and
//! tool call counters. The whole lot sits behind one async mutex in
//! [`SharedState`], which is injected into every run.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

/// Status of a TODO item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Pending => "○",
            Self::InProgress => "◐",
            Self::Completed => "●",
            Self::Cancelled => "✗",
        }
    }

    /// Finished items survive a rewrite of the list.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TodoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!(
                "Invalid status '{other}'. Must be one of: pending, in_progress, completed, cancelled"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: u32,
    pub content: String,
    pub status: TodoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of [`TodoList::rewrite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteSummary {
    pub kept: usize,
    pub added: usize,
    pub total: usize,
}

/// A flat TODO list with monotonically increasing ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    items: Vec<TodoItem>,
    next_id: u32,
}

impl TodoList {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }

    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replace the open items with `contents`. Completed and cancelled items
    /// are kept; new items start as pending.
    pub fn rewrite<I, S>(&mut self, contents: I) -> RewriteSummary
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items.retain(|item| item.status.is_finished());
        let kept = self.items.len();
        if self.next_id == 0 {
            self.next_id = 1;
        }

        let now = Utc::now();
        for content in contents {
            self.items.push(TodoItem {
                id: self.next_id,
                content: content.into(),
                status: TodoStatus::Pending,
                created_at: now,
                updated_at: now,
            });
            self.next_id += 1;
        }

        RewriteSummary {
            kept,
            added: self.items.len() - kept,
            total: self.items.len(),
        }
    }

    /// Set the status of item `id`. Returns false if no such item exists.
    pub fn update(&mut self, id: u32, status: TodoStatus) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                item.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Human-readable rendering used in system hints. Empty when there are
    /// no items.
    pub fn render(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }
        let mut out = String::from("TODO List:");
        for item in &self.items {
            out.push_str(&format!(
                "\n  [{}] {} {} ({})",
                item.id,
                item.status.symbol(),
                item.content,
                item.status
            ));
        }
        out
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next_id = 1;
    }
}

/// A long-running process the agent has been told about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundProcess {
    pub name: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
}

/// The state guarded by [`SharedState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub current_dir: PathBuf,
    pub todos: TodoList,
    pub background_processes: BTreeMap<String, BackgroundProcess>,
    pub tool_call_counts: HashMap<String, u32>,
    pub total_tool_calls: u32,
    #[serde(skip)]
    initial_dir: PathBuf,
}

impl SessionState {
    pub fn new(current_dir: impl Into<PathBuf>) -> Self {
        let current_dir = current_dir.into();
        Self {
            initial_dir: current_dir.clone(),
            current_dir,
            todos: TodoList::new(),
            background_processes: BTreeMap::new(),
            tool_call_counts: HashMap::new(),
            total_tool_calls: 0,
        }
    }

    /// Resolve `path` against the current directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.current_dir.join(p)
        }
    }

    /// Bump the counters for `tool_name` and return the new per-tool count.
    pub fn record_tool_call(&mut self, tool_name: &str) -> u32 {
        self.total_tool_calls += 1;
        let count = self.tool_call_counts.entry(tool_name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn register_process(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) {
        self.background_processes.insert(
            id.into(),
            BackgroundProcess {
                name: name.into(),
                metadata,
                started_at: Utc::now(),
            },
        );
    }

    pub fn unregister_process(&mut self, id: &str) -> bool {
        self.background_processes.remove(id).is_some()
    }

    /// Forget everything and return to the directory the session started in.
    pub fn reset(&mut self) {
        self.current_dir = self.initial_dir.clone();
        self.todos.clear();
        self.background_processes.clear();
        self.tool_call_counts.clear();
        self.total_tool_calls = 0;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Cheaply cloneable handle to the session state.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<SessionState>>,
}

impl SharedState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Lock the state. Hold the guard only for short critical sections
    /// (building a hint, executing one tool batch).
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().await
    }

    pub async fn snapshot(&self) -> SessionState {
        self.inner.lock().await.clone()
    }

    pub async fn reset(&self) {
        self.inner.lock().await.reset();
    }
}
