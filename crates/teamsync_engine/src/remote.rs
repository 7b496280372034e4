//! Remote API abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use teamsync_model::{
    EntityFilter, ExternalId, Member, OperationId, PendingOperation, Task, TimeEntry,
};

/// One page of tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPage {
    /// Tasks on this page.
    pub tasks: Vec<Task>,
    /// Whether the remote holds further pages.
    pub has_more: bool,
}

/// The remote team-management service.
///
/// This trait abstracts the network layer, allowing for different implementations
/// (HTTP, mock for testing, etc.). Calls are read-mostly; `submit_operation`
/// is the single write used when replaying queued operations.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Lists the members matching `filter`.
    async fn list_entities(&self, filter: &EntityFilter) -> SyncResult<Vec<Member>>;

    /// Lists time entries of `member_ids` starting inside `[start_ms, end_ms)`.
    async fn list_time_entries(
        &self,
        start_ms: u64,
        end_ms: u64,
        member_ids: &[ExternalId],
    ) -> SyncResult<Vec<TimeEntry>>;

    /// Fetches one page of tasks (pages are numbered from 1).
    async fn list_tasks_page(&self, filter: &EntityFilter, page: u32) -> SyncResult<TaskPage>;

    /// Performs a queued write. `Ok` is the remote acknowledgment.
    async fn submit_operation(&self, operation: &PendingOperation) -> SyncResult<()>;
}

/// A call observed by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `list_entities`.
    ListEntities,
    /// `list_time_entries`.
    ListTimeEntries {
        /// Requested start.
        start_ms: u64,
        /// Requested end.
        end_ms: u64,
    },
    /// `list_tasks_page`.
    ListTasksPage {
        /// Requested page.
        page: u32,
    },
    /// `submit_operation`.
    SubmitOperation(OperationId),
}

#[derive(Debug, Default)]
struct MockData {
    members: Vec<Member>,
    time_entries: Vec<TimeEntry>,
    task_pages: Vec<Vec<Task>>,
    endless_page_size: Option<usize>,
    failing_pages: HashSet<u32>,
    failing_submit_calls: HashSet<usize>,
    submit_calls: usize,
    calls: Vec<RemoteCall>,
    submitted: Vec<PendingOperation>,
    latency: Duration,
}

/// A scripted in-memory remote for testing.
#[derive(Debug)]
pub struct MockRemote {
    connected: AtomicBool,
    data: Mutex<MockData>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Creates a connected remote with no data.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            data: Mutex::new(MockData::default()),
        }
    }

    /// Sets the members returned by `list_entities`.
    pub fn set_members(&self, members: Vec<Member>) {
        self.data.lock().members = members;
    }

    /// Sets the entries returned by `list_time_entries`.
    pub fn set_time_entries(&self, entries: Vec<TimeEntry>) {
        self.data.lock().time_entries = entries;
    }

    /// Sets the task pages; the last page reports `has_more = false`.
    pub fn set_task_pages(&self, pages: Vec<Vec<Task>>) {
        let mut data = self.data.lock();
        data.task_pages = pages;
        data.endless_page_size = None;
    }

    /// Makes every task page hold `page_size` tasks and report `has_more = true`.
    pub fn set_endless_task_pages(&self, page_size: usize) {
        self.data.lock().endless_page_size = Some(page_size);
    }

    /// Makes the next request for `page` fail with a retryable transport error.
    pub fn fail_task_page_once(&self, page: u32) {
        self.data.lock().failing_pages.insert(page);
    }

    /// Makes the `index`-th (0-based, counted over the mock's lifetime)
    /// `submit_operation` call fail.
    pub fn fail_submit_call(&self, index: usize) {
        self.data.lock().failing_submit_calls.insert(index);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.data.lock().latency = latency;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.data.lock().calls.clone()
    }

    /// Number of task page requests made so far.
    pub fn task_page_requests(&self) -> usize {
        self.data
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RemoteCall::ListTasksPage { .. }))
            .count()
    }

    /// Operations acknowledged so far, in acknowledgment order.
    pub fn submitted(&self) -> Vec<PendingOperation> {
        self.data.lock().submitted.clone()
    }

    async fn begin(&self, call: RemoteCall) -> SyncResult<()> {
        let latency = {
            let mut data = self.data.lock();
            data.calls.push(call);
            data.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn list_entities(&self, filter: &EntityFilter) -> SyncResult<Vec<Member>> {
        self.begin(RemoteCall::ListEntities).await?;
        Ok(self
            .data
            .lock()
            .members
            .iter()
            .filter(|m| filter.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn list_time_entries(
        &self,
        start_ms: u64,
        end_ms: u64,
        member_ids: &[ExternalId],
    ) -> SyncResult<Vec<TimeEntry>> {
        self.begin(RemoteCall::ListTimeEntries { start_ms, end_ms })
            .await?;
        Ok(self
            .data
            .lock()
            .time_entries
            .iter()
            .filter(|e| member_ids.contains(&e.member_id))
            .filter(|e| e.start_ms >= start_ms && e.start_ms < end_ms)
            .cloned()
            .collect())
    }

    async fn list_tasks_page(&self, _filter: &EntityFilter, page: u32) -> SyncResult<TaskPage> {
        self.begin(RemoteCall::ListTasksPage { page }).await?;
        let mut data = self.data.lock();
        if data.failing_pages.remove(&page) {
            return Err(SyncError::transport_retryable(format!(
                "connection reset on page {page}"
            )));
        }
        if let Some(size) = data.endless_page_size {
            let tasks = (0..size)
                .map(|i| Task::new(format!("task-{page}-{i}"), format!("Task {page}.{i}")))
                .collect();
            return Ok(TaskPage {
                tasks,
                has_more: true,
            });
        }
        let index = page.saturating_sub(1) as usize;
        let tasks = data.task_pages.get(index).cloned().unwrap_or_default();
        Ok(TaskPage {
            tasks,
            has_more: index + 1 < data.task_pages.len(),
        })
    }

    async fn submit_operation(&self, operation: &PendingOperation) -> SyncResult<()> {
        self.begin(RemoteCall::SubmitOperation(operation.operation_id))
            .await?;
        let mut data = self.data.lock();
        let call = data.submit_calls;
        data.submit_calls += 1;
        if data.failing_submit_calls.remove(&call) {
            return Err(SyncError::transport_retryable("write rejected: 503"));
        }
        data.submitted.push(operation.clone());
        Ok(())
    }
}
