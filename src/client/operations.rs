//! Module `operations`
//!
//! The operation queue of the FTP client. Client calls enqueue operations;
//! at most one is in progress at a time, processed strictly in submission
//! order as the control channel completes each exchange.

use std::collections::VecDeque;

use crate::error::FtpError;

pub type OperationId = u64;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    ConnectToHost { host: String, port: u16 },
    Login { user: String, pass: String },
    Cd(String),
    List(Option<String>),
    Get(String),
    Put { path: String, data: Vec<u8> },
    Remove(String),
    Rename { from: String, to: String },
    Mkdir(String),
    Close,
}

impl OperationKind {
    /// Short name for logging; never includes arguments or payload.
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::ConnectToHost { .. } => "connect",
            OperationKind::Login { .. } => "login",
            OperationKind::Cd(_) => "cd",
            OperationKind::List(_) => "list",
            OperationKind::Get(_) => "get",
            OperationKind::Put { .. } => "put",
            OperationKind::Remove(_) => "remove",
            OperationKind::Rename { .. } => "rename",
            OperationKind::Mkdir(_) => "mkdir",
            OperationKind::Close => "close",
        }
    }

    /// Operations moving payload over a separate passive data connection.
    pub fn uses_data_channel(&self) -> bool {
        matches!(
            self,
            OperationKind::List(_) | OperationKind::Get(_) | OperationKind::Put { .. }
        )
    }
}

/// Lifecycle state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Waiting,
    InProgress,
    Done,
    Failed,
}

/// One queued client request with its progress bookkeeping.
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    state: OperationState,
    error: Option<FtpError>,
    /// Downloaded payload for `Get`.
    data: Vec<u8>,
    bytes_done: u64,
    bytes_total: Option<u64>,
}

impl Operation {
    fn new(id: OperationId, kind: OperationKind) -> Self {
        Self {
            id,
            kind,
            state: OperationState::Waiting,
            error: None,
            data: Vec::new(),
            bytes_done: 0,
            bytes_total: None,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut OperationKind {
        &mut self.kind
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    pub fn error(&self) -> Option<&FtpError> {
        self.error.as_ref()
    }

    pub fn bytes_done(&self) -> u64 {
        self.bytes_done
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    pub fn set_bytes_total(&mut self, total: Option<u64>) {
        self.bytes_total = total;
    }

    pub fn add_bytes_done(&mut self, n: u64) {
        self.bytes_done += n;
    }

    pub fn append_data(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub fn mark_in_progress(&mut self) {
        self.state = OperationState::InProgress;
    }

    pub fn mark_done(&mut self) {
        self.state = OperationState::Done;
    }

    pub fn mark_failed(&mut self, error: FtpError) {
        self.state = OperationState::Failed;
        self.error = Some(error);
    }
}

/// FIFO queue of pending operations. The front element is the one currently
/// in progress (once started); everything behind it is `Waiting`.
#[derive(Debug, Default)]
pub struct OperationQueue {
    queue: VecDeque<Operation>,
    next_id: OperationId,
}

impl OperationQueue {
    pub fn enqueue(&mut self, kind: OperationKind) -> OperationId {
        self.next_id += 1;
        let id = self.next_id;
        self.queue.push_back(Operation::new(id, kind));
        id
    }

    pub fn current(&self) -> Option<&Operation> {
        self.queue.front()
    }

    pub fn current_mut(&mut self) -> Option<&mut Operation> {
        self.queue.front_mut()
    }

    /// Removes and returns the front operation.
    pub fn pop_current(&mut self) -> Option<Operation> {
        self.queue.pop_front()
    }

    /// Empties the queue; used when a fatal error aborts everything pending.
    pub fn drain_all(&mut self) -> Vec<Operation> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
