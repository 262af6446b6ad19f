//! Module `machine`
//!
//! The FTP client state machine. Client calls enqueue operations and return
//! immediately; `process()` advances the machine one cooperative pass at a
//! time, reacting to control-channel reply codes and data-channel readiness.
//! The control connection is a single ordered request/response channel, so
//! exactly one operation is in flight at any moment.

use log::{debug, info, warn};
use std::net::SocketAddrV4;

use crate::client::events::ClientEvent;
use crate::client::operations::{OperationId, OperationKind, OperationQueue, OperationState};
use crate::client::state::ClientState;
use crate::config::ClientConfig;
use crate::error::FtpError;
use crate::protocol::replies::parse_size_text;
use crate::protocol::{ProtocolCommand, Reply, ReplyAccumulator, parse_list_line, parse_pasv_addr};
use crate::socket::{BufferedSocket, SocketEvent};

/// Where the in-flight operation stands in its command/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Waiting for the 220 service-ready greeting.
    Greeting,
    UserSent,
    PassSent,
    /// A single-command operation (CWD, DELE, MKD) awaiting its terminal
    /// reply.
    SimpleSent,
    RnfrSent,
    RntoSent,
    TypeSent,
    SizeSent,
    PasvSent,
    /// LIST/RETR/STOR sent, waiting for the 1xx preliminary reply.
    TransferCmdSent,
    Transferring,
    QuitSent,
}

/// First control action of a freshly started operation.
enum FirstStep {
    Connect { host: String, port: u16 },
    SendUser(String),
    Simple(ProtocolCommand),
    Rnfr(String),
    TypeAscii,
    TypeImage { payload: Option<Vec<u8>> },
    Quit,
}

/// Asynchronous FTP client with a sequential operation queue.
///
/// Submission methods (`connect_to_host`, `login`, `get`, ...) enqueue and
/// return an operation id without awaiting. Calling `process()` repeatedly
/// drives the queue; every submitted operation finishes exactly once with an
/// `OperationFinished` event, success or failure.
pub struct FtpClient {
    config: ClientConfig,
    control: BufferedSocket,
    data: Option<BufferedSocket>,
    state: ClientState,
    queue: OperationQueue,
    phase: Phase,
    reply_acc: ReplyAccumulator,
    events: Vec<ClientEvent>,
    /// Passive target parsed from a 227 reply, connected on the next pass.
    pending_data_addr: Option<SocketAddrV4>,
    put_payload: Vec<u8>,
    put_offset: usize,
    /// Saw the 226 transfer-complete reply on the control channel.
    transfer_complete: bool,
    /// The data connection reached EOF or finished closing.
    data_finished: bool,
}

impl FtpClient {
    pub fn new(config: ClientConfig) -> Self {
        let control = BufferedSocket::with_limits(config.flush_threshold, config.read_buffer_limit);
        Self {
            config,
            control,
            data: None,
            state: ClientState::Unconnected,
            queue: OperationQueue::default(),
            phase: Phase::Idle,
            reply_acc: ReplyAccumulator::new(),
            events: Vec::new(),
            pending_data_addr: None,
            put_payload: Vec::new(),
            put_offset: 0,
            transfer_complete: false,
            data_finished: false,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// True when nothing is queued and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle && self.queue.is_empty()
    }

    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    // --------------------
    // Operation submission
    // --------------------

    pub fn connect_to_host(&mut self, host: &str, port: u16) -> OperationId {
        self.queue.enqueue(OperationKind::ConnectToHost {
            host: host.to_string(),
            port,
        })
    }

    pub fn login(&mut self, user: &str, pass: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Login {
            user: user.to_string(),
            pass: pass.to_string(),
        })
    }

    pub fn cd(&mut self, dir: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Cd(dir.to_string()))
    }

    pub fn list(&mut self, dir: Option<&str>) -> OperationId {
        self.queue
            .enqueue(OperationKind::List(dir.map(str::to_string)))
    }

    pub fn get(&mut self, path: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Get(path.to_string()))
    }

    pub fn put(&mut self, path: &str, data: Vec<u8>) -> OperationId {
        self.queue.enqueue(OperationKind::Put {
            path: path.to_string(),
            data,
        })
    }

    pub fn remove(&mut self, path: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Remove(path.to_string()))
    }

    pub fn rename(&mut self, from: &str, to: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn mkdir(&mut self, dir: &str) -> OperationId {
        self.queue.enqueue(OperationKind::Mkdir(dir.to_string()))
    }

    /// Enqueues a graceful teardown: QUIT, then close of the control socket.
    /// The client is reusable afterwards with a fresh socket.
    pub fn close(&mut self) -> OperationId {
        self.queue.enqueue(OperationKind::Close)
    }

    // --------------------
    // Driving
    // --------------------

    /// Runs one cooperative pass and returns the events it produced.
    ///
    /// At most one readiness notification per socket is handled per pass;
    /// state between passes lives in the machine, never on the stack.
    pub async fn process(&mut self) -> Vec<ClientEvent> {
        self.start_next_operation().await;
        self.readiness_pass().await;
        self.consume_replies();

        if let Some(addr) = self.pending_data_addr.take() {
            self.open_data_channel(addr).await;
        }

        self.pump_data();
        self.maybe_finish_transfer();

        std::mem::take(&mut self.events)
    }

    /// Convenience loop: processes until the queue is empty and nothing is
    /// in flight, accumulating all events.
    pub async fn run_until_idle(&mut self) -> Vec<ClientEvent> {
        let mut all = Vec::new();
        while !self.is_idle() {
            all.extend(self.process().await);
        }
        all
    }

    /// Awaits readiness on whichever channel has work, then lets that
    /// channel run exactly one pass. Selecting over both sockets keeps the
    /// control channel responsive while a data transfer is in progress and
    /// vice versa.
    async fn readiness_pass(&mut self) {
        let control = &mut self.control;
        let data_active = self
            .data
            .as_ref()
            .map(|d| d.is_connected() || d.bytes_to_write() > 0)
            .unwrap_or(false);

        let (control_events, data_events) = if data_active {
            match self.data.as_mut() {
                Some(data) => {
                    tokio::select! {
                        events = control.process() => (events, Vec::new()),
                        events = data.process() => (Vec::new(), events),
                    }
                }
                None => (control.process().await, Vec::new()),
            }
        } else {
            (control.process().await, Vec::new())
        };

        self.handle_control_events(control_events);
        self.handle_data_events(data_events);
    }

    async fn start_next_operation(&mut self) {
        if self.phase != Phase::Idle {
            return;
        }

        let step = {
            let Some(op) = self.queue.current_mut() else {
                return;
            };
            if op.state() != OperationState::Waiting {
                return;
            }
            op.mark_in_progress();
            let id = op.id();
            self.events.push(ClientEvent::OperationStarted(id));
            info!("Starting operation {} ({})", id, op.kind().name());

            match op.kind_mut() {
                OperationKind::ConnectToHost { host, port } => FirstStep::Connect {
                    host: host.clone(),
                    port: *port,
                },
                OperationKind::Login { user, .. } => FirstStep::SendUser(user.clone()),
                OperationKind::Cd(dir) => FirstStep::Simple(ProtocolCommand::Cwd(dir.clone())),
                OperationKind::Mkdir(dir) => FirstStep::Simple(ProtocolCommand::Mkd(dir.clone())),
                OperationKind::Remove(path) => {
                    FirstStep::Simple(ProtocolCommand::Dele(path.clone()))
                }
                OperationKind::Rename { from, .. } => FirstStep::Rnfr(from.clone()),
                OperationKind::List(_) => FirstStep::TypeAscii,
                OperationKind::Get(_) => FirstStep::TypeImage { payload: None },
                OperationKind::Put { data, .. } => FirstStep::TypeImage {
                    payload: Some(std::mem::take(data)),
                },
                OperationKind::Close => FirstStep::Quit,
            }
        };

        // Everything except the connect itself needs a live control channel.
        if !matches!(step, FirstStep::Connect { .. } | FirstStep::Quit)
            && !self.control.is_connected()
        {
            self.fail_current(FtpError::NotConnected);
            return;
        }

        match step {
            FirstStep::Connect { host, port } => self.start_connect(&host, port).await,
            FirstStep::SendUser(user) => {
                self.send_command(&ProtocolCommand::User(user));
                self.phase = Phase::UserSent;
            }
            FirstStep::Simple(command) => {
                self.send_command(&command);
                self.phase = Phase::SimpleSent;
            }
            FirstStep::Rnfr(from) => {
                self.send_command(&ProtocolCommand::Rnfr(from));
                self.phase = Phase::RnfrSent;
            }
            FirstStep::TypeAscii => {
                self.send_command(&ProtocolCommand::TypeAscii);
                self.phase = Phase::TypeSent;
            }
            FirstStep::TypeImage { payload } => {
                if let Some(payload) = payload {
                    if let Some(op) = self.queue.current_mut() {
                        op.set_bytes_total(Some(payload.len() as u64));
                    }
                    self.put_payload = payload;
                    self.put_offset = 0;
                }
                self.send_command(&ProtocolCommand::TypeImage);
                self.phase = Phase::TypeSent;
            }
            FirstStep::Quit => {
                if !self.control.is_connected() {
                    // Nothing to tear down.
                    self.complete_current();
                    return;
                }
                self.send_command(&ProtocolCommand::Quit);
                self.set_state(ClientState::Closing);
                self.phase = Phase::QuitSent;
            }
        }
    }

    async fn start_connect(&mut self, host: &str, port: u16) {
        if self.state != ClientState::Unconnected {
            self.fail_current(FtpError::ProtocolError(
                "connect_to_host while already connected".to_string(),
            ));
            return;
        }

        self.set_state(ClientState::HostLookup);
        self.control.connect_to_host(host, port).await;
        let events = self.control.take_events();

        for event in events {
            match event {
                SocketEvent::HostFound => self.set_state(ClientState::Connecting),
                SocketEvent::Connected => {
                    self.set_state(ClientState::Connected);
                    self.phase = Phase::Greeting;
                }
                SocketEvent::Error(e) => {
                    self.set_state(ClientState::Unconnected);
                    self.fail_all(FtpError::from(&e));
                    return;
                }
                _ => {}
            }
        }
    }

    // --------------------
    // Control channel
    // --------------------

    fn handle_control_events(&mut self, events: Vec<SocketEvent>) {
        for event in events {
            match event {
                SocketEvent::ReadyRead
                | SocketEvent::BytesWritten(_)
                | SocketEvent::HostFound
                | SocketEvent::Connected => {}
                SocketEvent::ConnectionClosed => {
                    if self.phase == Phase::QuitSent {
                        // Server dropped the connection along with its 221.
                        self.finish_quit();
                    } else if self.phase != Phase::Idle || !self.queue.is_empty() {
                        self.fail_all(FtpError::ConnectionClosed);
                        self.set_state(ClientState::Unconnected);
                    } else {
                        self.set_state(ClientState::Unconnected);
                    }
                }
                SocketEvent::Closed => {
                    if self.phase == Phase::QuitSent {
                        self.finish_quit();
                    } else {
                        self.set_state(ClientState::Unconnected);
                    }
                }
                SocketEvent::Error(e) => {
                    let error = FtpError::from(&e);
                    self.fail_all(error);
                    self.set_state(ClientState::Unconnected);
                }
            }
        }
    }

    fn consume_replies(&mut self) {
        while let Some(line) = self.control.read_line() {
            let text = String::from_utf8_lossy(&line).to_string();
            match self.reply_acc.feed_line(&text) {
                Ok(Some(reply)) => self.dispatch_reply(reply),
                Ok(None) => {}
                Err(e) => {
                    warn!("Dropping malformed control line: {:?}", text.trim_end());
                    self.fail_current(e);
                }
            }
        }
    }

    /// Reply-code dispatch table for the in-flight operation.
    fn dispatch_reply(&mut self, reply: Reply) {
        debug!("<- {} {}", reply.code, reply.text);

        if self.phase == Phase::Idle {
            warn!("Unsolicited reply {}: {}", reply.code, reply.text);
            self.events.push(ClientEvent::RawReply(reply));
            return;
        }
        self.events.push(ClientEvent::RawReply(reply.clone()));

        // SIZE is a best-effort probe; a refusal just means unknown total.
        if self.phase == Phase::SizeSent && reply.is_error() {
            debug!("Server refused SIZE; proceeding without a total");
            self.send_command(&ProtocolCommand::Pasv);
            self.phase = Phase::PasvSent;
            return;
        }

        if reply.is_error() {
            self.handle_error_reply(&reply);
            return;
        }

        match (self.phase, reply.code) {
            (Phase::Greeting, 220) => self.complete_current(),
            (Phase::UserSent, 331 | 332) => {
                let pass = match self.queue.current().map(|op| op.kind()) {
                    Some(OperationKind::Login { pass, .. }) => pass.clone(),
                    _ => String::new(),
                };
                self.send_command(&ProtocolCommand::Pass(pass));
                self.phase = Phase::PassSent;
            }
            (Phase::UserSent | Phase::PassSent, 230) => {
                self.set_state(ClientState::LoggedIn);
                self.complete_current();
            }
            (Phase::SimpleSent, 250 | 257 | 200) => self.complete_current(),
            (Phase::RnfrSent, 350) => {
                let to = match self.queue.current().map(|op| op.kind()) {
                    Some(OperationKind::Rename { to, .. }) => to.clone(),
                    _ => String::new(),
                };
                self.send_command(&ProtocolCommand::Rnto(to));
                self.phase = Phase::RntoSent;
            }
            (Phase::RntoSent, 250) => self.complete_current(),
            (Phase::TypeSent, 200) => {
                match self.queue.current().map(|op| op.kind()) {
                    Some(OperationKind::Get(path)) => {
                        let path = path.clone();
                        self.send_command(&ProtocolCommand::Size(path));
                        self.phase = Phase::SizeSent;
                    }
                    _ => {
                        self.send_command(&ProtocolCommand::Pasv);
                        self.phase = Phase::PasvSent;
                    }
                }
            }
            (Phase::SizeSent, 213) => {
                let total = parse_size_text(&reply.text);
                if let Some(op) = self.queue.current_mut() {
                    op.set_bytes_total(total);
                }
                self.send_command(&ProtocolCommand::Pasv);
                self.phase = Phase::PasvSent;
            }
            (Phase::PasvSent, 227) => match parse_pasv_addr(&reply.text) {
                Ok(addr) => {
                    debug!("Passive data target: {}", addr);
                    self.pending_data_addr = Some(addr);
                }
                Err(e) => self.fail_current(e),
            },
            (Phase::TransferCmdSent, 150 | 125) => {
                self.phase = Phase::Transferring;
            }
            (Phase::TransferCmdSent | Phase::Transferring, 226 | 250) => {
                self.transfer_complete = true;
            }
            (Phase::QuitSent, 221) => {
                self.finish_quit();
            }
            (phase, code) => {
                warn!("Unexpected reply {} in phase {:?}", code, phase);
            }
        }
    }

    fn handle_error_reply(&mut self, reply: &Reply) {
        let error = FtpError::from_reply(reply);
        if error.is_fatal() {
            // A login failure invalidates every queued operation, not just
            // the one in flight.
            self.fail_all(error);
        } else {
            self.fail_current(error);
        }
    }

    fn finish_quit(&mut self) {
        self.complete_current();
        // A fresh control socket allows the instance to be reused.
        self.control.reset();
        self.reply_acc = ReplyAccumulator::new();
        self.set_state(ClientState::Unconnected);
    }

    // --------------------
    // Data channel
    // --------------------

    /// Opens the passive data connection and sends the transfer command.
    async fn open_data_channel(&mut self, addr: SocketAddrV4) {
        let mut data =
            BufferedSocket::with_limits(self.config.flush_threshold, self.config.read_buffer_limit);
        data.connect_to_host(&addr.ip().to_string(), addr.port())
            .await;

        let mut failure = None;
        for event in data.take_events() {
            if let SocketEvent::Error(e) = event {
                failure = Some(FtpError::from(&e));
            }
        }
        if let Some(error) = failure {
            self.fail_current(error);
            return;
        }

        let command = match self.queue.current().map(|op| op.kind()) {
            Some(OperationKind::List(dir)) => ProtocolCommand::List(dir.clone()),
            Some(OperationKind::Get(path)) => ProtocolCommand::Retr(path.clone()),
            Some(OperationKind::Put { path, .. }) => ProtocolCommand::Stor(path.clone()),
            _ => {
                self.fail_current(FtpError::ProtocolError(
                    "passive reply without a transfer operation".to_string(),
                ));
                return;
            }
        };

        self.data = Some(data);
        self.data_finished = false;
        self.transfer_complete = false;
        self.send_command(&command);
        self.phase = Phase::TransferCmdSent;
    }

    fn handle_data_events(&mut self, events: Vec<SocketEvent>) {
        let mut failure = None;
        for event in events {
            match event {
                SocketEvent::ReadyRead | SocketEvent::BytesWritten(_) => {}
                SocketEvent::ConnectionClosed | SocketEvent::Closed => {
                    self.data_finished = true;
                }
                SocketEvent::Error(e) => failure = Some(FtpError::from(&e)),
                SocketEvent::HostFound | SocketEvent::Connected => {}
            }
        }
        if let Some(error) = failure {
            self.fail_current(error);
        }
    }

    /// Moves payload between the data socket and the in-flight operation:
    /// listing lines and downloaded chunks in, upload blocks out.
    fn pump_data(&mut self) {
        enum Pump {
            List,
            Get,
            Put,
        }

        let Some(op) = self.queue.current_mut() else {
            return;
        };
        let id = op.id();
        let pump = match op.kind() {
            OperationKind::List(_) => Pump::List,
            OperationKind::Get(_) => Pump::Get,
            OperationKind::Put { .. } => Pump::Put,
            _ => return,
        };
        let Some(data) = self.data.as_mut() else {
            return;
        };

        match pump {
            Pump::List => {
                while let Some(line) = data.read_line() {
                    let text = String::from_utf8_lossy(&line);
                    if let Some(entry) = parse_list_line(&text) {
                        self.events.push(ClientEvent::ListEntry(entry));
                    }
                }
                // A final line without a trailing newline still counts once
                // the transfer is over.
                if self.data_finished && data.bytes_available() > 0 {
                    let rest = data.read_all();
                    if let Some(entry) = parse_list_line(&String::from_utf8_lossy(&rest)) {
                        self.events.push(ClientEvent::ListEntry(entry));
                    }
                }
            }
            Pump::Get => {
                let chunk = data.read_all();
                if !chunk.is_empty() {
                    op.append_data(&chunk);
                    op.add_bytes_done(chunk.len() as u64);
                    self.events.push(ClientEvent::TransferProgress {
                        id,
                        done: op.bytes_done(),
                        total: op.bytes_total(),
                    });
                }
            }
            Pump::Put => {
                if self.phase != Phase::Transferring || data.bytes_to_write() > 0 {
                    return;
                }
                if self.put_offset < self.put_payload.len() {
                    // One fixed-size block per pass, as the socket drains.
                    let end = (self.put_offset + self.config.transfer_block_size)
                        .min(self.put_payload.len());
                    data.write(&self.put_payload[self.put_offset..end]);
                    op.add_bytes_done((end - self.put_offset) as u64);
                    self.put_offset = end;
                    self.events.push(ClientEvent::TransferProgress {
                        id,
                        done: op.bytes_done(),
                        total: op.bytes_total(),
                    });
                } else if !self.data_finished {
                    // Whole payload handed to the OS: closing the data
                    // connection marks end-of-file for the server. With a
                    // drained write buffer the close is immediate.
                    data.close();
                    for event in data.take_events() {
                        if matches!(event, SocketEvent::Closed) {
                            self.data_finished = true;
                        }
                    }
                }
            }
        }
    }

    /// A transfer finishes when the server confirmed completion on the
    /// control channel and the data connection has wound down.
    fn maybe_finish_transfer(&mut self) {
        if !matches!(self.phase, Phase::TransferCmdSent | Phase::Transferring) {
            return;
        }
        let uses_data = self
            .queue
            .current()
            .map(|op| op.kind().uses_data_channel())
            .unwrap_or(false);
        if !uses_data {
            return;
        }
        if self.transfer_complete && (self.data.is_none() || self.data_finished) {
            self.teardown_data();
            self.complete_current();
        }
    }

    fn teardown_data(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.reset();
        }
    }

    // --------------------
    // Completion
    // --------------------

    fn complete_current(&mut self) {
        if let Some(mut op) = self.queue.pop_current() {
            op.mark_done();
            let data = op.take_data();
            info!("Operation {} complete", op.id());
            self.events.push(ClientEvent::OperationFinished {
                id: op.id(),
                error: None,
                data,
            });
        }
        self.reset_transfer_state();
    }

    /// Fails the in-flight operation only; queued operations continue and
    /// the control connection stays up.
    fn fail_current(&mut self, error: FtpError) {
        self.teardown_data();
        if let Some(mut op) = self.queue.pop_current() {
            warn!("Operation {} failed: {}", op.id(), error);
            op.mark_failed(error.clone());
            self.events.push(ClientEvent::OperationFinished {
                id: op.id(),
                error: Some(error),
                data: Vec::new(),
            });
        }
        self.reset_transfer_state();
    }

    /// Fails the in-flight operation and every queued one with the same
    /// error, leaving the queue empty. Each operation still gets exactly one
    /// completion event.
    fn fail_all(&mut self, error: FtpError) {
        self.teardown_data();
        for mut op in self.queue.drain_all() {
            warn!("Operation {} aborted: {}", op.id(), error);
            op.mark_failed(error.clone());
            self.events.push(ClientEvent::OperationFinished {
                id: op.id(),
                error: Some(error.clone()),
                data: Vec::new(),
            });
        }
        self.reset_transfer_state();
    }

    fn reset_transfer_state(&mut self) {
        self.phase = Phase::Idle;
        self.pending_data_addr = None;
        self.put_payload.clear();
        self.put_offset = 0;
        self.transfer_complete = false;
        self.data_finished = false;
    }

    fn send_command(&mut self, command: &ProtocolCommand) {
        debug!("-> {}", command.to_log_line());
        self.control.write(command.to_wire().as_bytes());
    }

    fn set_state(&mut self, state: ClientState) {
        if self.state != state {
            debug!("Client state: {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.push(ClientEvent::StateChanged(state));
        }
    }
}
