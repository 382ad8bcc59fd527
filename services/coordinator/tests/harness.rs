//! Test harness for the coordinator.
//!
//! Provides:
//! - a scripted `StoreInstance` that replays canned status reports and
//!   records every call into a log shared by the whole fleet, so tests can
//!   assert on the global order in which instances were touched
//! - a fake RESP server standing in for a real store instance

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aofc_coordinator::{ClientError, GatePolicy, StoreInstance};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::{TcpListener, TcpStream};

/// A call made against a scripted instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Query(String),
    Trigger(String),
}

impl Event {
    pub fn instance(&self) -> &str {
        match self {
            Event::Query(name) | Event::Trigger(name) => name,
        }
    }
}

/// Shared, ordered record of calls across all instances.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn queries(&self, instance: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Query(instance.to_string()))
            .count()
    }

    pub fn triggers(&self, instance: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Trigger(instance.to_string()))
            .count()
    }

    /// Instance names in the order they were touched, consecutive repeats
    /// collapsed.
    pub fn visit_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for event in self.events() {
            if order.last().map(String::as_str) != Some(event.instance()) {
                order.push(event.instance().to_string());
            }
        }
        order
    }
}

/// What a status query answers.
#[derive(Debug, Clone)]
pub enum Step {
    Report(String),
    QueryFails,
    Hang,
}

/// A `StoreInstance` answering from a script, then from a fallback step.
pub struct ScriptedInstance {
    name: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    fail_triggers: bool,
    log: EventLog,
}

impl ScriptedInstance {
    /// An instance that, once its script runs out, reports idle with AOF on.
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Report(idle()),
            fail_triggers: false,
            log: log.clone(),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    pub fn then_report(self, report: String) -> Self {
        self.then(Step::Report(report))
    }

    pub fn then_repeat(self, report: String, times: usize) -> Self {
        (0..times).fold(self, |instance, _| instance.then_report(report.clone()))
    }

    pub fn otherwise(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn failing_triggers(mut self) -> Self {
        self.fail_triggers = true;
        self
    }

    pub fn into_dyn(self) -> Arc<dyn StoreInstance> {
        Arc::new(self)
    }
}

#[async_trait]
impl StoreInstance for ScriptedInstance {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_status(&self) -> Result<String, ClientError> {
        self.log.push(Event::Query(self.name.clone()));
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Report(report) => Ok(report),
            Step::QueryFails => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "scripted failure",
            ))),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn trigger_rewrite(&self) -> Result<(), ClientError> {
        self.log.push(Event::Trigger(self.name.clone()));
        if self.fail_triggers {
            return Err(ClientError::Server(
                "ERR Background append only file rewriting already in progress".to_string(),
            ));
        }
        Ok(())
    }
}

/// Render a persistence report the way a store does.
pub fn report(
    aof_enabled: bool,
    bgsave: bool,
    rewriting: bool,
    scheduled: bool,
    current_size: i64,
    base_size: i64,
) -> String {
    format!(
        "# Persistence\r\n\
         loading:0\r\n\
         rdb_bgsave_in_progress:{}\r\n\
         rdb_current_bgsave_time_sec:{}\r\n\
         aof_enabled:{}\r\n\
         aof_rewrite_in_progress:{}\r\n\
         aof_rewrite_scheduled:{}\r\n\
         aof_current_rewrite_time_sec:{}\r\n\
         aof_current_size:{}\r\n\
         aof_base_size:{}\r\n",
        u8::from(bgsave),
        if bgsave { 1 } else { -1 },
        u8::from(aof_enabled),
        u8::from(rewriting),
        u8::from(scheduled),
        if rewriting { 1 } else { -1 },
        current_size,
        base_size,
    )
}

pub fn idle() -> String {
    report(true, false, false, false, 100, 100)
}

pub fn disabled() -> String {
    report(false, false, false, false, 0, 0)
}

pub fn saving() -> String {
    report(true, true, false, false, 100, 100)
}

pub fn rewriting() -> String {
    report(true, false, true, false, 100, 100)
}

pub fn queued(current_size: i64, base_size: i64) -> String {
    report(true, false, false, true, current_size, base_size)
}

/// Fast policy for tests.
pub fn test_policy() -> GatePolicy {
    GatePolicy {
        poll_interval: Duration::from_millis(10),
        growth_threshold_percent: 75,
        call_timeout: Duration::from_millis(200),
    }
}

/// How a [`FakeStore`] answers.
#[derive(Debug, Clone, Default)]
pub struct FakeStoreBehavior {
    /// Password required before any other command.
    pub password: Option<String>,

    /// Error reply for `BGREWRITEAOF` (without the leading `-`).
    pub rewrite_error: Option<String>,

    /// Report served by `INFO` after the first `BGREWRITEAOF`.
    pub info_after_rewrite: Option<String>,

    /// Close the connection instead of replying to this many commands.
    pub drop_first: usize,
}

struct FakeStoreState {
    behavior: FakeStoreBehavior,
    info: Mutex<String>,
    commands: Mutex<Vec<Vec<String>>>,
    connections: AtomicUsize,
    drops_left: AtomicUsize,
}

/// A RESP server on localhost answering the commands the coordinator uses.
pub struct FakeStore {
    pub addr: String,
    state: Arc<FakeStoreState>,
}

impl FakeStore {
    pub async fn spawn(info: String, behavior: FakeStoreBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let state = Arc::new(FakeStoreState {
            drops_left: AtomicUsize::new(behavior.drop_first),
            behavior,
            info: Mutex::new(info),
            commands: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
        });

        let server_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                server_state.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, Arc::clone(&server_state)));
            }
        });

        Self { addr, state }
    }

    pub fn set_info(&self, info: String) {
        *self.state.info.lock().unwrap() = info;
    }

    /// Every command received, as upper-cased name plus arguments.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.state.commands.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<FakeStoreState>) {
    let mut stream = BufStream::new(stream);
    let mut authed = state.behavior.password.is_none();

    while let Some(mut args) = read_command(&mut stream).await {
        args[0] = args[0].to_uppercase();
        state.commands.lock().unwrap().push(args.clone());

        let dropped = state
            .drops_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if dropped {
            return;
        }

        let reply = match args[0].as_str() {
            "AUTH" => {
                if state.behavior.password.as_deref() == args.get(1).map(String::as_str) {
                    authed = true;
                    "+OK\r\n".to_string()
                } else {
                    "-WRONGPASS invalid username-password pair\r\n".to_string()
                }
            }
            _ if !authed => "-NOAUTH Authentication required.\r\n".to_string(),
            "PING" => "+PONG\r\n".to_string(),
            "SELECT" => "+OK\r\n".to_string(),
            "INFO" => {
                let info = state.info.lock().unwrap().clone();
                format!("${}\r\n{}\r\n", info.len(), info)
            }
            "BGREWRITEAOF" => match &state.behavior.rewrite_error {
                Some(error) => format!("-{error}\r\n"),
                None => {
                    if let Some(next) = &state.behavior.info_after_rewrite {
                        *state.info.lock().unwrap() = next.clone();
                    }
                    "+Background append only file rewriting started\r\n".to_string()
                }
            },
            other => format!("-ERR unknown command '{other}'\r\n"),
        };

        if stream.write_all(reply.as_bytes()).await.is_err() || stream.flush().await.is_err() {
            return;
        }
    }
}

async fn read_command(stream: &mut BufStream<TcpStream>) -> Option<Vec<String>> {
    let mut line = String::new();
    if stream.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        stream.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;

        let mut data = vec![0u8; len + 2];
        stream.read_exact(&mut data).await.ok()?;
        data.truncate(len);
        args.push(String::from_utf8(data).ok()?);
    }

    if args.is_empty() {
        return None;
    }
    Some(args)
}
