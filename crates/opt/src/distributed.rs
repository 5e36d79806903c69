//! Distributed optimization: a master suggests configurations and workers,
//! possibly on other hosts, evaluate them.
//!
//! Master and workers exchange newline-delimited JSON [`Message`]s over TCP.
//! A worker introduces itself with an authentication key, then loops
//! announcing it is ready and evaluating the task it is given until the
//! master asks it to shut down.
//!
//! ```no_run
//! use openbox_opt::{DistributedOptimizerBuilder, DistributedWorker, Evaluation};
//! use openbox_space::{ConfigSpace, Configuration, Hyperparameter};
//!
//! fn sphere(c: &Configuration) -> anyhow::Result<Evaluation> {
//!     let x = c.get_f64("x").unwrap_or_default();
//!     Ok(Evaluation::from(x * x))
//! }
//!
//! // on the master host
//! let space = ConfigSpace::new()
//!     .add(Hyperparameter::float("x", -5., 5.)).unwrap();
//! let mut master = DistributedOptimizerBuilder::new()
//!     .configure(|config| {
//!         config
//!             .ip("0.0.0.0")
//!             .port(13579)
//!             .authkey("secret")
//!             .parallel(|p| p.batch_size(4).optimizer(|o| o.max_runs(50)))
//!     })
//!     .within(space)
//!     .expect("valid optimizer");
//! std::thread::spawn(move || master.run());
//!
//! // on each worker host
//! let count = DistributedWorker::new(sphere, "127.0.0.1:13579", "secret")
//!     .run()
//!     .expect("worker run");
//! println!("{count} trials evaluated");
//! ```
use crate::advisor::Advisor;
use crate::errors::{OpenBoxError, Result};
use crate::history::{History, Observation, TrialState};
use crate::optimizer::{init_logger, EarlyStopping};
use crate::parallel::{ParallelOptimizerConfig, ParallelStrategy, ValidParallelOptimizerConfig};
use crate::runner::{run_trial, ObjectiveFn};

use log::{debug, info, warn};
use openbox_space::{ConfigSpace, Configuration};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{block_in_place, JoinSet};
use web_time::Instant;

/// Default port of the master
pub const DEFAULT_PORT: u16 = 13579;

/// Period at which the master checks its runtime budget
const TICK: Duration = Duration::from_millis(100);
/// Time given to workers to receive the shutdown message
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Message exchanged between master and workers, one JSON object per line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Worker introduction
    Hello {
        /// Shared secret, has to match the master one
        authkey: String,
        /// Worker label used in logs
        worker_id: String,
    },
    /// Worker accepted
    Welcome,
    /// Worker rejected, the connection is closed
    Rejected {
        /// Rejection cause
        reason: String,
    },
    /// Worker waiting for a task
    Ready,
    /// Configuration to evaluate
    Task {
        /// Trial identifier
        trial_id: usize,
        /// Configuration to evaluate
        config: Configuration,
        /// Max duration of the trial in seconds
        time_limit: Option<f64>,
        /// Expected number of objectives
        num_objectives: usize,
        /// Expected number of constraints
        num_constraints: usize,
    },
    /// End of the optimization
    Shutdown,
    /// Result of a task
    Result {
        /// Trial identifier
        trial_id: usize,
        /// Outcome of the trial
        observation: Observation,
    },
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

async fn recv<R: tokio::io::AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> Result<Option<Message>> {
    match lines.next_line().await? {
        Some(line) => Ok(Some(serde_json::from_str(&line)?)),
        None => Ok(None),
    }
}

/// Distributed optimizer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DistributedOptimizerConfig {
    /// Scheduling and sequential settings
    #[serde(flatten)]
    pub(crate) parallel: ParallelOptimizerConfig,
    /// Address the master listens on
    pub(crate) ip: String,
    /// Port the master listens on
    pub(crate) port: u16,
    /// Shared secret of master and workers
    #[serde(skip_serializing, default)]
    pub(crate) authkey: String,
}

impl Default for DistributedOptimizerConfig {
    fn default() -> Self {
        DistributedOptimizerConfig {
            parallel: ParallelOptimizerConfig::default(),
            ip: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            authkey: String::new(),
        }
    }
}

impl DistributedOptimizerConfig {
    /// Sets the address the master listens on
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    /// Sets the port the master listens on
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the secret workers have to present
    pub fn authkey(mut self, authkey: impl Into<String>) -> Self {
        self.authkey = authkey.into();
        self
    }

    /// Sets scheduling settings (batch size, parallel strategy, budget, ...)
    pub fn parallel<F: FnOnce(ParallelOptimizerConfig) -> ParallelOptimizerConfig>(
        mut self,
        init: F,
    ) -> Self {
        self.parallel = init(self.parallel);
        self
    }

    /// Checks the consistency of the configuration
    pub fn check(self) -> Result<ValidDistributedOptimizerConfig> {
        if self.ip.is_empty() {
            return Err(OpenBoxError::InvalidConfigError(
                "master ip should not be empty".to_string(),
            ));
        }
        Ok(ValidDistributedOptimizerConfig {
            parallel: self.parallel.clone().check()?,
            config: self,
        })
    }
}

/// A [`DistributedOptimizerConfig`] whose consistency was checked
#[derive(Clone, Debug)]
pub struct ValidDistributedOptimizerConfig {
    pub(crate) parallel: ValidParallelOptimizerConfig,
    pub(crate) config: DistributedOptimizerConfig,
}

impl std::ops::Deref for ValidDistributedOptimizerConfig {
    type Target = DistributedOptimizerConfig;

    fn deref(&self) -> &DistributedOptimizerConfig {
        &self.config
    }
}

/// Distributed optimizer builder. The objective is evaluated by workers,
/// hence not given to the master.
#[derive(Default)]
pub struct DistributedOptimizerBuilder {
    config: DistributedOptimizerConfig,
}

impl DistributedOptimizerBuilder {
    /// Builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set configuration of the optimizer
    pub fn configure<F: FnOnce(DistributedOptimizerConfig) -> DistributedOptimizerConfig>(
        mut self,
        init: F,
    ) -> Self {
        self.config = init(self.config);
        self
    }

    /// Build the master optimizing over the given space
    pub fn within(self, space: ConfigSpace) -> Result<DistributedOptimizer> {
        let config = self.config.check()?;
        let advisor = Advisor::new(space, config.parallel.optimizer.advisor.clone())?;
        Ok(DistributedOptimizer { config, advisor })
    }
}

/// Connection events forwarded to the master scheduler
enum Event {
    Joined {
        conn: usize,
        worker_id: String,
        outbox: mpsc::UnboundedSender<Message>,
    },
    Ready {
        conn: usize,
    },
    Result {
        trial_id: usize,
        observation: Observation,
    },
    Left {
        conn: usize,
    },
}

struct PendingTrial {
    conn: usize,
    config: Configuration,
    start: Instant,
}

/// Scheduler state of the master
#[derive(Default)]
struct Schedule {
    workers: HashMap<usize, (String, mpsc::UnboundedSender<Message>)>,
    idle: VecDeque<usize>,
    outstanding: BTreeMap<usize, PendingTrial>,
    /// Configurations of the current synchronous round not issued yet
    round: VecDeque<Configuration>,
    issued: usize,
    issuing: bool,
    early_stopping: EarlyStopping,
}

impl Schedule {
    fn pending_configs(&self) -> Vec<Configuration> {
        self.outstanding.values().map(|p| p.config.clone()).collect()
    }
}

/// Master of a distributed optimization
pub struct DistributedOptimizer {
    config: ValidDistributedOptimizerConfig,
    advisor: Advisor,
}

impl DistributedOptimizer {
    /// Configuration of the optimizer
    pub fn config(&self) -> &ValidDistributedOptimizerConfig {
        &self.config
    }

    /// Observations recorded so far
    pub fn get_history(&self) -> &History {
        self.advisor.get_history()
    }

    /// Serves workers until `max_runs` results are recorded or `max_runtime`
    /// is reached, then shuts every worker down
    pub fn run(&mut self) -> Result<History> {
        init_logger();
        info!("{:?}", self.config.config);
        self.config.parallel.optimizer.save()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())?;

        let history = self.get_history();
        let counts = history.get_trial_counts();
        info!(
            "Distributed optimization done: {} trials ({} successful, {} failed)",
            history.len(),
            counts.success,
            counts.failed
        );
        Ok(history.clone())
    }

    /// Records an observation, then stops issuing when the optimization stalls:
    /// checked after every trial in asynchronous mode, after every round otherwise
    fn record(&mut self, schedule: &mut Schedule, obs: Observation) -> Result<()> {
        info!(
            "Trial {} ends: {:?} {:?}",
            self.get_history().len() + 1,
            obs.trial_state,
            obs.objectives
        );
        self.advisor.update_observation(obs)?;
        if let Some(path) = self.config.parallel.optimizer.history_path() {
            self.get_history().save_json(path)?;
        }

        let iteration_done = match self.config.parallel.parallel_strategy {
            ParallelStrategy::Async => true,
            ParallelStrategy::Sync => schedule.round.is_empty() && schedule.outstanding.is_empty(),
        };
        if iteration_done
            && schedule.issuing
            && schedule
                .early_stopping
                .update(self.get_history(), self.config.parallel.optimizer.early_stop)
        {
            info!("No improvement, wait for running trials");
            schedule.issuing = false;
            schedule.round.clear();
        }
        Ok(())
    }

    /// Next configuration to issue, `None` when nothing can be issued right now
    fn next_config(&mut self, schedule: &mut Schedule) -> Result<Option<Configuration>> {
        let max_runs = self.config.parallel.optimizer.max_runs;
        match self.config.parallel.parallel_strategy {
            ParallelStrategy::Async => {
                if schedule.issued >= max_runs {
                    return Ok(None);
                }
                let pending = schedule.pending_configs();
                match block_in_place(|| self.advisor.get_suggestions(1, &pending)) {
                    Ok(mut suggestions) => Ok(suggestions.pop()),
                    Err(OpenBoxError::NoMoreCandidates(msg)) => {
                        info!("Stop issuing trials: {msg}");
                        schedule.issuing = false;
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            }
            ParallelStrategy::Sync => {
                if schedule.round.is_empty() {
                    if !schedule.outstanding.is_empty() || schedule.issued >= max_runs {
                        return Ok(None);
                    }
                    let n = self.config.parallel.batch_size.min(max_runs - schedule.issued);
                    match block_in_place(|| self.advisor.get_suggestions(n, &[])) {
                        Ok(batch) => {
                            info!("New round of {} trials", batch.len());
                            schedule.round.extend(batch);
                        }
                        Err(OpenBoxError::NoMoreCandidates(msg)) => {
                            info!("Stop issuing trials: {msg}");
                            schedule.issuing = false;
                        }
                        Err(err) => return Err(err),
                    }
                }
                Ok(schedule.round.pop_front())
            }
        }
    }

    /// Hands configurations to idle workers
    fn dispatch(&mut self, schedule: &mut Schedule) -> Result<()> {
        while schedule.issuing {
            let Some(&conn) = schedule.idle.front() else {
                break;
            };
            let Some(config) = self.next_config(schedule)? else {
                break;
            };
            schedule.idle.pop_front();
            let trial_id = schedule.issued;
            schedule.issued += 1;
            let task = Message::Task {
                trial_id,
                config: config.clone(),
                time_limit: self.config.parallel.optimizer.time_limit_per_trial,
                num_objectives: self.config.parallel.optimizer.advisor.num_objectives,
                num_constraints: self.config.parallel.optimizer.advisor.num_constraints,
            };
            if let Some((worker_id, outbox)) = schedule.workers.get(&conn) {
                debug!("Send trial {trial_id} to worker {worker_id}: {config}");
                // the trial fails when the Left event of the worker is handled
                if outbox.send(task).is_err() {
                    debug!("Worker {worker_id} is disconnected, trial {trial_id} not sent");
                }
            }
            schedule.outstanding.insert(
                trial_id,
                PendingTrial {
                    conn,
                    config,
                    start: Instant::now(),
                },
            );
        }
        Ok(())
    }

    fn handle(&mut self, schedule: &mut Schedule, event: Event) -> Result<()> {
        match event {
            Event::Joined {
                conn,
                worker_id,
                outbox,
            } => {
                info!("Worker {worker_id} joined");
                schedule.workers.insert(conn, (worker_id, outbox));
            }
            Event::Ready { conn } => {
                if schedule.workers.contains_key(&conn) {
                    schedule.idle.push_back(conn);
                }
            }
            Event::Result {
                trial_id,
                observation,
            } => match schedule.outstanding.remove(&trial_id) {
                Some(pending) => {
                    let mut observation = observation;
                    observation.config = pending.config;
                    self.record(schedule, observation)?;
                }
                None => warn!("Ignore result of unknown trial {trial_id}"),
            },
            Event::Left { conn } => {
                if let Some((worker_id, _)) = schedule.workers.remove(&conn) {
                    info!("Worker {worker_id} left");
                }
                schedule.idle.retain(|c| *c != conn);
                let lost: Vec<usize> = schedule
                    .outstanding
                    .iter()
                    .filter(|(_, p)| p.conn == conn)
                    .map(|(id, _)| *id)
                    .collect();
                for trial_id in lost {
                    if let Some(pending) = schedule.outstanding.remove(&trial_id) {
                        warn!("Worker disconnected during trial {trial_id}, mark it failed");
                        let advisor = &self.config.parallel.optimizer.advisor;
                        let obs = Observation::failed(
                            pending.config,
                            TrialState::Failed,
                            advisor.num_objectives,
                            advisor.num_constraints,
                            pending.start.elapsed().as_secs_f64(),
                        );
                        self.record(schedule, obs)?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn serve(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("Master listening on {addr}");

        let authkey = Arc::new(self.config.authkey.clone());
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut connections = JoinSet::new();
        let mut next_conn = 0;
        let mut schedule = Schedule {
            issued: self.get_history().len(),
            issuing: true,
            ..Default::default()
        };
        let mut ticker = tokio::time::interval(TICK);
        let start = Instant::now();
        let max_runs = self.config.parallel.optimizer.max_runs;

        while self.get_history().len() < max_runs {
            if schedule.issuing && self.config.parallel.optimizer.runtime_exceeded(&start) {
                info!("Max runtime reached, wait for running trials");
                schedule.issuing = false;
                schedule.round.clear();
            }
            if !schedule.issuing && schedule.outstanding.is_empty() {
                break;
            }
            self.dispatch(&mut schedule)?;

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        debug!("Connection from {peer}");
                        let conn = next_conn;
                        next_conn += 1;
                        let authkey = authkey.clone();
                        let events = events_tx.clone();
                        connections.spawn(async move {
                            if let Err(err) = serve_worker(conn, socket, authkey, events.clone()).await {
                                warn!("Connection with {peer} failed: {err}");
                            }
                            let _ = events.send(Event::Left { conn });
                        });
                    }
                    Err(err) => warn!("Accept error: {err}"),
                },
                Some(event) = events.recv() => self.handle(&mut schedule, event)?,
                _ = ticker.tick() => {}
            }
        }

        info!("Shut down {} workers", schedule.workers.len());
        for (_, outbox) in schedule.workers.values() {
            let _ = outbox.send(Message::Shutdown);
        }
        drop(schedule);
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        connections.abort_all();
        Ok(())
    }
}

/// Handles a worker connection: handshake then message forwarding both ways
async fn serve_worker(
    conn: usize,
    socket: TcpStream,
    authkey: Arc<String>,
    events: mpsc::UnboundedSender<Event>,
) -> Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    let worker_id = match recv(&mut lines).await? {
        Some(Message::Hello {
            authkey: key,
            worker_id,
        }) => {
            if key != *authkey {
                warn!("Reject worker {worker_id}: wrong authkey");
                send(
                    &mut writer,
                    &Message::Rejected {
                        reason: "wrong authkey".to_string(),
                    },
                )
                .await?;
                return Ok(());
            }
            worker_id
        }
        Some(other) => {
            return Err(OpenBoxError::ProtocolError(format!(
                "expected Hello, got {other:?}"
            )))
        }
        None => return Ok(()),
    };
    send(&mut writer, &Message::Welcome).await?;

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let _ = events.send(Event::Joined {
        conn,
        worker_id,
        outbox,
    });
    loop {
        tokio::select! {
            outgoing = inbox.recv() => match outgoing {
                Some(msg) => {
                    send(&mut writer, &msg).await?;
                    if msg == Message::Shutdown {
                        return Ok(());
                    }
                }
                None => return Ok(()),
            },
            incoming = recv(&mut lines) => match incoming? {
                Some(Message::Ready) => {
                    let _ = events.send(Event::Ready { conn });
                }
                Some(Message::Result { trial_id, observation }) => {
                    let _ = events.send(Event::Result { trial_id, observation });
                }
                Some(other) => {
                    return Err(OpenBoxError::ProtocolError(format!(
                        "unexpected message from worker: {other:?}"
                    )))
                }
                None => return Ok(()),
            },
        }
    }
}

static WORKER_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Worker evaluating configurations sent by a [`DistributedOptimizer`]
pub struct DistributedWorker<O: ObjectiveFn> {
    fobj: O,
    master_addr: String,
    authkey: String,
    worker_id: String,
    connect_timeout: Duration,
}

impl<O: ObjectiveFn> DistributedWorker<O> {
    /// Worker evaluating `fobj` for the master listening at `master_addr` (`ip:port`)
    pub fn new(fobj: O, master_addr: impl Into<String>, authkey: impl Into<String>) -> Self {
        DistributedWorker {
            fobj,
            master_addr: master_addr.into(),
            authkey: authkey.into(),
            worker_id: format!(
                "worker-{}-{}",
                std::process::id(),
                WORKER_COUNT.fetch_add(1, Ordering::Relaxed)
            ),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the label of the worker
    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Sets how long connection to the master is retried
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Evaluates tasks until the master shuts the worker down.
    /// Returns the number of evaluated tasks.
    pub fn run(&self) -> Result<usize> {
        init_logger();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.serve())
    }

    async fn connect(&self) -> Result<TcpStream> {
        let start = Instant::now();
        loop {
            match TcpStream::connect(&self.master_addr).await {
                Ok(socket) => return Ok(socket),
                Err(err) if start.elapsed() < self.connect_timeout => {
                    debug!("Cannot reach master at {}: {err}, retry", self.master_addr);
                    tokio::time::sleep(TICK).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn serve(&self) -> Result<usize> {
        let socket = self.connect().await?;
        let (reader, mut writer) = socket.into_split();
        let mut lines = BufReader::new(reader).lines();

        send(
            &mut writer,
            &Message::Hello {
                authkey: self.authkey.clone(),
                worker_id: self.worker_id.clone(),
            },
        )
        .await?;
        match recv(&mut lines).await? {
            Some(Message::Welcome) => info!("Worker {} connected to {}", self.worker_id, self.master_addr),
            Some(Message::Rejected { reason }) => return Err(OpenBoxError::AuthError(reason)),
            Some(other) => {
                return Err(OpenBoxError::ProtocolError(format!(
                    "expected Welcome, got {other:?}"
                )))
            }
            None => {
                return Err(OpenBoxError::ProtocolError(
                    "connection closed during handshake".to_string(),
                ))
            }
        }

        let mut count = 0;
        loop {
            send(&mut writer, &Message::Ready).await?;
            match recv(&mut lines).await? {
                Some(Message::Task {
                    trial_id,
                    config,
                    time_limit,
                    num_objectives,
                    num_constraints,
                }) => {
                    debug!("Worker {} evaluates trial {trial_id}: {config}", self.worker_id);
                    let fobj = self.fobj.clone();
                    let observation = tokio::task::spawn_blocking(move || {
                        run_trial(&fobj, &config, time_limit, num_objectives, num_constraints)
                    })
                    .await?;
                    send(
                        &mut writer,
                        &Message::Result {
                            trial_id,
                            observation,
                        },
                    )
                    .await?;
                    count += 1;
                }
                Some(Message::Shutdown) => break,
                None => {
                    info!("Master closed the connection");
                    break;
                }
                Some(other) => {
                    return Err(OpenBoxError::ProtocolError(format!(
                        "unexpected message from master: {other:?}"
                    )))
                }
            }
        }
        info!("Worker {} stops after {count} trials", self.worker_id);
        Ok(count)
    }
}
