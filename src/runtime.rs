//! Agent runtime
//!
//! Owns the long-lived pieces: the agent, the per-channel debouncer, the
//! cognitive cycles and their scheduler. Routes inbound messages and runs
//! the startup pass before the periodic cycles begin.

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::{Agent, AgentSettings, StateReport};
use crate::channels::{ChatTransport, InboundMessage};
use crate::cognition::{CognitiveCycles, ConsolidationReport};
use crate::config::Config;
use crate::debounce::{ChannelDebouncer, PendingMessage};
use crate::memory::{ConversationRecord, SharedMemory};
use crate::oracle::Oracle;
use crate::scheduler::CognitiveCycleScheduler;

/// Where an inbound message went
#[derive(Debug)]
pub enum Routing {
    /// Posted by the agent itself
    Ignored,
    /// Direct mention, handled right away
    Mention(JoinHandle<Option<ConversationRecord>>),
    /// Queued in the channel's debouncer
    Debounced,
}

pub struct AgentRuntime {
    agent: Arc<Agent>,
    debouncer: Arc<ChannelDebouncer>,
    cycles: Arc<CognitiveCycles>,
    scheduler: CognitiveCycleScheduler,
    shutdown_tx: watch::Sender<bool>,
}

impl AgentRuntime {
    pub fn new(
        config: &Config,
        transport: Arc<dyn ChatTransport>,
        oracle: Arc<dyn Oracle>,
        memory: Arc<SharedMemory>,
    ) -> Arc<Self> {
        let agent = Arc::new(Agent::new(
            AgentSettings::from_config(config),
            transport,
            Arc::clone(&oracle),
            Arc::clone(&memory),
        ));

        let debouncer = ChannelDebouncer::new(
            config.timing.debounce_window,
            config.timing.trailing_flush,
            agent.clone(),
        );

        let cycles = Arc::new(CognitiveCycles::new(
            oracle,
            memory,
            &config.agent_name,
            &config.personality,
        ));
        let scheduler = CognitiveCycleScheduler::new(cycles.clone(), &config.timing);

        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            agent,
            debouncer,
            cycles,
            scheduler,
            shutdown_tx,
        })
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn debouncer(&self) -> &Arc<ChannelDebouncer> {
        &self.debouncer
    }

    pub fn cycles(&self) -> &Arc<CognitiveCycles> {
        &self.cycles
    }

    pub fn scheduler(&self) -> &CognitiveCycleScheduler {
        &self.scheduler
    }

    /// Receiver that flips to `true` on shutdown
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Startup consolidation, then the periodic cycles, then a state report
    pub async fn startup(&self) -> (ConsolidationReport, StateReport) {
        info!("💻 {} waking up", self.agent.name());
        let consolidation = self.cycles.startup().await;
        self.scheduler.start();
        let state = self.agent.state_report().await;
        (consolidation, state)
    }

    /// Route one inbound message. Queueing is synchronous so per-channel
    /// arrival order is kept; mentions run on their own task.
    pub fn handle_inbound(self: &Arc<Self>, message: InboundMessage) -> Routing {
        if self.agent.is_own_message(&message) {
            return Routing::Ignored;
        }

        if message.mentions_self {
            debug!("Mention from {} in {}", message.author_display_name, message.channel_name);
            let agent = Arc::clone(&self.agent);
            return Routing::Mention(tokio::spawn(async move {
                agent.handle_mention(&message).await
            }));
        }

        self.debouncer.on_message(
            &message.channel_id,
            &message.channel_name,
            PendingMessage::new(message.author_display_name, message.content),
        );
        Routing::Debounced
    }

    /// Consume inbound messages until shutdown or until the sender side closes
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::Receiver<InboundMessage>) {
        let mut shutdown = self.shutdown_signal();

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        self.handle_inbound(message);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("💻 Inbound loop stopped");
    }

    /// Stop the loops and write the memory one last time
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.scheduler.shutdown().await;
        self.agent.memory().persist().await;
        info!("💻 {} is going to sleep", self.agent.name());
    }
}
