use std::collections::BTreeMap;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use anyhow::Result;
use shared::types::{Action, ServiceReport};
use crate::config::ServiceConfig;
use super::service::ServiceWatcher;

/// All service watchers, fed from the single inbound action stream
#[derive(Debug)]
pub struct Registry {
    watchers: Vec<ServiceWatcher>,
}

impl Registry {
    pub fn new(services: &[ServiceConfig]) -> Self {
        Self {
            watchers: services.iter().map(ServiceWatcher::new).collect(),
        }
    }

    /// Hand the action to every watcher; each decides relevance itself
    pub fn dispatch(&mut self, action: &Action) {
        let now = Utc::now();
        for watcher in &mut self.watchers {
            watcher.handle_action(action, now);
        }
    }

    /// Snapshot every service, keyed by handle
    pub fn build_all(&self) -> BTreeMap<String, ServiceReport> {
        self.watchers
            .iter()
            .map(|watcher| (watcher.handle().to_string(), watcher.report()))
            .collect()
    }

    pub fn build_one(&self, handle: &str) -> Option<ServiceReport> {
        self.watchers
            .iter()
            .find(|watcher| watcher.handle() == handle)
            .map(ServiceWatcher::report)
    }
}

/// Commands sent to the registry task
pub enum RegistryCommand {
    ReportAll(oneshot::Sender<BTreeMap<String, ServiceReport>>),
    ReportOne(String, oneshot::Sender<Option<ServiceReport>>),
    Shutdown,
}

/// Handle for reading reports from the registry task
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry task. It owns every watcher, so events and
    /// reports are serialized and snapshots are never torn.
    pub fn spawn(registry: Registry, actions: mpsc::Receiver<Action>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<RegistryCommand>(64);
        let task = tokio::spawn(run(registry, actions, rx));
        (Self { tx }, task)
    }

    /// Reports for every watched service
    pub async fn report_all(&self) -> Result<BTreeMap<String, ServiceReport>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::ReportAll(reply)).await?;
        Ok(rx.await?)
    }

    /// Report for one service, None if the handle is not watched
    pub async fn report_one(&self, handle: String) -> Result<Option<ServiceReport>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(RegistryCommand::ReportOne(handle, reply)).await?;
        Ok(rx.await?)
    }

    /// Stop the registry task once every report queued before this call
    /// has been answered
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(RegistryCommand::Shutdown).await?;
        Ok(())
    }
}

/// Registry event loop - applies actions in arrival order and answers reports.
/// Runs until told to shut down or every handle is dropped; a closed action
/// stream only stops event handling.
pub async fn run(
    mut registry: Registry,
    mut actions: mpsc::Receiver<Action>,
    mut commands: mpsc::Receiver<RegistryCommand>,
) {
    tracing::info!("Watching {} services", registry.watchers.len());
    let mut actions_open = true;

    loop {
        tokio::select! {
            action = actions.recv(), if actions_open => {
                match action {
                    Some(action) => {
                        tracing::trace!("Action {}", action.action_type);
                        registry.dispatch(&action);
                    }
                    None => {
                        tracing::info!("Action stream closed");
                        actions_open = false;
                    }
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(RegistryCommand::ReportAll(reply)) => {
                        let _ = reply.send(registry.build_all());
                    }
                    Some(RegistryCommand::ReportOne(handle, reply)) => {
                        let _ = reply.send(registry.build_one(&handle));
                    }
                    Some(RegistryCommand::Shutdown) | None => {
                        tracing::info!("Registry shutting down");
                        break;
                    }
                }
            }
        }
    }
}
