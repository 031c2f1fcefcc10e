//! Batch processing with ordered stages and independent partitions
//!
//! This module provides the `BatchProcessor`, which applies a batch of
//! commands concurrently where that cannot change the outcome.
//!
//! # Design
//!
//! A batch is cut into stages that run one after another:
//!
//! - a run of consecutive `create` commands is one stage applied in file
//!   order, since account ids are handed out in creation order and a later
//!   command may depend on an account existing
//! - the commands between such runs form a stage that is split into
//!   partitions by connected component: two users are in the same component
//!   when a transfer in the stage links them
//!
//! Partitions of a stage touch disjoint sets of accounts, so they run
//! concurrently on tokio's blocking pool (the ledger core is synchronous).
//! Inside a partition commands keep their file order. The final accounts are
//! therefore the same as replaying the batch one command at a time.

use crate::core::{Clock, LedgerStore, WalletService};
use crate::strategy::{apply_command, ReplaySummary};
use crate::types::{CommandRecord, CommandType, LedgerError, UserId};
use futures::future::join_all;
use std::collections::HashMap;
use std::mem;

/// Commands that must run in order, on one task
pub type Partition = Vec<CommandRecord>;

/// Result of applying a single command
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The command that was applied
    pub command: CommandRecord,

    /// Whether the ledger accepted it
    pub result: Result<(), LedgerError>,
}

/// Applies batches of commands stage by stage
#[derive(Debug)]
pub struct BatchProcessor<S, C> {
    service: WalletService<S, C>,
}

impl<S, C> Clone for BatchProcessor<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

/// Root of `user`'s component, compressing the path on the way
fn find_root(parents: &mut HashMap<UserId, UserId>, user: UserId) -> UserId {
    let parent = *parents.entry(user).or_insert(user);
    if parent == user {
        return user;
    }
    let root = find_root(parents, parent);
    parents.insert(user, root);
    root
}

/// Split commands into partitions of users linked by transfers
///
/// Each command lands in exactly one partition and keeps its relative order
/// within it. Partitions are returned in order of their first command.
pub fn partition_by_component(commands: Vec<CommandRecord>) -> Vec<Partition> {
    let mut parents: HashMap<UserId, UserId> = HashMap::new();

    for command in &commands {
        let source = find_root(&mut parents, command.user);
        if let (CommandType::Transfer, Some(to_user)) = (command.op, command.to_user) {
            let destination = find_root(&mut parents, to_user);
            if source != destination {
                parents.insert(destination, source);
            }
        }
    }

    let mut partitions: Vec<Partition> = Vec::new();
    let mut slots: HashMap<UserId, usize> = HashMap::new();
    for command in commands {
        let root = find_root(&mut parents, command.user);
        let slot = *slots.entry(root).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[slot].push(command);
    }
    partitions
}

/// Cut a batch into stages at every run of `create` commands
///
/// A stage of creates is a single partition; any other stage is partitioned
/// by component.
pub fn plan_stages(batch: Vec<CommandRecord>) -> Vec<Vec<Partition>> {
    let mut stages = Vec::new();
    let mut creates: Partition = Vec::new();
    let mut pending: Vec<CommandRecord> = Vec::new();

    for command in batch {
        if command.op == CommandType::Create {
            if !pending.is_empty() {
                stages.push(partition_by_component(mem::take(&mut pending)));
            }
            creates.push(command);
        } else {
            if !creates.is_empty() {
                stages.push(vec![mem::take(&mut creates)]);
            }
            pending.push(command);
        }
    }

    if !creates.is_empty() {
        stages.push(vec![creates]);
    }
    if !pending.is_empty() {
        stages.push(partition_by_component(pending));
    }
    stages
}

impl<S, C> BatchProcessor<S, C>
where
    S: LedgerStore + 'static,
    C: Clock + 'static,
{
    pub fn new(service: WalletService<S, C>) -> Self {
        Self { service }
    }

    /// Apply one partition's commands in order
    ///
    /// Every command is attempted even if an earlier one was rejected.
    pub fn process_partition(&self, commands: Partition) -> Vec<CommandOutcome> {
        commands
            .into_iter()
            .map(|command| {
                let result = apply_command(&self.service, &command);
                CommandOutcome { command, result }
            })
            .collect()
    }

    /// Apply a batch, one stage after another
    pub async fn process_batch(&self, batch: Vec<CommandRecord>) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for stage in plan_stages(batch) {
            outcomes.extend(self.process_stage(stage).await);
        }
        outcomes
    }

    /// Run the partitions of one stage concurrently and wait for all of them
    ///
    /// A partition whose task panicked is logged and contributes no outcomes.
    async fn process_stage(&self, partitions: Vec<Partition>) -> Vec<CommandOutcome> {
        let tasks = partitions.into_iter().map(|commands| {
            let processor = self.clone();
            tokio::task::spawn_blocking(move || processor.process_partition(commands))
        });

        let mut outcomes = Vec::new();
        for joined in join_all(tasks).await {
            match joined {
                Ok(partition) => outcomes.extend(partition),
                Err(error) => tracing::error!(%error, "Partition task failed"),
            }
        }
        outcomes
    }
}

/// Tally a batch's outcomes
pub fn summarize(outcomes: &[CommandOutcome]) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    for outcome in outcomes {
        summary.record(&outcome.result);
    }
    summary
}
