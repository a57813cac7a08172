//! The map → group-by-key → reduce driver shared by every stage.
//!
//! # Execution model
//!
//! ```text
//! partitions ──map (N workers)──▶ (key, value)* ──group by key──▶ key → [value]
//!                                                                    │
//!                   (key, output)* in key order ◀──reduce (N workers)┘
//! ```
//!
//! - **Map**: [`run`] deals in-memory partitions round-robin to `workers`
//!   scoped threads. [`run_streaming`] hands partitions to idle workers as
//!   they are produced, so at most `workers` unmapped partitions are buffered.
//!   Each worker owns its counters; a record the map function rejects is
//!   logged, counted under [`MAP_ERRORS`] and dropped without affecting its
//!   siblings.
//! - **Group by key**: every value of a key is collected before any reduce
//!   starts. Within a group, values keep partition order, then record order,
//!   so the delivery order does not depend on thread scheduling.
//! - **Reduce**: the sorted groups are split into contiguous chunks, one per
//!   worker. A group the reduce function rejects is logged and counted under
//!   [`REDUCE_ERRORS`].
//!
//! The output is always sorted by key.

use std::{
    collections::BTreeMap,
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread,
};

use crate::counters::{Counters, MAP_ERRORS, OUTPUT_RECORDS, REDUCE_ERRORS, ROWS_PROCESSED};

/// One map/reduce pass.
pub trait Stage: Sync {
    type Input: Sync;
    type Key: Ord + fmt::Debug + Send;
    type Value: Send;
    type Output: Send;
    type MapError: fmt::Display;
    type ReduceError: fmt::Display;

    /// Stage name, used as the counter group and in logs.
    fn name(&self) -> &'static str;

    /// Turns one input record into zero or more keyed values.
    ///
    /// A rejected record emits nothing.
    fn map(&self, input: &Self::Input) -> Result<Vec<(Self::Key, Self::Value)>, Self::MapError>;

    /// Folds every value delivered for `key` into one output.
    fn reduce(
        &self,
        key: &Self::Key,
        values: Vec<Self::Value>,
    ) -> Result<Self::Output, Self::ReduceError>;
}

/// Result of running a [`Stage`].
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<K, O> {
    pub name: &'static str,
    /// Reduced records in ascending key order.
    pub records: Vec<(K, O)>,
    pub counters: Counters,
}

#[derive(Debug)]
struct MapTaskOutput<K, V> {
    partitions: Vec<(usize, Vec<(K, V)>)>,
    counters: Counters,
}

impl<K, V> MapTaskOutput<K, V> {
    fn new() -> Self {
        Self {
            partitions: vec![],
            counters: Counters::new(),
        }
    }

    fn map_partition<S>(&mut self, stage: &S, index: usize, partition: &[S::Input])
    where
        S: Stage<Key = K, Value = V>,
    {
        let mut pairs = vec![];
        for input in partition {
            self.counters.increment(ROWS_PROCESSED, 1);
            match stage.map(input) {
                Ok(emitted) => pairs.extend(emitted),
                Err(e) => {
                    tracing::warn!(stage = stage.name(), partition = index, "skipping record: {e}");
                    self.counters.increment(MAP_ERRORS, 1);
                }
            }
        }
        self.partitions.push((index, pairs));
    }
}

#[derive(Debug)]
struct ReduceTaskOutput<K, O> {
    records: Vec<(K, O)>,
    counters: Counters,
}

/// Runs `stage` over `partitions` with up to `workers` threads per phase.
pub fn run<S>(
    stage: &S,
    partitions: &[Vec<S::Input>],
    workers: NonZeroUsize,
) -> StageOutput<S::Key, S::Output>
where
    S: Stage,
{
    let map_workers = workers.get().min(partitions.len()).max(1);
    tracing::debug!(
        stage = stage.name(),
        partitions = partitions.len(),
        workers = map_workers,
        "starting map phase"
    );

    let map_outputs = thread::scope(|s| {
        let handles = (0..map_workers)
            .map(|worker| {
                s.spawn(move || {
                    let mut output = MapTaskOutput::new();
                    for (index, partition) in partitions
                        .iter()
                        .enumerate()
                        .skip(worker)
                        .step_by(map_workers)
                    {
                        output.map_partition(stage, index, partition);
                    }
                    output
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    });

    group_and_reduce(stage, map_outputs, workers)
}

/// Runs `stage` over partitions produced one at a time, mapping each as soon
/// as a worker is free.
///
/// Reading stops at the first `Err` from `partitions`; that error is returned
/// once the partitions already handed out have been mapped, and no reduce
/// runs.
pub fn run_streaming<S, P, E>(
    stage: &S,
    partitions: P,
    workers: NonZeroUsize,
) -> Result<StageOutput<S::Key, S::Output>, E>
where
    S: Stage,
    S::Input: Send,
    P: IntoIterator<Item = Result<Vec<S::Input>, E>>,
{
    let map_workers = workers.get();
    tracing::debug!(
        stage = stage.name(),
        workers = map_workers,
        "starting streaming map phase"
    );

    let (sender, receiver) = mpsc::sync_channel::<(usize, Vec<S::Input>)>(map_workers);
    // Workers hold the only receivers, so sending fails instead of blocking
    // once every worker has exited.
    let receiver = Arc::new(Mutex::new(receiver));
    let (map_outputs, read_result) = thread::scope(|s| {
        let handles = (0..map_workers)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                s.spawn(move || {
                    let mut output = MapTaskOutput::new();
                    loop {
                        let next = receiver
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .recv();
                        let Ok((index, partition)) = next else {
                            break;
                        };
                        output.map_partition(stage, index, &partition);
                    }
                    output
                })
            })
            .collect::<Vec<_>>();
        drop(receiver);

        let mut read_result = Ok(());
        for (index, partition) in partitions.into_iter().enumerate() {
            match partition {
                Ok(partition) => {
                    if sender.send((index, partition)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    read_result = Err(e);
                    break;
                }
            }
        }
        drop(sender);

        let outputs = handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>();
        (outputs, read_result)
    });
    read_result?;

    Ok(group_and_reduce(stage, map_outputs, workers))
}

fn group_and_reduce<S>(
    stage: &S,
    map_outputs: Vec<MapTaskOutput<S::Key, S::Value>>,
    workers: NonZeroUsize,
) -> StageOutput<S::Key, S::Output>
where
    S: Stage,
{
    let name = stage.name();
    let mut counters = Counters::new();
    let mut mapped = vec![];
    for output in map_outputs {
        counters.merge(&output.counters);
        mapped.extend(output.partitions);
    }
    mapped.sort_by_key(|(index, _)| *index);

    let mut groups = BTreeMap::<S::Key, Vec<S::Value>>::new();
    for (key, value) in mapped.into_iter().flat_map(|(_, pairs)| pairs) {
        groups.entry(key).or_default().push(value);
    }
    tracing::debug!(stage = name, groups = groups.len(), "starting reduce phase");

    let reduce_workers = workers.get().min(groups.len()).max(1);
    let chunk_size = groups.len().div_ceil(reduce_workers).max(1);
    let mut chunks = vec![];
    let mut groups = groups.into_iter();
    loop {
        let chunk = groups.by_ref().take(chunk_size).collect::<Vec<_>>();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }

    let reduce_outputs = thread::scope(|s| {
        let handles = chunks
            .into_iter()
            .map(|chunk| s.spawn(move || reduce_task(stage, chunk)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    });

    let mut records = vec![];
    for output in reduce_outputs {
        counters.merge(&output.counters);
        records.extend(output.records);
    }

    tracing::info!(
        stage = name,
        rows = counters.get(ROWS_PROCESSED),
        map_errors = counters.get(MAP_ERRORS),
        reduce_errors = counters.get(REDUCE_ERRORS),
        output = counters.get(OUTPUT_RECORDS),
        "stage complete"
    );

    StageOutput {
        name,
        records,
        counters,
    }
}

fn reduce_task<S>(
    stage: &S,
    groups: Vec<(S::Key, Vec<S::Value>)>,
) -> ReduceTaskOutput<S::Key, S::Output>
where
    S: Stage,
{
    let mut output = ReduceTaskOutput {
        records: Vec::with_capacity(groups.len()),
        counters: Counters::new(),
    };
    for (key, values) in groups {
        match stage.reduce(&key, values) {
            Ok(reduced) => {
                output.records.push((key, reduced));
                output.counters.increment(OUTPUT_RECORDS, 1);
            }
            Err(e) => {
                tracing::warn!(stage = stage.name(), key = ?key, "skipping group: {e}");
                output.counters.increment(REDUCE_ERRORS, 1);
            }
        }
    }
    output
}
