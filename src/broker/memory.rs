//! Embedded log broker engine.
//!
//! Partitioned topics, key-hash routing, consumer groups with committed
//! offsets and cooperative-sticky incremental rebalancing. All state sits
//! behind one mutex; nothing awaits while holding it.
//!
//! Group policy matches the worker's deployment settings: start from the
//! earliest offset when nothing is committed, report end-of-partition, and
//! move partitions incrementally.

use super::assignor;
use super::{ConsumeError, Consumer, Delivery, DeliveryReport, Producer, Record, TopicPartition};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

struct StoredRecord {
    key: String,
    value: Vec<u8>,
    timestamp: DateTime<Utc>,
}

enum Notice {
    Assigned(Vec<i32>),
    Revoked(Vec<i32>),
    Lost(Vec<i32>),
}

struct Member {
    /// Everything this member holds, including partitions being revoked.
    owned: BTreeSet<i32>,
    /// Subset of `owned` the member has been asked to give back.
    revoking: BTreeSet<i32>,
    /// Out of the group after a missed session; rejoins once it observes the loss.
    fenced: bool,
    pending: VecDeque<Notice>,
    wake: Arc<Notify>,
}

#[derive(Default)]
struct Group {
    topic: Option<String>,
    members: BTreeMap<String, Member>,
    committed: HashMap<i32, i64>,
    generation: u64,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    groups: HashMap<String, Group>,
    next_member: u64,
    consume_faults: u32,
    publish_faults: u32,
}

impl State {
    fn partition_count(&self, topic: &str) -> i32 {
        self.topics.get(topic).map_or(0, |p| p.len() as i32)
    }

    /// Run rebalance steps for `group` and queue the resulting notices.
    fn rebalance(&mut self, group_id: &str) {
        let Some(group) = self.groups.get(group_id) else {
            return;
        };
        let partitions = group
            .topic
            .as_deref()
            .map_or(0, |t| self.partition_count(t));

        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        let ids: Vec<String> = group
            .members
            .iter()
            .filter(|(_, m)| !m.fenced)
            .map(|(id, _)| id.clone())
            .collect();
        let stable: Vec<BTreeSet<i32>> = ids
            .iter()
            .map(|id| {
                let m = &group.members[id];
                m.owned.difference(&m.revoking).copied().collect()
            })
            .collect();
        let releasing: BTreeSet<i32> = group
            .members
            .values()
            .flat_map(|m| m.revoking.iter().copied())
            .collect();

        let plans = assignor::plan(&stable, &releasing, partitions);
        if plans.iter().all(assignor::MemberPlan::is_empty) {
            return;
        }

        group.generation += 1;
        for (id, plan) in ids.iter().zip(plans) {
            let Some(member) = group.members.get_mut(id) else {
                continue;
            };
            if !plan.revoke.is_empty() {
                member.revoking.extend(plan.revoke.iter().copied());
                member.pending.push_back(Notice::Revoked(plan.revoke));
            }
            if !plan.assign.is_empty() {
                member.owned.extend(plan.assign.iter().copied());
                member.pending.push_back(Notice::Assigned(plan.assign));
            }
            member.wake.notify_one();
        }
        debug!(group = group_id, generation = group.generation, "group rebalanced");
    }

    fn wake_topic(&self, topic: &str) {
        for group in self.groups.values() {
            if group.topic.as_deref() == Some(topic) {
                for member in group.members.values() {
                    member.wake.notify_one();
                }
            }
        }
    }

    fn wake_all(&self) {
        for group in self.groups.values() {
            for member in group.members.values() {
                member.wake.notify_one();
            }
        }
    }

    /// Move stored offsets for partitions the member still owns into the
    /// group. Offsets for partitions it no longer owns are dropped so the
    /// new owner re-reads them.
    fn commit(&mut self, group_id: &str, member_id: &str, stored: &mut HashMap<i32, i64>) {
        let Some(group) = self.groups.get_mut(group_id) else {
            stored.clear();
            return;
        };
        let owned = group
            .members
            .get(member_id)
            .filter(|m| !m.fenced)
            .map(|m| m.owned.clone())
            .unwrap_or_default();
        for (partition, offset) in stored.drain() {
            if owned.contains(&partition) {
                group.committed.insert(partition, offset);
            } else {
                debug!(
                    group = group_id,
                    member = member_id,
                    partition,
                    offset,
                    "dropping commit for partition no longer owned"
                );
            }
        }
    }
}

/// FNV-1a over the key bytes. Stable across processes and runs.
fn partition_for(key: &str, partitions: i32) -> i32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    (hash % partitions as u32) as i32
}

/// In-process log broker. Cloning yields another handle to the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("broker state poisoned".to_string()))
    }

    /// Create `topic` with `partitions` partitions. Idempotent for an
    /// existing topic; groups already waiting on it are rebalanced.
    pub fn create_topic(&self, topic: &str, partitions: i32) -> Result<()> {
        if partitions <= 0 {
            return Err(Error::Config(format!(
                "topic {topic} needs at least one partition"
            )));
        }
        let mut state = self.lock()?;
        if state.topics.contains_key(topic) {
            return Ok(());
        }
        state
            .topics
            .insert(topic.to_string(), (0..partitions).map(|_| Vec::new()).collect());
        let waiting: Vec<String> = state
            .groups
            .iter()
            .filter(|(_, g)| g.topic.as_deref() == Some(topic))
            .map(|(id, _)| id.clone())
            .collect();
        for group_id in waiting {
            state.rebalance(&group_id);
        }
        info!(topic, partitions, "topic created");
        Ok(())
    }

    /// A new, unsubscribed consumer in `group`.
    pub fn consumer(&self, group: &str) -> MemoryConsumer {
        MemoryConsumer {
            broker: self.clone(),
            group: group.to_string(),
            member_id: None,
            topic: None,
            wake: Arc::new(Notify::new()),
            positions: HashMap::new(),
            stored: HashMap::new(),
            eof_reported: HashSet::new(),
            cursor: 0,
            closed: false,
        }
    }

    /// Make the next `n` consume calls fail with a transient error.
    pub fn inject_consume_errors(&self, n: u32) -> Result<()> {
        let mut state = self.lock()?;
        state.consume_faults = n;
        state.wake_all();
        Ok(())
    }

    /// Make the next `n` publishes fail.
    pub fn fail_publishes(&self, n: u32) -> Result<()> {
        self.lock()?.publish_faults = n;
        Ok(())
    }

    /// Simulate a missed session: the member is fenced and its partitions are
    /// handed to the rest of the group without committing.
    pub fn expire_member(&self, group_id: &str, member_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let group = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| Error::Other(format!("unknown group {group_id}")))?;
        let member = group
            .members
            .get_mut(member_id)
            .ok_or_else(|| Error::Other(format!("unknown member {member_id}")))?;
        let lost: Vec<i32> = std::mem::take(&mut member.owned).into_iter().collect();
        member.revoking.clear();
        member.pending.clear();
        member.fenced = true;
        member.pending.push_back(Notice::Lost(lost));
        member.wake.notify_one();
        warn!(group = group_id, member = member_id, "member session expired");
        state.rebalance(group_id);
        Ok(())
    }

    /// Committed offset (next offset to read) for a partition, if any.
    pub fn committed_offset(&self, group_id: &str, partition: i32) -> Result<Option<i64>> {
        let state = self.lock()?;
        Ok(state
            .groups
            .get(group_id)
            .and_then(|g| g.committed.get(&partition).copied()))
    }

    /// Offset the next record appended to the partition will get.
    pub fn end_offset(&self, topic: &str, partition: i32) -> Result<i64> {
        let state = self.lock()?;
        state
            .topics
            .get(topic)
            .and_then(|parts| parts.get(partition as usize))
            .map(|log| log.len() as i64)
            .ok_or_else(|| Error::Other(format!("unknown partition {topic}[{partition}]")))
    }

    /// Current owner of each partition of the group's topic.
    pub fn owners(&self, group_id: &str) -> Result<BTreeMap<i32, String>> {
        let state = self.lock()?;
        let mut owners = BTreeMap::new();
        if let Some(group) = state.groups.get(group_id) {
            for (id, member) in &group.members {
                for &p in &member.owned {
                    owners.insert(p, id.clone());
                }
            }
        }
        Ok(owners)
    }

    /// Partition a key routes to on `topic`.
    pub fn partition_of(&self, topic: &str, key: &str) -> Result<i32> {
        let state = self.lock()?;
        match state.partition_count(topic) {
            0 => Err(Error::Other(format!("unknown topic {topic}"))),
            n => Ok(partition_for(key, n)),
        }
    }
}

#[async_trait]
impl Producer for MemoryBroker {
    async fn send(&self, topic: &str, key: &str, value: Vec<u8>) -> Result<DeliveryReport> {
        let mut state = self.lock().map_err(|e| Error::Publish(e.to_string()))?;
        if state.publish_faults > 0 {
            state.publish_faults -= 1;
            return Err(Error::Publish("broker transport failure".to_string()));
        }
        let log = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| Error::Publish(format!("unknown topic {topic}")))?;
        let partition = partition_for(key, log.len() as i32);
        let records = &mut log[partition as usize];
        let offset = records.len() as i64;
        records.push(StoredRecord {
            key: key.to_string(),
            value,
            timestamp: Utc::now(),
        });
        state.wake_topic(topic);
        Ok(DeliveryReport { partition, offset })
    }
}

/// A consumer-group member of a [`MemoryBroker`].
pub struct MemoryConsumer {
    broker: MemoryBroker,
    group: String,
    member_id: Option<String>,
    topic: Option<String>,
    wake: Arc<Notify>,
    /// Next offset to fetch, per assigned partition.
    positions: HashMap<i32, i64>,
    /// Processed-but-uncommitted offsets (next offset to read).
    stored: HashMap<i32, i64>,
    eof_reported: HashSet<i32>,
    /// Round-robin start for fetching across partitions.
    cursor: usize,
    closed: bool,
}

impl MemoryConsumer {
    /// Group member id, once subscribed.
    pub fn member_id(&self) -> Option<&str> {
        self.member_id.as_deref()
    }

    fn tps(&self, partitions: &[i32]) -> Vec<TopicPartition> {
        let topic = self.topic.clone().unwrap_or_default();
        partitions
            .iter()
            .map(|&p| TopicPartition::new(topic.clone(), p))
            .collect()
    }

    /// One non-blocking step. `Ok(None)` means nothing is ready yet.
    fn poll_once(&mut self) -> std::result::Result<Option<Delivery>, ConsumeError> {
        if self.closed {
            return Err(ConsumeError::Closed);
        }
        let (Some(member_id), Some(topic)) = (self.member_id.clone(), self.topic.clone()) else {
            return Err(ConsumeError::NotSubscribed);
        };

        let mut state = self
            .broker
            .state
            .lock()
            .map_err(|_| ConsumeError::Fatal("broker state poisoned".to_string()))?;

        if state.consume_faults > 0 {
            state.consume_faults -= 1;
            return Err(ConsumeError::Transient(
                "Broker: Unknown topic or partition".to_string(),
            ));
        }
        if !state.topics.contains_key(&topic) {
            return Err(ConsumeError::Transient(format!(
                "Subscribed topic not available: {topic}: Broker: Unknown topic or partition"
            )));
        }

        let notice = state
            .groups
            .get_mut(&self.group)
            .and_then(|g| g.members.get_mut(&member_id))
            .ok_or_else(|| ConsumeError::Fatal(format!("member {member_id} left the group")))?
            .pending
            .pop_front();

        if let Some(notice) = notice {
            let delivery = match notice {
                Notice::Assigned(partitions) => {
                    let committed = state
                        .groups
                        .get(&self.group)
                        .map(|g| g.committed.clone())
                        .unwrap_or_default();
                    for &p in &partitions {
                        // No committed offset: start from the earliest record.
                        self.positions.insert(p, committed.get(&p).copied().unwrap_or(0));
                        self.eof_reported.remove(&p);
                    }
                    Delivery::Assigned(self.tps(&partitions))
                }
                Notice::Revoked(partitions) => {
                    let mut flush: HashMap<i32, i64> = partitions
                        .iter()
                        .filter_map(|p| self.stored.remove(p).map(|o| (*p, o)))
                        .collect();
                    state.commit(&self.group, &member_id, &mut flush);
                    if let Some(member) = state
                        .groups
                        .get_mut(&self.group)
                        .and_then(|g| g.members.get_mut(&member_id))
                    {
                        for p in &partitions {
                            member.owned.remove(p);
                            member.revoking.remove(p);
                        }
                    }
                    for p in &partitions {
                        self.positions.remove(p);
                        self.eof_reported.remove(p);
                    }
                    state.rebalance(&self.group);
                    Delivery::Revoked(self.tps(&partitions))
                }
                Notice::Lost(partitions) => {
                    for p in &partitions {
                        self.positions.remove(p);
                        self.stored.remove(p);
                        self.eof_reported.remove(p);
                    }
                    if let Some(member) = state
                        .groups
                        .get_mut(&self.group)
                        .and_then(|g| g.members.get_mut(&member_id))
                    {
                        member.fenced = false;
                    }
                    state.rebalance(&self.group);
                    Delivery::Lost(self.tps(&partitions))
                }
            };
            return Ok(Some(delivery));
        }

        let owned: Vec<i32> = state
            .groups
            .get(&self.group)
            .and_then(|g| g.members.get(&member_id))
            .filter(|m| !m.fenced)
            .map(|m| m.owned.iter().copied().collect())
            .unwrap_or_default();
        let Some(log) = state.topics.get(&topic) else {
            return Ok(None);
        };

        for step in 0..owned.len() {
            let partition = owned[(self.cursor + step) % owned.len()];
            let Some(&position) = self.positions.get(&partition) else {
                continue;
            };
            let Some(records) = log.get(partition as usize) else {
                continue;
            };
            match records.get(position as usize) {
                Some(stored) => {
                    self.positions.insert(partition, position + 1);
                    self.eof_reported.remove(&partition);
                    self.cursor = (self.cursor + step + 1) % owned.len();
                    return Ok(Some(Delivery::Message(Record {
                        topic: topic.clone(),
                        partition,
                        offset: position,
                        key: stored.key.clone(),
                        value: stored.value.clone(),
                        timestamp: stored.timestamp,
                    })));
                }
                None if self.eof_reported.insert(partition) => {
                    return Ok(Some(Delivery::PartitionEof {
                        tp: TopicPartition::new(topic.clone(), partition),
                        offset: position,
                    }));
                }
                None => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if self.member_id.is_some() {
            return Err(Error::Other(format!(
                "consumer already subscribed to {}",
                self.topic.as_deref().unwrap_or_default()
            )));
        }
        let mut state = self.broker.lock()?;
        state.next_member += 1;
        let member_id = format!("{}-{}", self.group, state.next_member);

        let group = state.groups.entry(self.group.clone()).or_default();
        match group.topic.as_deref() {
            Some(existing) if existing != topic => {
                return Err(Error::Other(format!(
                    "group {} already consumes {existing}",
                    self.group
                )));
            }
            Some(_) => {}
            None => group.topic = Some(topic.to_string()),
        }
        group.members.insert(
            member_id.clone(),
            Member {
                owned: BTreeSet::new(),
                revoking: BTreeSet::new(),
                fenced: false,
                pending: VecDeque::new(),
                wake: Arc::clone(&self.wake),
            },
        );
        state.rebalance(&self.group);

        info!(group = %self.group, member = %member_id, topic, "joined consumer group");
        self.member_id = Some(member_id);
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn recv(&mut self) -> std::result::Result<Delivery, ConsumeError> {
        loop {
            if let Some(delivery) = self.poll_once()? {
                return Ok(delivery);
            }
            // Notify keeps a permit when nobody is waiting, so a wake-up that
            // lands between the poll and this await is not lost.
            self.wake.notified().await;
        }
    }

    fn store_offset(&mut self, record: &Record) -> Result<()> {
        if self.topic.as_deref() != Some(record.topic.as_str()) {
            return Err(Error::Commit(format!(
                "record from {} does not belong to this subscription",
                record.topic_partition()
            )));
        }
        let next = record.offset + 1;
        let slot = self.stored.entry(record.partition).or_insert(next);
        *slot = (*slot).max(next);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(member_id) = self.member_id.clone() else {
            return Err(Error::Commit("consumer is not subscribed".to_string()));
        };
        if self.stored.is_empty() {
            return Ok(());
        }
        let mut state = self.broker.lock()?;
        state.commit(&self.group, &member_id, &mut self.stored);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Some(member_id) = self.member_id.clone() else {
            return Ok(());
        };
        let mut state = self.broker.lock()?;
        state.commit(&self.group, &member_id, &mut self.stored);
        if let Some(group) = state.groups.get_mut(&self.group) {
            group.members.remove(&member_id);
        }
        state.rebalance(&self.group);
        self.positions.clear();
        info!(group = %self.group, member = %member_id, "left consumer group");
        Ok(())
    }
}
