pub mod node_data;


use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::node::node_data::NodeData;
use crate::protocol::{Client, KeyValue, Protocol, Request, ResponsePayload, RpcHandler};
use crate::routing::RingView;
use crate::rpc::{self, ChordService, RemoteNode};
use crate::storage::Storage;
use crate::SUCCESSOR_LIST_SIZE;

/// The operations an external caller, such as a shell or a file-distribution layer, drives a
/// ring member with.
pub trait DhtNode {
    /// Starts serving remote calls.
    fn run(&self);

    /// Forms a new ring containing only this node.
    fn create(&self);

    /// Joins the ring `addr` belongs to. Returns `false` if joining failed.
    fn join(&self, addr: &str) -> bool;

    /// Leaves the ring after notifying the neighbours.
    fn quit(&self);

    /// Leaves the ring without telling anyone, as a crash would.
    fn force_quit(&self);

    fn ping(&self, addr: &str) -> bool;

    fn put(&self, key: &str, value: &str) -> bool;

    fn get(&self, key: &str) -> Option<String>;

    fn delete(&self, key: &str) -> bool;
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock<T>(lock: &Mutex<T>) -> MutexGuard<T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The maintenance loops of one `Create`/`Join` session.
struct Maintenance {
    token: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Cancels the loops and waits for their current tick to finish.
    fn cancel(self) {
        self.token.store(false, Ordering::Release);
        for thread in self.threads {
            if thread.join().is_err() {
                warn!("Maintenance thread panicked");
            }
        }
    }
}

/// A member of a Chord ring.
///
/// Topology, primary data and backup data each sit behind their own lock so that routing never
/// waits on data access. Locks are taken in the order ring, data, backup. No lock is held across
/// a remote call: a call may come back to this very node.
///
/// Handlers and maintenance ticks write state only while the node is running, checked under the
/// lock they write through.
#[derive(Clone)]
pub struct Node {
    node_data: Arc<NodeData>,
    config: Arc<Config>,
    client: Client,
    ring: Arc<RwLock<RingView>>,
    data: Arc<RwLock<Storage>>,
    backup: Arc<RwLock<Storage>>,
    protocol: Arc<Mutex<Option<Protocol>>>,
    is_active: Arc<AtomicBool>,
    maintenance: Arc<Mutex<Option<Maintenance>>>,
}

impl Node {
    /// Constructs a new `Node` listening on `port` of the configured host. The node does not
    /// serve requests until `run` is called.
    pub fn new(port: u16, config: Config) -> Self {
        let addr = format!("{}:{}", config.ip, port);
        let node_data = Arc::new(NodeData::new(&addr));
        let config = Arc::new(config);
        Node {
            client: Client::new(&addr, Arc::clone(&config)),
            ring: Arc::new(RwLock::new(RingView::new(Arc::clone(&node_data)))),
            data: Arc::new(RwLock::new(Storage::new())),
            backup: Arc::new(RwLock::new(Storage::new())),
            protocol: Arc::new(Mutex::new(None)),
            is_active: Arc::new(AtomicBool::new(false)),
            maintenance: Arc::new(Mutex::new(None)),
            node_data,
            config,
        }
    }

    /// Starts the RPC server. On failure the node stays stopped.
    pub fn run(&self) -> Result<()> {
        let mut protocol = lock(&self.protocol);
        if protocol.is_some() {
            return Ok(());
        }
        *protocol = Some(Protocol::bind(
            &self.node_data.addr,
            self.clone(),
            Arc::clone(&self.config),
        )?);
        self.is_active.store(true, Ordering::Release);
        info!("{} - Running", self.node_data.addr);
        Ok(())
    }

    /// Makes this node a ring of one and starts maintenance.
    pub fn create(&self) -> Result<()> {
        self.ensure_running()?;
        write(&self.ring).create();
        info!("{} - Created ring", self.node_data.addr);
        self.start_maintenance();
        Ok(())
    }

    /// Joins the ring through `addr`: finds our successor, copies its successor list and takes
    /// over the keys that now belong to us.
    pub fn join(&self, addr: &str) -> Result<()> {
        self.ensure_running()?;
        if !self.client.is_online(addr) {
            return Err(Error::UnreachablePeer(addr.to_string()));
        }
        let successor = RemoteNode::new(&self.client, addr).find_successor(&self.node_data.id)?;
        // a stale pointer to our address can route the lookup back to us
        if successor == self.node_data.addr {
            return Err(Error::UnexpectedResponse("FindSuccessor"));
        }
        let remote = RemoteNode::new(&self.client, &successor);
        let successor_list = remote.get_successor_list()?;
        write(&self.ring).join(&successor, &successor_list);

        let data = match remote.transfer_data(&self.node_data.addr) {
            Ok(data) => data,
            Err(err) => {
                write(&self.ring).reset();
                return Err(err);
            },
        };
        info!(
            "{} - Joined ring through {} with successor {}, took over {} keys",
            self.node_data.addr,
            addr,
            successor,
            data.len()
        );
        write(&self.data).replace(data);
        self.start_maintenance();
        Ok(())
    }

    /// Leaves the ring. The successor absorbs our keys from its backup right away and the
    /// predecessor re-links past us.
    pub fn quit(&self) {
        if !self.stop() {
            return;
        }
        match self.first_live_successor() {
            Ok(successor) if successor != self.node_data.addr => {
                if let Err(err) = RemoteNode::new(&self.client, &successor).change_predecessor() {
                    warn!("{} - Could not hand over to {}: {}", self.node_data.addr, successor, err);
                }
            },
            Ok(_) => {},
            Err(err) => warn!("{} - No successor to hand over to: {}", self.node_data.addr, err),
        }
        let predecessor = read(&self.ring).predecessor().to_string();
        if !predecessor.is_empty() && predecessor != self.node_data.addr {
            if let Err(err) = RemoteNode::new(&self.client, &predecessor).stabilize() {
                warn!(
                    "{} - Could not stabilize predecessor {}: {}",
                    self.node_data.addr, predecessor, err
                );
            }
        }
        self.reset();
        info!("{} - Quit", self.node_data.addr);
    }

    /// Leaves the ring without notifying any peer.
    pub fn force_quit(&self) {
        if !self.stop() {
            return;
        }
        self.reset();
        info!("{} - Force quit", self.node_data.addr);
    }

    pub fn ping(&self, addr: &str) -> bool {
        self.client.is_online(addr)
    }

    /// Stores `value` under `key` on the owning node.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_running()?;
        let owner = self.find_successor(&Key::hash(key))?;
        RemoteNode::new(&self.client, &owner).insert_pair_in_data(KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Reads the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<String> {
        self.ensure_running()?;
        let owner = self.find_successor(&Key::hash(key))?;
        RemoteNode::new(&self.client, &owner).get_value(key)
    }

    /// Removes `key`. Removing an absent key is an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.ensure_running()?;
        let owner = self.find_successor(&Key::hash(key))?;
        RemoteNode::new(&self.client, &owner).erase_pair_in_data(key)
    }

    /// Returns the `NodeData` associated with the node.
    pub fn node_data(&self) -> NodeData {
        (*self.node_data).clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    pub fn successor(&self) -> String {
        read(&self.ring).successor_list()[0].clone()
    }

    pub fn successor_list(&self) -> [String; SUCCESSOR_LIST_SIZE] {
        read(&self.ring).successor_list()
    }

    pub fn predecessor(&self) -> String {
        read(&self.ring).predecessor().to_string()
    }

    pub fn finger(&self, index: usize) -> String {
        read(&self.ring).finger(index).to_string()
    }

    /// Returns the number of pairs this node owns.
    pub fn primary_len(&self) -> usize {
        read(&self.data).len()
    }

    /// Returns the number of pairs this node mirrors for its predecessor.
    pub fn backup_len(&self) -> usize {
        read(&self.backup).len()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NotRunning)
        }
    }

    /// Shuts the server down and waits for the maintenance loops to exit. Returns `false` if the
    /// node was not running.
    fn stop(&self) -> bool {
        let protocol = lock(&self.protocol).take();
        let was_active = self.is_active.swap(false, Ordering::AcqRel);
        if let Some(protocol) = protocol {
            protocol.shutdown();
        }
        let maintenance = lock(&self.maintenance).take();
        if let Some(maintenance) = maintenance {
            maintenance.cancel();
        }
        was_active
    }

    /// Write-locks `lock`, unless the node has stopped.
    fn write_live<'a, T>(&self, lock: &'a RwLock<T>) -> Result<RwLockWriteGuard<'a, T>> {
        let guard = write(lock);
        self.ensure_running()?;
        Ok(guard)
    }

    fn reset(&self) {
        write(&self.ring).reset();
        write(&self.data).clear();
        write(&self.backup).clear();
    }

    /// Starts the stabilize, fix-finger and predecessor-check loops. Loops of an earlier session
    /// are cancelled.
    fn start_maintenance(&self) {
        let token = Arc::new(AtomicBool::new(true));
        let threads = vec![
            self.spawn_maintenance("stabilizer", Arc::clone(&token), |node| node.stabilize()),
            self.spawn_maintenance("finger fixer", Arc::clone(&token), |node| node.fix_fingers()),
            self.spawn_maintenance("predecessor checker", Arc::clone(&token), |node| {
                node.change_predecessor()
            }),
        ];
        let old = lock(&self.maintenance).replace(Maintenance { token, threads });
        if let Some(old) = old {
            old.cancel();
        }
    }

    /// Starts a thread running `tick` every `stabilize_interval` until `token` is cancelled or
    /// the node stops. A failed tick is retried on the next one.
    fn spawn_maintenance<F>(
        &self,
        name: &'static str,
        token: Arc<AtomicBool>,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn(&Node) -> Result<()> + Send + 'static,
    {
        let node = self.clone();
        thread::spawn(move || {
            while token.load(Ordering::Acquire) && node.is_running() {
                if let Err(err) = tick(&node) {
                    debug!("{} - {} tick failed: {}", node.node_data.addr, name, err);
                }
                thread::sleep(node.config.stabilize_interval);
            }
            debug!("{} - Killed {}", node.node_data.addr, name);
        })
    }

    /// Returns the first entry of the successor list that accepts connections.
    fn first_live_successor(&self) -> Result<String> {
        let successor_list = read(&self.ring).successor_list();
        successor_list
            .iter()
            .find(|addr| self.client.is_online(addr))
            .cloned()
            .ok_or(Error::NoLiveSuccessor)
    }

    /// Returns the reachable finger with the longest reach that still precedes `id`, or
    /// `fallback` if there is none.
    fn closest_preceding_node(&self, id: &Key, fallback: String) -> String {
        let fingers = read(&self.ring).preceding_fingers(id);
        fingers
            .into_iter()
            .find(|addr| self.client.is_online(addr))
            .unwrap_or(fallback)
    }

    /// Refreshes one finger table slot.
    fn fix_fingers(&self) -> Result<()> {
        let index = read(&self.ring).next_finger();
        let target = self.node_data.id.finger_target(index);
        let addr = self.find_successor(&target)?;
        self.write_live(&self.ring)?.set_finger(index, &addr);
        Ok(())
    }

    /// Runs a replication step whose failure must not fail the operation that triggered it.
    fn replicate<F>(&self, step: &str, f: F)
    where
        F: FnOnce(RemoteNode) -> Result<()>,
    {
        let successor = match self.first_live_successor() {
            Ok(successor) => successor,
            Err(err) => {
                warn!("{} - Skipped {}: {}", self.node_data.addr, step, err);
                return;
            },
        };
        if successor == self.node_data.addr {
            return;
        }
        if let Err(err) = f(RemoteNode::new(&self.client, &successor)) {
            warn!("{} - {} on {} failed: {}", self.node_data.addr, step, successor, err);
        }
    }
}

impl ChordService for Node {
    fn find_successor(&self, id: &Key) -> Result<String> {
        let successor = self.first_live_successor()?;
        if id.in_interval(&self.node_data.id, &Key::hash(&successor), true) {
            return Ok(successor);
        }
        let next = self.closest_preceding_node(id, successor);
        RemoteNode::new(&self.client, &next).find_successor(id)
    }

    fn get_predecessor(&self) -> String {
        self.predecessor()
    }

    fn get_successor_list(&self) -> [String; SUCCESSOR_LIST_SIZE] {
        self.successor_list()
    }

    fn transfer_data(&self, joiner: &str) -> Result<HashMap<String, String>> {
        let moved = {
            let mut data = self.write_live(&self.data)?;
            let mut backup = write(&self.backup);
            let moved = data.split_off_outside(&Key::hash(joiner), &self.node_data.id);
            backup.replace(moved.clone());
            moved
        };
        // further-away replicas of the moved keys are stale now
        self.replicate("sub backup", |successor| successor.sub_backup(&moved));
        self.write_live(&self.ring)?.set_predecessor(joiner);
        info!(
            "{} - Transferred {} keys to {}",
            self.node_data.addr,
            moved.len(),
            joiner
        );
        Ok(moved)
    }

    fn sub_backup(&self, data: &HashMap<String, String>) {
        if let Ok(mut backup) = self.write_live(&self.backup) {
            backup.subtract(data);
        }
    }

    fn add_backup(&self, data: HashMap<String, String>) {
        if let Ok(mut backup) = self.write_live(&self.backup) {
            backup.extend(data);
        }
    }

    fn set_backup(&self) -> HashMap<String, String> {
        read(&self.data).snapshot()
    }

    fn change_predecessor(&self) -> Result<()> {
        let predecessor = self.predecessor();
        if predecessor.is_empty() || self.client.is_online(&predecessor) {
            return Ok(());
        }
        let folded = {
            // a new predecessor's mirror may only be installed after the drain
            let mut ring = self.write_live(&self.ring)?;
            if !ring.clear_predecessor_if(&predecessor) {
                return Ok(());
            }
            let mut data = write(&self.data);
            let mut backup = write(&self.backup);
            let folded = backup.drain();
            data.extend(folded.clone());
            folded
        };
        info!(
            "{} - Predecessor {} is offline, took over {} keys",
            self.node_data.addr,
            predecessor,
            folded.len()
        );
        self.replicate("add backup", |successor| successor.add_backup(folded));
        Ok(())
    }

    fn notify(&self, candidate: &str) -> Result<()> {
        if !read(&self.ring).accepts_predecessor(candidate) {
            return Ok(());
        }
        let mirror = if candidate == self.node_data.addr {
            None
        } else {
            Some(RemoteNode::new(&self.client, candidate).set_backup()?)
        };
        let mut ring = self.write_live(&self.ring)?;
        // the predecessor may have changed while the mirror was fetched
        if !ring.accepts_predecessor(candidate) {
            return Ok(());
        }
        ring.set_predecessor(candidate);
        if let Some(mirror) = mirror {
            write(&self.backup).replace(mirror);
        }
        debug!("{} - New predecessor {}", self.node_data.addr, candidate);
        Ok(())
    }

    fn stabilize(&self) -> Result<()> {
        let successor = self.first_live_successor()?;
        let predecessor = RemoteNode::new(&self.client, &successor).get_predecessor()?;
        let successor = if !predecessor.is_empty()
            && Key::hash(&predecessor).in_interval(
                &self.node_data.id,
                &Key::hash(&successor),
                false,
            )
            && self.client.is_online(&predecessor)
        {
            predecessor
        } else {
            successor
        };
        let remote = RemoteNode::new(&self.client, &successor);
        let successor_list = remote.get_successor_list()?;
        self.write_live(&self.ring)?.set_successor(&successor, &successor_list);
        remote.notify(&self.node_data.addr)
    }

    fn insert_pair_in_data(&self, pair: KeyValue) -> Result<()> {
        self.write_live(&self.data)?.insert(pair.key.clone(), pair.value.clone());
        self.replicate("insert pair in backup", |successor| {
            successor.insert_pair_in_backup(pair)
        });
        Ok(())
    }

    fn insert_pair_in_backup(&self, pair: KeyValue) {
        if let Ok(mut backup) = self.write_live(&self.backup) {
            backup.insert(pair.key, pair.value);
        }
    }

    fn get_value(&self, key: &str) -> Result<String> {
        read(&self.data)
            .get(key)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    fn erase_pair_in_data(&self, key: &str) -> Result<()> {
        if self.write_live(&self.data)?.remove(key).is_none() {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        self.replicate("erase pair in backup", |successor| {
            successor.erase_pair_in_backup(key)
        });
        Ok(())
    }

    fn erase_pair_in_backup(&self, key: &str) -> Result<()> {
        match self.write_live(&self.backup)?.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }
}

impl RpcHandler for Node {
    fn handle(&self, request: Request) -> ResponsePayload {
        trace!(
            "{} - Receiving {} from {}",
            self.node_data.addr,
            request.payload.method_name(),
            request.sender
        );
        rpc::dispatch(self, request)
    }
}

impl DhtNode for Node {
    fn run(&self) {
        if let Err(err) = Node::run(self) {
            error!("{} - Could not start RPC server: {}", self.node_data.addr, err);
        }
    }

    fn create(&self) {
        if let Err(err) = Node::create(self) {
            error!("{} - Could not create ring: {}", self.node_data.addr, err);
        }
    }

    fn join(&self, addr: &str) -> bool {
        match Node::join(self, addr) {
            Ok(()) => true,
            Err(err) => {
                error!("{} - Could not join {}: {}", self.node_data.addr, addr, err);
                false
            },
        }
    }

    fn quit(&self) {
        Node::quit(self)
    }

    fn force_quit(&self) {
        Node::force_quit(self)
    }

    fn ping(&self, addr: &str) -> bool {
        Node::ping(self, addr)
    }

    fn put(&self, key: &str, value: &str) -> bool {
        match Node::put(self, key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!("{} - Put {} failed: {}", self.node_data.addr, key, err);
                false
            },
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match Node::get(self, key) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!("{} - Get {} failed: {}", self.node_data.addr, key, err);
                None
            },
        }
    }

    fn delete(&self, key: &str) -> bool {
        match Node::delete(self, key) {
            Ok(()) => true,
            Err(err) => {
                warn!("{} - Delete {} failed: {}", self.node_data.addr, key, err);
                false
            },
        }
    }
}
