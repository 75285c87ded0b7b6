//! In-memory fakes shared by unit tests

use crate::cluster::{LabelDelta, MetadataStore, NodeRecord, RuntimeIdentity, RuntimeInfo};
use crate::error::{CsiError, CsiResult};
use crate::mount::command::{render, CommandOutput, CommandRunner};
use crate::mount::probe::{MountProbe, MountState};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Command runner that records command lines and replays scripted outputs.
/// Programs without a scripted output exit 0 with no output.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for the next run of `program`
    pub fn respond(&self, program: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines of `program` run so far
    pub fn calls_to(&self, program: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(' ').next() == Some(program))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> CsiResult<CommandOutput> {
        self.calls.lock().unwrap().push(render(program, args));
        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(program)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| CommandOutput::new(0, "")))
    }
}

/// Scripted mount state
#[derive(Debug, Clone, Copy)]
pub enum Probed {
    NotMounted,
    Mounted,
    Missing,
    Corrupted(i32),
    Failed(i32),
}

impl Probed {
    fn state(self) -> MountState {
        match self {
            Self::NotMounted => MountState::NotMounted,
            Self::Mounted => MountState::Mounted,
            Self::Missing => MountState::Missing,
            Self::Corrupted(errno) => MountState::Corrupted(io::Error::from_raw_os_error(errno)),
            Self::Failed(errno) => MountState::Failed(io::Error::from_raw_os_error(errno)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StatError {
    Kind(io::ErrorKind),
    Errno(i32),
}

/// Mount probe replaying scripted states per path. The last scripted state
/// of a path repeats; unscripted paths are not mounted.
#[derive(Default)]
pub struct FakeProbe {
    states: Mutex<HashMap<PathBuf, VecDeque<Probed>>>,
    stat_errors: Mutex<HashMap<PathBuf, StatError>>,
    probes: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_states(&self, path: impl AsRef<Path>, states: Vec<Probed>) {
        self.states
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), states.into());
    }

    pub fn set_stat_error(&self, path: impl AsRef<Path>, err: io::Error) {
        let err = match err.raw_os_error() {
            Some(errno) => StatError::Errno(errno),
            None => StatError::Kind(err.kind()),
        };
        self.stat_errors
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), err);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountProbe for FakeProbe {
    async fn probe(&self, path: &Path) -> MountState {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        let probed = match states.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        probed.unwrap_or(Probed::NotMounted).state()
    }

    async fn stat(&self, path: &Path) -> io::Result<()> {
        match self.stat_errors.lock().unwrap().get(path) {
            Some(StatError::Kind(kind)) => Err(io::Error::from(*kind)),
            Some(StatError::Errno(errno)) => Err(io::Error::from_raw_os_error(*errno)),
            None => Ok(()),
        }
    }
}

/// In-memory metadata store holding a single node
pub struct FakeStore {
    node_name: String,
    labels: Mutex<BTreeMap<String, String>>,
    patches: Mutex<Vec<LabelDelta>>,
    volumes: Mutex<HashMap<String, RuntimeIdentity>>,
    runtimes: Mutex<HashMap<RuntimeIdentity, String>>,
    get_node_calls: AtomicUsize,
    volume_lookups: AtomicUsize,
    fail_get_node: AtomicBool,
    fail_patch: AtomicBool,
}

impl FakeStore {
    pub fn new(node_name: &str) -> Self {
        Self {
            node_name: node_name.to_string(),
            labels: Mutex::new(BTreeMap::new()),
            patches: Mutex::new(Vec::new()),
            volumes: Mutex::new(HashMap::new()),
            runtimes: Mutex::new(HashMap::new()),
            get_node_calls: AtomicUsize::new(0),
            volume_lookups: AtomicUsize::new(0),
            fail_get_node: AtomicBool::new(false),
            fail_patch: AtomicBool::new(false),
        }
    }

    pub fn add_volume(&self, volume_id: &str, identity: RuntimeIdentity) {
        self.volumes
            .lock()
            .unwrap()
            .insert(volume_id.to_string(), identity);
    }

    pub fn add_runtime(&self, identity: RuntimeIdentity, clean_policy: &str) {
        self.runtimes
            .lock()
            .unwrap()
            .insert(identity, clean_policy.to_string());
    }

    pub fn set_label(&self, key: &str, value: &str) {
        self.labels
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn label(&self, key: &str) -> Option<String> {
        self.labels.lock().unwrap().get(key).cloned()
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.labels.lock().unwrap().clone()
    }

    pub fn patches(&self) -> Vec<LabelDelta> {
        self.patches.lock().unwrap().clone()
    }

    pub fn get_node_calls(&self) -> usize {
        self.get_node_calls.load(Ordering::SeqCst)
    }

    pub fn volume_lookups(&self) -> usize {
        self.volume_lookups.load(Ordering::SeqCst)
    }

    pub fn fail_get_node(&self, fail: bool) {
        self.fail_get_node.store(fail, Ordering::SeqCst);
    }

    pub fn fail_patch(&self, fail: bool) {
        self.fail_patch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn get_node(&self, node_id: &str) -> CsiResult<NodeRecord> {
        self.get_node_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get_node.load(Ordering::SeqCst) {
            return Err(CsiError::Store("connection refused".to_string()));
        }
        if node_id != self.node_name {
            return Err(CsiError::not_found("node", node_id));
        }
        Ok(NodeRecord::new(self.node_name.clone(), self.labels()))
    }

    async fn patch_node_labels(
        &self,
        node: &NodeRecord,
        delta: &LabelDelta,
    ) -> CsiResult<NodeRecord> {
        if self.fail_patch.load(Ordering::SeqCst) {
            return Err(CsiError::Store("conflict".to_string()));
        }
        // Let a concurrent caller run between the read and the write
        tokio::task::yield_now().await;
        let mut labels = self.labels.lock().unwrap();
        delta.apply_to(&mut labels);
        self.patches.lock().unwrap().push(delta.clone());
        Ok(NodeRecord::new(node.name.clone(), labels.clone()))
    }

    async fn get_runtime_info(&self, identity: &RuntimeIdentity) -> CsiResult<RuntimeInfo> {
        let policy = self
            .runtimes
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .ok_or_else(|| CsiError::not_found("runtime", identity.to_string()))?;
        Ok(RuntimeInfo {
            identity: identity.clone(),
            runtime_type: "alluxio".to_string(),
            fuse_clean_policy: policy,
        })
    }

    async fn get_runtime_identity_by_volume_id(
        &self,
        volume_id: &str,
    ) -> CsiResult<RuntimeIdentity> {
        self.volume_lookups.fetch_add(1, Ordering::SeqCst);
        self.volumes
            .lock()
            .unwrap()
            .get(volume_id)
            .cloned()
            .ok_or_else(|| CsiError::not_found("persistentvolume", volume_id))
    }
}
