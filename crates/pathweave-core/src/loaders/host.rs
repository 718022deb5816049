//! Host inventory loader.
//!
//! Each `*.localmachine.json` document describes one host: the machine
//! itself, its local users and its local groups with their member SIDs.
//! `load` only queues the path; workers read and parse whole documents.
//! Group memberships are resolved at close, once every document of the run
//! has been converted, because members may live in another document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pathweave_config::PathweaveConfig;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::graph::{Attribute, EdgeType, Object, ObjectId, ObjectType, Objects};
use crate::ingest::{IngestPool, PoolOptions};
use crate::interner::AttributeValue;
use crate::loader::{LoadOutcome, Loader, LoaderError, ProgressFn};
use crate::loaders::has_suffix;

/// File name suffix claimed by this loader.
pub const HOST_SUFFIX: &str = ".localmachine.json";

/// Progress units per document.
const DOCUMENT_UNITS: i64 = 100;

const ADMINISTRATORS_SID: &str = "S-1-5-32-544";
const REMOTE_DESKTOP_USERS_SID: &str = "S-1-5-32-555";

/// Group attribute listing member SIDs that are not local to the machine.
pub const FOREIGN_MEMBER_SID: &str = "foreignMemberSid";

// ============================================================================
// Document schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct HostDocument {
    machine: MachineInfo,
    #[serde(default)]
    users: Vec<LocalUserInfo>,
    #[serde(default)]
    groups: Vec<LocalGroupInfo>,
}

#[derive(Debug, Deserialize)]
struct MachineInfo {
    name: String,
    #[serde(default)]
    local_sid: Option<String>,
    #[serde(default)]
    dns_hostname: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LocalUserInfo {
    name: String,
    sid: String,
    #[serde(default)]
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LocalGroupInfo {
    name: String,
    sid: String,
    #[serde(default)]
    members: Vec<String>,
}

// ============================================================================
// Per-run index
// ============================================================================

/// Facts gathered by workers and applied at close.
#[derive(Debug, Default)]
struct HostIndex {
    /// Local machine SID → machine identities reporting it
    machine_sids: HashMap<String, Vec<String>>,
    /// (machine identity, local account identity)
    accounts: Vec<(String, String)>,
    memberships: Vec<Membership>,
}

#[derive(Debug)]
struct Membership {
    machine: String,
    group: String,
    member_sid: String,
}

type HostJob = (PathBuf, ProgressFn);

pub struct HostInventoryLoader {
    config: PathweaveConfig,
    pool: Option<IngestPool<HostJob>>,
    index: Arc<Mutex<HostIndex>>,
}

impl HostInventoryLoader {
    pub fn new(config: PathweaveConfig) -> Self {
        Self {
            config,
            pool: None,
            index: Arc::new(Mutex::new(HostIndex::default())),
        }
    }
}

impl Loader for HostInventoryLoader {
    fn name(&self) -> &str {
        "Host inventory loader"
    }

    fn init(&mut self, partition: Objects) -> Result<(), LoaderError> {
        self.index = Arc::new(Mutex::new(HostIndex::default()));
        let index = Arc::clone(&self.index);
        let options = PoolOptions::from_config(
            "host",
            &self.config.ingest,
            self.config.ingest.document_queue_capacity,
        );
        let pool = IngestPool::start(partition, options, move |(path, progress): HostJob| {
            let objects = read_document(&path)
                .map(|doc| convert_document(doc, &index))
                .unwrap_or_default();
            progress(-DOCUMENT_UNITS, 0);
            objects
        })?;
        self.pool = Some(pool);
        Ok(())
    }

    fn load(&mut self, path: &Path, progress: &ProgressFn) -> Result<LoadOutcome, LoaderError> {
        if !has_suffix(path, HOST_SUFFIX) {
            return Ok(LoadOutcome::Uninterested);
        }
        let pool = self.pool.as_ref().ok_or(LoaderError::NotInitialized)?;
        progress(0, -DOCUMENT_UNITS);
        pool.submit((path.to_path_buf(), Arc::clone(progress)))?;
        Ok(LoadOutcome::Claimed)
    }

    fn close(&mut self) -> Result<Vec<Objects>, LoaderError> {
        let Some(pool) = self.pool.take() else {
            return Ok(Vec::new());
        };
        let mut partition = pool.finish()?;
        let index = std::mem::take(&mut *self.index.lock());

        link_accounts(&mut partition, &index);
        resolve_memberships(&mut partition, &index);
        knot_sid_collisions(&mut partition, &index);
        Ok(vec![partition])
    }
}

/// Read and parse one document. Failures are logged and skipped.
fn read_document(path: &Path) -> Option<HostDocument> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

fn machine_identity(machine: &MachineInfo) -> String {
    let host = machine
        .dns_hostname
        .as_deref()
        .filter(|h| !h.is_empty())
        .unwrap_or(&machine.name);
    format!("machine:{}", host.to_ascii_lowercase())
}

fn local_identity(machine: &str, sid: &str) -> String {
    format!("{}:{}", machine, sid)
}

fn convert_document(doc: HostDocument, index: &Mutex<HostIndex>) -> Vec<Object> {
    let machine_id = machine_identity(&doc.machine);
    let mut objects = Vec::with_capacity(1 + doc.users.len() + doc.groups.len());

    let mut machine = Object::new(&machine_id, ObjectType::Machine)
        .with_value(Attribute::Name, AttributeValue::string(&doc.machine.name));
    if let Some(host) = doc.machine.dns_hostname.as_deref().filter(|h| !h.is_empty()) {
        machine.add_value(Attribute::DnsHostName, AttributeValue::string(host));
    }
    if let Some(domain) = &doc.machine.domain {
        machine.add_value(Attribute::from_name("domain"), AttributeValue::string(domain));
    }
    if let Some(sid) = &doc.machine.local_sid {
        machine.add_value(Attribute::from_name("localMachineSid"), AttributeValue::string(sid));
    }
    objects.push(machine);

    let mut accounts = Vec::new();
    let mut memberships = Vec::new();

    for user in doc.users {
        let identity = local_identity(&machine_id, &user.sid);
        let mut object = Object::new(&identity, ObjectType::LocalUser)
            .with_value(Attribute::Name, AttributeValue::string(&user.name))
            .with_value(Attribute::ObjectSid, AttributeValue::string(&user.sid));
        if let Some(enabled) = user.enabled {
            object.add_value(Attribute::from_name("enabled"), AttributeValue::bool(enabled));
        }
        objects.push(object);
        accounts.push((machine_id.clone(), identity));
    }

    for group in doc.groups {
        let identity = local_identity(&machine_id, &group.sid);
        objects.push(
            Object::new(&identity, ObjectType::LocalGroup)
                .with_value(Attribute::Name, AttributeValue::string(&group.name))
                .with_value(Attribute::ObjectSid, AttributeValue::string(&group.sid)),
        );
        for member_sid in group.members {
            memberships.push(Membership {
                machine: machine_id.clone(),
                group: identity.clone(),
                member_sid,
            });
        }
        accounts.push((machine_id.clone(), identity));
    }

    let mut index = index.lock();
    if let Some(sid) = doc.machine.local_sid.filter(|s| !s.is_empty()) {
        index.machine_sids.entry(sid).or_default().push(machine_id);
    }
    index.accounts.extend(accounts);
    index.memberships.extend(memberships);

    objects
}

/// Local accounts become children of their machine.
fn link_accounts(partition: &mut Objects, index: &HostIndex) {
    for (machine, account) in &index.accounts {
        if let (Some(machine), Some(account)) = (
            partition.find_by_identity(machine),
            partition.find_by_identity(account),
        ) {
            partition.set_parent(account, machine);
        }
    }
}

/// Add member → group edges. Members local to the machine resolve to the
/// local account; any other SID is recorded on the group under
/// [`FOREIGN_MEMBER_SID`] and resolved against the merged graph.
fn resolve_memberships(partition: &mut Objects, index: &HostIndex) {
    let foreign_member = Attribute::from_name(FOREIGN_MEMBER_SID);
    let mut foreign = 0usize;
    for membership in &index.memberships {
        let Some(group) = partition.find_by_identity(&membership.group) else {
            continue;
        };
        let local = local_identity(&membership.machine, &membership.member_sid);
        match partition.find_by_identity(&local) {
            Some(member) => {
                partition.add_edge(member, group, EdgeType::MemberOfGroup);
            }
            None => {
                foreign += 1;
                partition.add_value(
                    group,
                    foreign_member.clone(),
                    AttributeValue::string(&membership.member_sid),
                );
            }
        }
    }

    // Privileged local groups grant rights on their machine.
    let grants: Vec<(ObjectId, ObjectId, EdgeType)> = index
        .accounts
        .iter()
        .filter_map(|(machine, account)| {
            let edge_type = if account.ends_with(&format!(":{}", ADMINISTRATORS_SID)) {
                EdgeType::LocalAdminRights
            } else if account.ends_with(&format!(":{}", REMOTE_DESKTOP_USERS_SID)) {
                EdgeType::RdpAccess
            } else {
                return None;
            };
            Some((
                partition.find_by_identity(account)?,
                partition.find_by_identity(machine)?,
                edge_type,
            ))
        })
        .collect();
    for (group, machine, edge_type) in grants {
        partition.add_edge(group, machine, edge_type);
    }

    debug!(
        "Resolved {} local group memberships ({} foreign)",
        index.memberships.len(),
        foreign
    );
}

/// Machines reporting the same local machine SID are linked both ways.
fn knot_sid_collisions(partition: &mut Objects, index: &HostIndex) {
    for (sid, machines) in &index.machine_sids {
        if machines.len() < 2 {
            continue;
        }
        warn!(
            "{} machines share local machine SID {}: {}",
            machines.len(),
            sid,
            machines.join(", ")
        );
        let ids: Vec<ObjectId> = machines
            .iter()
            .filter_map(|m| partition.find_by_identity(m))
            .collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if a != b {
                    partition.add_edge(*a, *b, EdgeType::SidCollision);
                    partition.add_edge(*b, *a, EdgeType::SidCollision);
                }
            }
        }
    }
}
