//! Directory dump loader.
//!
//! Reads newline-delimited JSON dumps of a directory service, one record per
//! object, each record a map from attribute name to a value or a list of
//! values:
//!
//! ```text
//! {"distinguishedName":"CN=alice,OU=Staff,DC=corp,DC=local","objectClass":["top","person","user"],"objectSid":"S-1-5-21-1-2-3-1104"}
//! ```
//!
//! Records are decoded on the calling thread and converted on the ingest
//! pool. Objects are keyed by distinguished name; a SID is only the key of
//! a record that has no distinguished name. Objects that share a SID, such
//! as the BUILTIN groups of every domain, stay separate and are linked with
//! `SidCollision` edges.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use pathweave_config::PathweaveConfig;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::graph::{Attribute, EdgeType, Object, ObjectId, ObjectType, Objects};
use crate::ingest::{IngestPool, PoolOptions};
use crate::interner::AttributeValue;
use crate::loader::{LoadOutcome, Loader, LoaderError, ProgressFn};
use crate::loaders::has_suffix;

/// File name suffix claimed by this loader.
pub const DIRECTORY_SUFFIX: &str = ".objects.jsonl";

/// Records between progress reports.
const PROGRESS_INTERVAL: usize = 1000;

type RawRecord = Map<String, Value>;

pub struct DirectoryDumpLoader {
    config: PathweaveConfig,
    pool: Option<IngestPool<RawRecord>>,
}

impl DirectoryDumpLoader {
    pub fn new(config: PathweaveConfig) -> Self {
        Self { config, pool: None }
    }
}

impl Loader for DirectoryDumpLoader {
    fn name(&self) -> &str {
        "Directory dump loader"
    }

    fn init(&mut self, partition: Objects) -> Result<(), LoaderError> {
        let import_all = self.config.directory.import_all;
        let options = PoolOptions::from_config(
            "directory",
            &self.config.ingest,
            self.config.ingest.queue_capacity,
        );
        let pool = IngestPool::start(partition, options, move |record: RawRecord| {
            convert_record(record, import_all).into_iter().collect()
        })?;
        self.pool = Some(pool);
        Ok(())
    }

    fn load(&mut self, path: &Path, progress: &ProgressFn) -> Result<LoadOutcome, LoaderError> {
        if !has_suffix(path, DIRECTORY_SUFFIX) {
            return Ok(LoadOutcome::Uninterested);
        }
        let pool = self.pool.as_ref().ok_or(LoaderError::NotInitialized)?;

        let file = File::open(path).map_err(|e| LoaderError::io(path, e))?;
        let size = file.metadata().map_err(|e| LoaderError::io(path, e))?.len();
        let unit = self.config.directory.bytes_per_object.max(1);
        progress(0, -((size / unit) as i64));

        let mut stream =
            serde_json::Deserializer::from_reader(BufReader::new(file)).into_iter::<RawRecord>();
        let mut reported = 0u64;
        let mut records = 0usize;

        while let Some(next) = stream.next() {
            let record = next.map_err(|e| {
                LoaderError::decode(path, stream.byte_offset() as u64, e.to_string())
            })?;
            pool.submit(record)?;
            records += 1;
            if records % PROGRESS_INTERVAL == 0 {
                reported = report_position(progress, stream.byte_offset() as u64, unit, reported);
            }
        }
        report_position(progress, stream.byte_offset() as u64, unit, reported);

        info!("Queued {} directory records from {}", records, path.display());
        Ok(LoadOutcome::Claimed)
    }

    fn close(&mut self) -> Result<Vec<Objects>, LoaderError> {
        let Some(pool) = self.pool.take() else {
            return Ok(Vec::new());
        };
        let mut partition = pool.finish()?;
        link_parents(&mut partition);
        knot_shared_sids(&mut partition);
        Ok(vec![partition])
    }
}

/// Report the position reached as a relative delta in whole units.
///
/// `reported` carries the units already reported, so the relative deltas of
/// one file always add up to `offset / unit`.
fn report_position(progress: &ProgressFn, offset: u64, unit: u64, reported: u64) -> u64 {
    let units = offset / unit;
    if units > reported {
        progress(-((units - reported) as i64), 0);
    }
    units.max(reported)
}

/// Turn one raw record into an object. Records without a usable identity
/// and legacy well-known foreign principals yield nothing.
fn convert_record(record: RawRecord, import_all: bool) -> Option<Object> {
    let dn = string_field(&record, "distinguishedName");
    let sid = string_field(&record, "objectSid");

    if let (Some(dn), Some(sid)) = (dn, sid) {
        if is_well_known_foreign_principal(dn, sid) {
            return None;
        }
    }

    let identity = dn.or(sid)?;
    let object_type = record
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("objectClass"))
        .and_then(|(_, v)| match v {
            Value::Array(items) => items.last().and_then(Value::as_str),
            Value::String(s) => Some(s.as_str()),
            _ => None,
        })
        .map(ObjectType::from_object_class)
        .unwrap_or(ObjectType::Other);

    let mut object = Object::new(identity, object_type);
    for (name, value) in &record {
        let attribute = Attribute::from_name(name);
        if !import_all && !attribute.is_well_known() {
            continue;
        }
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(v) = to_attribute_value(item) {
                        object.add_value(attribute.clone(), v);
                    }
                }
            }
            other => {
                if let Some(v) = to_attribute_value(other) {
                    object.add_value(attribute, v);
                }
            }
        }
    }
    Some(object)
}

fn string_field<'a>(record: &'a RawRecord, name: &str) -> Option<&'a str> {
    record
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, v)| match v {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        })
        .filter(|s| !s.is_empty())
}

fn to_attribute_value(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::String(s) => Some(AttributeValue::string(s)),
        Value::Bool(b) => Some(AttributeValue::bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(AttributeValue::int(i)),
            None => Some(AttributeValue::string(&n.to_string())),
        },
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Foreign security principals with a three-part SID (`S-1-5-11` style) are
/// placeholders for well-known principals every domain already has.
fn is_well_known_foreign_principal(dn: &str, sid: &str) -> bool {
    dn.to_ascii_lowercase().contains(",cn=foreignsecurityprincipals,")
        && sid.matches('-').count() == 3
}

/// Parent distinguished name: everything after the first unescaped comma.
pub fn parent_dn(dn: &str) -> Option<&str> {
    let mut escaped = false;
    for (i, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                let rest = &dn[i + 1..];
                return if rest.is_empty() { None } else { Some(rest) };
            }
            _ => {}
        }
    }
    None
}

/// Rebuild the containment tree from distinguished names.
///
/// Domain tops attach to the root; objects whose parent is missing from the
/// dump stay parentless and are anchored under the root at merge.
fn link_parents(partition: &mut Objects) {
    let root = partition.root();
    let mut links: Vec<(ObjectId, ObjectId)> = Vec::new();
    let mut unresolved = 0usize;

    for (id, object) in partition.iter() {
        if id == root || object.parent().is_some() {
            continue;
        }
        let Some(dn) = object.first_str(&Attribute::DistinguishedName) else {
            continue;
        };
        let parent = parent_dn(dn).and_then(|parent| {
            partition.find(&Attribute::DistinguishedName, &AttributeValue::string(parent))
        });
        match parent {
            Some(parent) => links.push((id, parent)),
            None if object.object_type() == ObjectType::DomainDns
                && dn.to_ascii_lowercase().starts_with("dc=") =>
            {
                links.push((id, root));
            }
            None => {
                unresolved += 1;
                debug!("Could not resolve parent of {}", dn);
            }
        }
    }

    let linked = links.len();
    for (child, parent) in links {
        partition.set_parent(child, parent);
    }
    debug!(
        "Linked {} directory objects to parents ({} unresolved)",
        linked, unresolved
    );
}

/// Link every pair of objects carrying the same SID both ways.
fn knot_shared_sids(partition: &mut Objects) {
    let mut groups: Vec<Vec<ObjectId>> = Vec::new();
    for (id, object) in partition.iter() {
        for sid in object.values(&Attribute::ObjectSid) {
            let holders = partition.find_all(&Attribute::ObjectSid, sid);
            // Each group is collected once, by its lowest id.
            if holders.len() > 1 && holders.iter().min() == Some(&id) {
                groups.push(holders.to_vec());
            }
        }
    }

    let mut knotted = 0usize;
    for ids in &groups {
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if a != b {
                    partition.add_edge(*a, *b, EdgeType::SidCollision);
                    partition.add_edge(*b, *a, EdgeType::SidCollision);
                }
            }
        }
        knotted += ids.len();
    }
    if !groups.is_empty() {
        debug!(
            "Linked {} directory objects sharing {} SIDs",
            knotted,
            groups.len()
        );
    }
}
