//! Default processors registered by [`default_pipeline`].

use std::collections::HashMap;

use tracing::debug;

use crate::graph::{Attribute, EdgeType, Object, ObjectId, ObjectType, Objects};
use crate::interner::AttributeValue;
use crate::loaders::FOREIGN_MEMBER_SID;
use crate::pipeline::{Pipeline, Priority, StageContext};

/// Pipeline with the built-in processors:
///
/// - `BeforeMergeLow` "stamp data source"
/// - `AfterMergeLow` "link machine accounts"
/// - `AfterMergeLow` "resolve foreign members"
pub fn default_pipeline() -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.register_fn(Priority::BeforeMergeLow, "stamp data source", stamp_data_source);
    pipeline.register_fn(Priority::AfterMergeLow, "link machine accounts", link_machine_accounts);
    pipeline.register_fn(
        Priority::AfterMergeLow,
        "resolve foreign members",
        resolve_foreign_members,
    );
    pipeline
}

/// Tag every object without a `dataSource` with the producing loader.
pub fn stamp_data_source(objects: &mut Objects, context: &StageContext) {
    let Some(source) = context.source_name.as_deref() else {
        return;
    };
    let value = AttributeValue::string(source);
    let root = objects.root();
    let unstamped: Vec<ObjectId> = objects
        .iter()
        .filter(|(id, o)| *id != root && !o.has(&Attribute::DataSource))
        .map(|(id, _)| id)
        .collect();
    for id in &unstamped {
        objects.add_value(*id, Attribute::DataSource, value.clone());
    }
    debug!("Stamped {} objects with data source '{}'", unstamped.len(), source);
}

/// Link directory computer accounts to host inventory machines.
///
/// Matches on `dNSHostName` first, then on the bare host name, both
/// case-insensitively, and adds `MachineAccount` edges computer → machine.
pub fn link_machine_accounts(objects: &mut Objects, _context: &StageContext) {
    let mut by_dns: HashMap<String, Vec<ObjectId>> = HashMap::new();
    let mut by_name: HashMap<String, Vec<ObjectId>> = HashMap::new();
    let mut machines = Vec::new();

    for (id, object) in objects.iter() {
        match object.object_type() {
            ObjectType::Computer => {
                if let Some(dns) = object.first_str(&Attribute::DnsHostName) {
                    by_dns.entry(dns.to_ascii_lowercase()).or_default().push(id);
                }
                if let Some(name) = object.first_str(&Attribute::Name) {
                    by_name.entry(name.to_ascii_lowercase()).or_default().push(id);
                }
            }
            ObjectType::Machine => machines.push(id),
            _ => {}
        }
    }

    let mut links = Vec::new();
    for machine in machines {
        let object = &objects[machine];
        let dns = object
            .first_str(&Attribute::DnsHostName)
            .map(str::to_ascii_lowercase);
        let name = object.first_str(&Attribute::Name).map(str::to_ascii_lowercase);

        let computers = dns
            .as_ref()
            .and_then(|d| by_dns.get(d))
            .or_else(|| name.as_ref().and_then(|n| by_name.get(n)));
        if let Some(computers) = computers {
            links.extend(computers.iter().map(|computer| (*computer, machine)));
        }
    }

    for (computer, machine) in &links {
        objects.add_edge(*computer, *machine, EdgeType::MachineAccount);
    }
    debug!("Linked {} machine accounts", links.len());
}

/// Turn the foreign member SIDs recorded on local groups into
/// `MemberOfGroup` edges.
///
/// Every non-local object carrying the SID becomes a member, so a SID held
/// by several directory objects links all of them. A SID nothing carries
/// gets one SID-keyed placeholder under the root.
pub fn resolve_foreign_members(objects: &mut Objects, _context: &StageContext) {
    let foreign_member = Attribute::from_name(FOREIGN_MEMBER_SID);
    let mut pending: Vec<(ObjectId, AttributeValue)> = Vec::new();
    for (id, object) in objects.iter() {
        for sid in object.values(&foreign_member) {
            pending.push((id, sid.clone()));
        }
    }

    let root = objects.root();
    let mut linked = 0usize;
    let mut placeholders = 0usize;
    for (group, sid) in pending {
        let mut members: Vec<ObjectId> = objects
            .find_all(&Attribute::ObjectSid, &sid)
            .iter()
            .copied()
            .filter(|id| {
                *id != group
                    && !matches!(
                        objects[*id].object_type(),
                        ObjectType::LocalUser | ObjectType::LocalGroup
                    )
            })
            .collect();
        if members.is_empty() {
            let Some(text) = sid.as_str() else {
                continue;
            };
            let placeholder = objects.add(
                Object::new(text, ObjectType::Other).with_value(Attribute::ObjectSid, sid.clone()),
            );
            if objects[placeholder].parent().is_none() {
                objects.set_parent(placeholder, root);
            }
            placeholders += 1;
            members.push(placeholder);
        }
        for member in members {
            if objects.add_edge(member, group, EdgeType::MemberOfGroup) {
                linked += 1;
            }
        }
    }
    debug!(
        "Resolved {} foreign group memberships ({} placeholders)",
        linked, placeholders
    );
}
