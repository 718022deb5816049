//! Object Graph
//!
//! This module defines the node/edge/attribute model shared by every loader
//! partition and by the unified graph:
//!
//! - `Object`: a principal or resource with an identity key, a type,
//!   multi-valued attributes, an optional parent and two edge collections
//! - `EdgeType` / `EdgeBitmap`: the closed set of relations and a compact
//!   set of them for one object pair
//! - `Objects`: an arena of objects addressed by `ObjectId`, with identity
//!   and attribute indexes and exactly one designated root
//!
//! Edges are stored symmetrically: `add_edge(a, b, t)` records `b` in the
//! outbound collection of `a` and `a` in the inbound collection of `b`, so
//! both directions can be walked without scanning the graph.

use std::collections::{BTreeMap, HashMap};
use std::ops::Index;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::interner::{self, AttributeValue};

/// Identity of the designated root object of every graph.
pub const ROOT_IDENTITY: &str = "<root>";

/// Growth step used by [`AllocationMode::SteadyState`].
pub const STEADY_STATE_INCREMENT: usize = 4;

// ============================================================================
// Edge Types
// ============================================================================

/// Types of relationships between objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EdgeType {
    /// Principal is a member of a group
    MemberOfGroup,
    /// Principal owns the target
    Owns,
    /// Full control over the target
    GenericAll,
    /// Can rewrite the target's access control list
    WriteDacl,
    /// Can take ownership of the target
    WriteOwner,
    /// Can reset the target's password
    ResetPassword,
    /// Local administrator on a machine
    LocalAdminRights,
    /// Remote desktop access to a machine
    RdpAccess,
    /// Machine hosts a session of the principal
    HasSession,
    /// Two machines reported the same local machine SID
    SidCollision,
    /// Principal carries the target's SID in its SID history
    SidHistoryEquality,
    /// Directory computer account backing a host inventory machine
    MachineAccount,
}

impl EdgeType {
    /// Every edge type, in declaration order.
    pub const ALL: [EdgeType; 12] = [
        EdgeType::MemberOfGroup,
        EdgeType::Owns,
        EdgeType::GenericAll,
        EdgeType::WriteDacl,
        EdgeType::WriteOwner,
        EdgeType::ResetPassword,
        EdgeType::LocalAdminRights,
        EdgeType::RdpAccess,
        EdgeType::HasSession,
        EdgeType::SidCollision,
        EdgeType::SidHistoryEquality,
        EdgeType::MachineAccount,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::MemberOfGroup => "MEMBER_OF_GROUP",
            EdgeType::Owns => "OWNS",
            EdgeType::GenericAll => "GENERIC_ALL",
            EdgeType::WriteDacl => "WRITE_DACL",
            EdgeType::WriteOwner => "WRITE_OWNER",
            EdgeType::ResetPassword => "RESET_PASSWORD",
            EdgeType::LocalAdminRights => "LOCAL_ADMIN_RIGHTS",
            EdgeType::RdpAccess => "RDP_ACCESS",
            EdgeType::HasSession => "HAS_SESSION",
            EdgeType::SidCollision => "SID_COLLISION",
            EdgeType::SidHistoryEquality => "SID_HISTORY_EQUALITY",
            EdgeType::MachineAccount => "MACHINE_ACCOUNT",
        }
    }

    fn bit(self) -> u64 {
        1u64 << (self as u8)
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of edge types between one ordered pair of objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EdgeBitmap(u64);

impl EdgeBitmap {
    /// Empty set
    pub const EMPTY: EdgeBitmap = EdgeBitmap(0);

    /// Set containing a single edge type
    pub fn of(edge_type: EdgeType) -> Self {
        Self(edge_type.bit())
    }

    /// Add an edge type, returning true if it was not present.
    pub fn set(&mut self, edge_type: EdgeType) -> bool {
        let before = self.0;
        self.0 |= edge_type.bit();
        before != self.0
    }

    pub fn contains(&self, edge_type: EdgeType) -> bool {
        self.0 & edge_type.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Union of both sets
    pub fn union(self, other: EdgeBitmap) -> EdgeBitmap {
        EdgeBitmap(self.0 | other.0)
    }

    /// Iterate the contained edge types in declaration order.
    pub fn iter(self) -> impl Iterator<Item = EdgeType> {
        EdgeType::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

// ============================================================================
// Object Types
// ============================================================================

/// High-level object classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    /// Unclassified object
    Other,
    /// The designated root of a graph
    Root,
    /// Directory user account
    Person,
    /// Directory security or distribution group
    Group,
    /// Directory computer account
    Computer,
    /// Directory container
    Container,
    /// Organizational unit
    OrganizationalUnit,
    /// Top of a directory domain
    DomainDns,
    /// Placeholder for a principal from a trusted domain
    ForeignSecurityPrincipal,
    /// Group policy container
    GroupPolicyContainer,
    /// Host seen by a host inventory collector
    Machine,
    /// Account local to one machine
    LocalUser,
    /// Group local to one machine
    LocalGroup,
}

impl ObjectType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Other => "Other",
            ObjectType::Root => "Root",
            ObjectType::Person => "Person",
            ObjectType::Group => "Group",
            ObjectType::Computer => "Computer",
            ObjectType::Container => "Container",
            ObjectType::OrganizationalUnit => "OrganizationalUnit",
            ObjectType::DomainDns => "DomainDNS",
            ObjectType::ForeignSecurityPrincipal => "ForeignSecurityPrincipal",
            ObjectType::GroupPolicyContainer => "GroupPolicyContainer",
            ObjectType::Machine => "Machine",
            ObjectType::LocalUser => "LocalUser",
            ObjectType::LocalGroup => "LocalGroup",
        }
    }

    /// Classify a directory object by its most specific `objectClass` value.
    pub fn from_object_class(class: &str) -> Self {
        match class.to_ascii_lowercase().as_str() {
            "user" | "person" | "inetorgperson" | "organizationalperson" => ObjectType::Person,
            "computer" => ObjectType::Computer,
            "group" => ObjectType::Group,
            "container" | "builtindomain" => ObjectType::Container,
            "organizationalunit" => ObjectType::OrganizationalUnit,
            "domaindns" => ObjectType::DomainDns,
            "foreignsecurityprincipal" => ObjectType::ForeignSecurityPrincipal,
            "grouppolicycontainer" => ObjectType::GroupPolicyContainer,
            _ => ObjectType::Other,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Attribute names. Well-known names are variants; everything else is an
/// interned custom name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    DistinguishedName,
    ObjectSid,
    ObjectClass,
    Name,
    DisplayName,
    DnsHostName,
    ObjectGuid,
    SamAccountName,
    Member,
    /// Name of the loader that produced the object
    DataSource,
    Custom(Arc<str>),
}

impl Attribute {
    /// Resolve an attribute name, case-insensitively for well-known names.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "distinguishedname" => Attribute::DistinguishedName,
            "objectsid" => Attribute::ObjectSid,
            "objectclass" => Attribute::ObjectClass,
            "name" => Attribute::Name,
            "displayname" => Attribute::DisplayName,
            "dnshostname" => Attribute::DnsHostName,
            "objectguid" => Attribute::ObjectGuid,
            "samaccountname" => Attribute::SamAccountName,
            "member" => Attribute::Member,
            "datasource" => Attribute::DataSource,
            _ => Attribute::Custom(interner::global().intern_str(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Attribute::DistinguishedName => "distinguishedName",
            Attribute::ObjectSid => "objectSid",
            Attribute::ObjectClass => "objectClass",
            Attribute::Name => "name",
            Attribute::DisplayName => "displayName",
            Attribute::DnsHostName => "dNSHostName",
            Attribute::ObjectGuid => "objectGUID",
            Attribute::SamAccountName => "sAMAccountName",
            Attribute::Member => "member",
            Attribute::DataSource => "dataSource",
            Attribute::Custom(name) => name,
        }
    }

    /// Whether this is one of the well-known names.
    pub fn is_well_known(&self) -> bool {
        !matches!(self, Attribute::Custom(_))
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Allocation Mode
// ============================================================================

/// Growth policy for the growable containers inside a graph.
///
/// Bulk loading favors throughput (amortized doubling); after finalization
/// the graph is read-mostly and favors tight memory (small fixed steps).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationMode {
    /// Amortized doubling, used while loading and merging
    #[default]
    BulkAppend,
    /// Fixed increments of [`STEADY_STATE_INCREMENT`], used after finalization
    SteadyState,
}

impl AllocationMode {
    /// Make room for `additional` more items according to this mode.
    pub fn reserve<T>(self, vec: &mut Vec<T>, additional: usize) {
        match self {
            AllocationMode::BulkAppend => vec.reserve(additional),
            AllocationMode::SteadyState => {
                if vec.capacity() - vec.len() < additional {
                    let step = additional.div_ceil(STEADY_STATE_INCREMENT) * STEADY_STATE_INCREMENT;
                    vec.reserve_exact(step);
                }
            }
        }
    }
}

// ============================================================================
// Object Identity
// ============================================================================

/// Index of an object inside one `Objects` arena.
///
/// Ids are only meaningful for the graph that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Panics once the arena outgrows 32-bit ids.
    fn from_index(index: usize) -> Self {
        match u32::try_from(index) {
            Ok(raw) => Self(raw),
            Err(_) => panic!("object arena exceeds {} entries", u32::MAX),
        }
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Direction of an edge collection relative to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn slot(self) -> usize {
        match self {
            Direction::In => 0,
            Direction::Out => 1,
        }
    }
}

// ============================================================================
// Edge Storage
// ============================================================================

/// Per-object edge collection: a hash map while the graph grows, a sorted
/// boxed slice once finalized.
#[derive(Debug, Clone)]
enum EdgeStore {
    Growing(HashMap<ObjectId, EdgeBitmap>),
    Compact(Box<[(ObjectId, EdgeBitmap)]>),
}

impl Default for EdgeStore {
    fn default() -> Self {
        EdgeStore::Growing(HashMap::new())
    }
}

impl EdgeStore {
    fn insert(&mut self, peer: ObjectId, edges: EdgeBitmap) -> bool {
        match self {
            EdgeStore::Growing(map) => {
                let entry = map.entry(peer).or_default();
                let before = *entry;
                *entry = entry.union(edges);
                before != *entry
            }
            EdgeStore::Compact(_) => panic!("edge collection is sealed after finalization"),
        }
    }

    fn get(&self, peer: ObjectId) -> EdgeBitmap {
        match self {
            EdgeStore::Growing(map) => map.get(&peer).copied().unwrap_or_default(),
            EdgeStore::Compact(slice) => slice
                .binary_search_by_key(&peer, |(id, _)| *id)
                .map(|i| slice[i].1)
                .unwrap_or_default(),
        }
    }

    fn len(&self) -> usize {
        match self {
            EdgeStore::Growing(map) => map.len(),
            EdgeStore::Compact(slice) => slice.len(),
        }
    }

    fn iter(&self) -> Edges<'_> {
        match self {
            EdgeStore::Growing(map) => Edges {
                inner: EdgesInner::Growing(map.iter()),
            },
            EdgeStore::Compact(slice) => Edges {
                inner: EdgesInner::Compact(slice.iter()),
            },
        }
    }

    fn compact(&mut self) {
        if let EdgeStore::Growing(map) = self {
            let mut entries: Vec<(ObjectId, EdgeBitmap)> = map.drain().collect();
            entries.sort_unstable_by_key(|(id, _)| *id);
            *self = EdgeStore::Compact(entries.into_boxed_slice());
        }
    }

    fn is_compact(&self) -> bool {
        matches!(self, EdgeStore::Compact(_))
    }
}

/// Iterator over one edge collection, yielding peers and their edge sets.
pub struct Edges<'a> {
    inner: EdgesInner<'a>,
}

enum EdgesInner<'a> {
    Growing(std::collections::hash_map::Iter<'a, ObjectId, EdgeBitmap>),
    Compact(std::slice::Iter<'a, (ObjectId, EdgeBitmap)>),
}

impl Iterator for Edges<'_> {
    type Item = (ObjectId, EdgeBitmap);

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            EdgesInner::Growing(it) => it.next().map(|(id, bits)| (*id, *bits)),
            EdgesInner::Compact(it) => it.next().copied(),
        }
    }
}

/// Structural links of an object, detached for re-homing into another graph.
#[derive(Debug, Default)]
pub(crate) struct ObjectLinks {
    pub parent: Option<ObjectId>,
    pub outbound: Vec<(ObjectId, EdgeBitmap)>,
}

// ============================================================================
// Object
// ============================================================================

/// A graph node representing a principal or resource.
#[derive(Debug, Clone)]
pub struct Object {
    identity: Arc<str>,
    object_type: ObjectType,
    attributes: BTreeMap<Attribute, Vec<AttributeValue>>,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    edges: [EdgeStore; 2],
}

impl Object {
    /// Create a detached object. It gets an id once added to an `Objects`.
    pub fn new(identity: &str, object_type: ObjectType) -> Self {
        Self {
            identity: interner::global().intern_str(identity),
            object_type,
            attributes: BTreeMap::new(),
            parent: None,
            children: Vec::new(),
            edges: [EdgeStore::default(), EdgeStore::default()],
        }
    }

    /// Add an attribute value (builder style).
    pub fn with_value(mut self, attribute: Attribute, value: AttributeValue) -> Self {
        self.add_value(attribute, value);
        self
    }

    /// The stable identity key (distinguished name, SID, ...)
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn set_object_type(&mut self, object_type: ObjectType) {
        self.object_type = object_type;
    }

    /// Add a value to a multi-valued attribute.
    ///
    /// Returns false if an equal value was already present.
    pub fn add_value(&mut self, attribute: Attribute, value: AttributeValue) -> bool {
        self.push_value(attribute, value, AllocationMode::BulkAppend)
    }

    fn push_value(
        &mut self,
        attribute: Attribute,
        value: AttributeValue,
        mode: AllocationMode,
    ) -> bool {
        let values = self.attributes.entry(attribute).or_default();
        if values.contains(&value) {
            return false;
        }
        mode.reserve(values, 1);
        values.push(value);
        true
    }

    /// All values of an attribute (empty if absent).
    pub fn values(&self, attribute: &Attribute) -> &[AttributeValue] {
        self.attributes
            .get(attribute)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of an attribute.
    pub fn first(&self, attribute: &Attribute) -> Option<&AttributeValue> {
        self.values(attribute).first()
    }

    /// First value of an attribute as a string.
    pub fn first_str(&self, attribute: &Attribute) -> Option<&str> {
        self.first(attribute).and_then(AttributeValue::as_str)
    }

    pub fn has(&self, attribute: &Attribute) -> bool {
        !self.values(attribute).is_empty()
    }

    /// Iterate attributes in name order.
    pub fn attributes(&self) -> impl Iterator<Item = (&Attribute, &[AttributeValue])> {
        self.attributes.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Human readable label: display name, then name, then identity.
    pub fn label(&self) -> &str {
        self.first_str(&Attribute::DisplayName)
            .or_else(|| self.first_str(&Attribute::Name))
            .unwrap_or(&self.identity)
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Iterate one edge collection.
    pub fn edges(&self, direction: Direction) -> Edges<'_> {
        self.edges[direction.slot()].iter()
    }

    /// Edge set towards (Out) or from (In) a peer.
    pub fn edge(&self, direction: Direction, peer: ObjectId) -> EdgeBitmap {
        self.edges[direction.slot()].get(peer)
    }

    /// Number of distinct peers in one edge collection.
    pub fn edge_count(&self, direction: Direction) -> usize {
        self.edges[direction.slot()].len()
    }

    /// Whether both edge collections have been compacted.
    pub fn is_compact(&self) -> bool {
        self.edges.iter().all(EdgeStore::is_compact)
    }

    pub(crate) fn compact(&mut self) {
        for store in &mut self.edges {
            store.compact();
        }
        self.children.shrink_to_fit();
        for values in self.attributes.values_mut() {
            values.shrink_to_fit();
        }
    }

    /// Detach parent and outbound edges, leaving a clean object. Children
    /// are dropped; the receiving graph rebuilds them from parent links.
    pub(crate) fn take_links(&mut self) -> ObjectLinks {
        let outbound = self.edges(Direction::Out).collect();
        self.edges = [EdgeStore::default(), EdgeStore::default()];
        self.children.clear();
        ObjectLinks {
            parent: self.parent.take(),
            outbound,
        }
    }

    /// Fold another object with the same identity into this one.
    ///
    /// The existing type wins unless it is `Other`. Per attribute name the
    /// first writer wins: names already present keep their values, names
    /// only the incoming object carries are copied over.
    fn absorb(&mut self, incoming: Object) -> Vec<Attribute> {
        if self.object_type == ObjectType::Other {
            self.object_type = incoming.object_type;
        }
        let mut added = Vec::new();
        for (attribute, values) in incoming.attributes {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                self.attributes.entry(attribute.clone())
            {
                slot.insert(values);
                added.push(attribute);
            }
        }
        added
    }
}

// ============================================================================
// Objects
// ============================================================================

/// An indexed collection of objects: one loader partition or the unified
/// graph.
///
/// Every collection owns exactly one root object (identity
/// [`ROOT_IDENTITY`]) that anchors objects without a discoverable parent.
/// `len()` counts the objects *besides* the root.
#[derive(Debug, Clone)]
pub struct Objects {
    objects: Vec<Object>,
    by_identity: HashMap<Arc<str>, ObjectId>,
    indexes: HashMap<Attribute, HashMap<AttributeValue, Vec<ObjectId>>>,
    root: ObjectId,
    mode: AllocationMode,
    sealed: bool,
}

impl Default for Objects {
    fn default() -> Self {
        Self::new()
    }
}

impl Objects {
    /// Create an empty collection in bulk-append mode, indexing
    /// distinguished names and SIDs.
    pub fn new() -> Self {
        Self::with_mode(AllocationMode::BulkAppend)
    }

    /// Create an empty collection with an explicit allocation mode.
    pub fn with_mode(mode: AllocationMode) -> Self {
        let mut objects = Self {
            objects: Vec::new(),
            by_identity: HashMap::new(),
            indexes: HashMap::new(),
            root: ObjectId(0),
            mode,
            sealed: false,
        };
        objects.indexes.insert(Attribute::DistinguishedName, HashMap::new());
        objects.indexes.insert(Attribute::ObjectSid, HashMap::new());
        objects.root = objects.add(Object::new(ROOT_IDENTITY, ObjectType::Root));
        objects
    }

    /// The designated root object.
    pub fn root(&self) -> ObjectId {
        self.root
    }

    /// Number of objects, not counting the root.
    pub fn len(&self) -> usize {
        self.objects.len() - 1
    }

    /// Whether the collection holds nothing but its root.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: AllocationMode) {
        self.mode = mode;
    }

    /// Whether edge collections have been sealed by finalization.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Insert an object, returning its id.
    ///
    /// If an object with the same identity exists, the incoming object is
    /// folded into it (existing type and attribute names win) and the
    /// existing id is returned.
    pub fn add(&mut self, object: Object) -> ObjectId {
        if let Some(&existing) = self.by_identity.get(&object.identity) {
            let added = self.objects[existing.index()].absorb(object);
            for attribute in added {
                self.index_attribute(existing, &attribute);
            }
            return existing;
        }

        let id = ObjectId::from_index(self.objects.len());
        self.by_identity.insert(object.identity.clone(), id);
        let mode = self.mode;
        mode.reserve(&mut self.objects, 1);
        self.objects.push(object);

        let indexed: Vec<Attribute> = self.indexes.keys().cloned().collect();
        for attribute in indexed {
            self.index_attribute(id, &attribute);
        }
        id
    }

    /// Insert a batch of objects.
    pub fn extend<I>(&mut self, batch: I)
    where
        I: IntoIterator<Item = Object>,
    {
        let batch = batch.into_iter();
        let mode = self.mode;
        mode.reserve(&mut self.objects, batch.size_hint().0);
        for object in batch {
            self.add(object);
        }
    }

    /// Reserve room for `additional` objects according to the allocation mode.
    pub fn reserve(&mut self, additional: usize) {
        let mode = self.mode;
        mode.reserve(&mut self.objects, additional);
        self.by_identity.reserve(additional);
    }

    /// Whether `id` was issued by this collection.
    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.objects.len()
    }

    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.objects.get(id.index())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.get_mut(id.index())
    }

    /// Iterate every object, root included.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (ObjectId::from_index(i), o))
    }

    /// Ids of every object, root included.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        (0..self.objects.len()).map(ObjectId::from_index)
    }

    /// Look up an object by identity key.
    pub fn find_by_identity(&self, identity: &str) -> Option<ObjectId> {
        self.by_identity.get(identity).copied()
    }

    /// First object carrying `value` in an indexed attribute.
    pub fn find(&self, attribute: &Attribute, value: &AttributeValue) -> Option<ObjectId> {
        self.find_all(attribute, value).first().copied()
    }

    /// Every object carrying `value` in an indexed attribute.
    ///
    /// Attributes without an index (see [`Objects::add_index`]) never match.
    pub fn find_all(&self, attribute: &Attribute, value: &AttributeValue) -> &[ObjectId] {
        self.indexes
            .get(attribute)
            .and_then(|index| index.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Start indexing an attribute, covering objects already present.
    pub fn add_index(&mut self, attribute: Attribute) {
        if self.indexes.contains_key(&attribute) {
            return;
        }
        self.indexes.insert(attribute.clone(), HashMap::new());
        for id in self.ids().collect::<Vec<_>>() {
            self.index_attribute(id, &attribute);
        }
    }

    fn index_attribute(&mut self, id: ObjectId, attribute: &Attribute) {
        let Some(index) = self.indexes.get_mut(attribute) else {
            return;
        };
        for value in self.objects[id.index()].values(attribute) {
            let ids = index.entry(value.clone()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// Add an attribute value to an object, keeping indexes current.
    ///
    /// Returns false if the value was already present or the id is unknown.
    pub fn add_value(&mut self, id: ObjectId, attribute: Attribute, value: AttributeValue) -> bool {
        let mode = self.mode;
        let Some(object) = self.objects.get_mut(id.index()) else {
            return false;
        };
        if !object.push_value(attribute.clone(), value.clone(), mode) {
            return false;
        }
        if let Some(index) = self.indexes.get_mut(&attribute) {
            index.entry(value).or_default().push(id);
        }
        true
    }

    /// Add a typed edge `from → to`, stored on both endpoints.
    ///
    /// Returns true if the edge was new.
    ///
    /// # Panics
    ///
    /// Panics if the graph has been finalized; edge collections are closed
    /// after finalization.
    pub fn add_edge(&mut self, from: ObjectId, to: ObjectId, edge_type: EdgeType) -> bool {
        self.add_edges(from, to, EdgeBitmap::of(edge_type))
    }

    pub(crate) fn add_edges(&mut self, from: ObjectId, to: ObjectId, edges: EdgeBitmap) -> bool {
        assert!(
            !self.sealed,
            "cannot add edges to a finalized graph ({} -> {})",
            from, to
        );
        if edges.is_empty() {
            return false;
        }
        let added = self.objects[from.index()].edges[Direction::Out.slot()].insert(to, edges);
        self.objects[to.index()].edges[Direction::In.slot()].insert(from, edges);
        added
    }

    /// Make `child` a child of `parent`, detaching it from any previous
    /// parent. Returns false for self-parenting or unknown ids.
    pub fn set_parent(&mut self, child: ObjectId, parent: ObjectId) -> bool {
        if child == parent
            || child.index() >= self.objects.len()
            || parent.index() >= self.objects.len()
        {
            return false;
        }
        if let Some(previous) = self.objects[child.index()].parent {
            if previous == parent {
                return true;
            }
            self.objects[previous.index()]
                .children
                .retain(|c| *c != child);
        }
        self.objects[child.index()].parent = Some(parent);
        let mode = self.mode;
        let children = &mut self.objects[parent.index()].children;
        mode.reserve(children, 1);
        children.push(child);
        true
    }

    /// Object count per object type (root excluded, zero counts omitted).
    pub fn statistics(&self) -> BTreeMap<ObjectType, usize> {
        let mut counts = BTreeMap::new();
        for (id, object) in self.iter() {
            if id == self.root {
                continue;
            }
            *counts.entry(object.object_type).or_insert(0) += 1;
        }
        counts
    }

    /// Edge count per edge type, counted once per directed pair and type.
    pub fn edge_statistics(&self) -> BTreeMap<EdgeType, usize> {
        let mut counts = BTreeMap::new();
        for (_, object) in self.iter() {
            for (_, bits) in object.edges(Direction::Out) {
                for edge_type in bits.iter() {
                    *counts.entry(edge_type).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub(crate) fn objects_mut(&mut self) -> &mut [Object] {
        &mut self.objects
    }

    /// Consume the collection, yielding its objects (root first) and the
    /// root id.
    pub(crate) fn into_objects(self) -> (Vec<Object>, ObjectId) {
        (self.objects, self.root)
    }

    /// Release spare capacity in the arena and indexes.
    pub(crate) fn shrink(&mut self) {
        self.objects.shrink_to_fit();
        self.by_identity.shrink_to_fit();
        for index in self.indexes.values_mut() {
            for ids in index.values_mut() {
                ids.shrink_to_fit();
            }
            index.shrink_to_fit();
        }
    }
}

impl Index<ObjectId> for Objects {
    type Output = Object;

    fn index(&self, id: ObjectId) -> &Object {
        &self.objects[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user(dn: &str, sid: &str) -> Object {
        Object::new(dn, ObjectType::Person)
            .with_value(Attribute::DistinguishedName, AttributeValue::string(dn))
            .with_value(Attribute::ObjectSid, AttributeValue::string(sid))
    }

    #[test]
    fn test_edge_type_serialization() {
        let json = serde_json::to_string(&EdgeType::MemberOfGroup).unwrap();
        assert_eq!(json, "\"MEMBER_OF_GROUP\"");
        for edge_type in EdgeType::ALL {
            let json = serde_json::to_string(&edge_type).unwrap();
            assert_eq!(json, format!("\"{}\"", edge_type.as_str()));
        }
    }

    #[test]
    fn test_edge_bitmap() {
        let mut bits = EdgeBitmap::default();
        assert!(bits.is_empty());
        assert!(bits.set(EdgeType::Owns));
        assert!(!bits.set(EdgeType::Owns));
        assert!(bits.set(EdgeType::MachineAccount));
        assert_eq!(bits.count(), 2);
        assert_eq!(
            bits.iter().collect::<Vec<_>>(),
            vec![EdgeType::Owns, EdgeType::MachineAccount]
        );
        assert!(bits.union(EdgeBitmap::of(EdgeType::RdpAccess)).contains(EdgeType::RdpAccess));
    }

    #[test]
    fn test_object_id_bounds() {
        assert_eq!(ObjectId::from_index(u32::MAX as usize).index(), u32::MAX as usize);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "object arena exceeds")]
    fn test_object_id_overflow_panics() {
        ObjectId::from_index(u32::MAX as usize + 1);
    }

    #[test]
    fn test_take_links_leaves_clean_object() {
        let mut objects = Objects::new();
        let parent = objects.add(Object::new("OU=a", ObjectType::OrganizationalUnit));
        let child = objects.add(Object::new("CN=b", ObjectType::Person));
        objects.set_parent(child, parent);
        objects.add_edge(parent, child, EdgeType::GenericAll);

        let mut detached = objects[parent].clone();
        let links = detached.take_links();
        assert_eq!(links.parent, None);
        assert_eq!(links.outbound, vec![(child, EdgeBitmap::of(EdgeType::GenericAll))]);
        assert!(detached.children().is_empty());
        assert_eq!(detached.edge_count(Direction::Out), 0);

        let mut detached = objects[child].clone();
        assert_eq!(detached.take_links().parent, Some(parent));
        assert_eq!(detached.parent(), None);
    }

    #[test]
    fn test_object_type_from_object_class() {
        assert_eq!(ObjectType::from_object_class("user"), ObjectType::Person);
        assert_eq!(ObjectType::from_object_class("Computer"), ObjectType::Computer);
        assert_eq!(ObjectType::from_object_class("domainDNS"), ObjectType::DomainDns);
        assert_eq!(ObjectType::from_object_class("msDS-Whatever"), ObjectType::Other);
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(Attribute::from_name("distinguishedName"), Attribute::DistinguishedName);
        assert_eq!(Attribute::from_name("OBJECTSID"), Attribute::ObjectSid);
        let custom = Attribute::from_name("userAccountControl");
        assert!(!custom.is_well_known());
        assert_eq!(custom.as_str(), "userAccountControl");
        assert_eq!(custom, Attribute::from_name("userAccountControl"));
    }

    #[test]
    fn test_new_objects_has_root() {
        let objects = Objects::new();
        assert!(objects.is_empty());
        assert_eq!(objects.len(), 0);
        assert_eq!(objects[objects.root()].object_type(), ObjectType::Root);
        assert_eq!(objects.find_by_identity(ROOT_IDENTITY), Some(objects.root()));
    }

    #[test]
    fn test_add_and_lookup() {
        let mut objects = Objects::new();
        let id = objects.add(user("CN=alice,DC=corp", "S-1-5-21-1-1001"));

        assert_eq!(objects.len(), 1);
        assert_eq!(objects.find_by_identity("CN=alice,DC=corp"), Some(id));
        assert_eq!(
            objects.find(&Attribute::ObjectSid, &AttributeValue::string("S-1-5-21-1-1001")),
            Some(id)
        );
        assert_eq!(objects[id].label(), "CN=alice,DC=corp");
    }

    #[test]
    fn test_attribute_values_are_sets() {
        let mut object = Object::new("x", ObjectType::Group);
        assert!(object.add_value(Attribute::Member, AttributeValue::string("a")));
        assert!(!object.add_value(Attribute::Member, AttributeValue::string("a")));
        assert!(object.add_value(Attribute::Member, AttributeValue::string("b")));
        assert_eq!(object.values(&Attribute::Member).len(), 2);
        assert!(object.values(&Attribute::Name).is_empty());
    }

    #[test]
    fn test_duplicate_identity_folds_first_writer_wins() {
        let mut objects = Objects::new();
        let first = objects.add(
            Object::new("S-1-1", ObjectType::Other)
                .with_value(Attribute::Name, AttributeValue::string("first")),
        );
        let second = objects.add(
            Object::new("S-1-1", ObjectType::Group)
                .with_value(Attribute::Name, AttributeValue::string("second"))
                .with_value(Attribute::ObjectSid, AttributeValue::string("S-1-1")),
        );

        assert_eq!(first, second);
        assert_eq!(objects.len(), 1);
        let object = &objects[first];
        assert_eq!(object.object_type(), ObjectType::Group);
        assert_eq!(object.first_str(&Attribute::Name), Some("first"));
        assert_eq!(
            objects.find(&Attribute::ObjectSid, &AttributeValue::string("S-1-1")),
            Some(first)
        );
    }

    #[test]
    fn test_edges_are_symmetric() {
        let mut objects = Objects::new();
        let alice = objects.add(user("CN=alice,DC=corp", "S-1"));
        let admins = objects.add(Object::new("CN=admins,DC=corp", ObjectType::Group));

        assert!(objects.add_edge(alice, admins, EdgeType::MemberOfGroup));
        assert!(!objects.add_edge(alice, admins, EdgeType::MemberOfGroup));
        assert!(objects.add_edge(alice, admins, EdgeType::Owns));

        let out = objects[alice].edge(Direction::Out, admins);
        let inbound = objects[admins].edge(Direction::In, alice);
        assert_eq!(out, inbound);
        assert_eq!(out.count(), 2);
        assert!(objects[admins].edge(Direction::Out, alice).is_empty());
        assert_eq!(objects.edge_statistics().get(&EdgeType::Owns), Some(&1));
    }

    #[test]
    fn test_set_parent_moves_child() {
        let mut objects = Objects::new();
        let a = objects.add(Object::new("a", ObjectType::Container));
        let b = objects.add(Object::new("b", ObjectType::Container));
        let c = objects.add(Object::new("c", ObjectType::Person));

        assert!(objects.set_parent(c, a));
        assert!(objects.set_parent(c, b));
        assert!(!objects.set_parent(c, c));

        assert_eq!(objects[c].parent(), Some(b));
        assert!(objects[a].children().is_empty());
        assert_eq!(objects[b].children(), &[c]);
    }

    #[test]
    fn test_add_index_covers_existing_objects() {
        let mut objects = Objects::new();
        let host = objects.add(
            Object::new("host", ObjectType::Machine)
                .with_value(Attribute::DnsHostName, AttributeValue::string("ws01.corp")),
        );
        let value = AttributeValue::string("ws01.corp");
        assert_eq!(objects.find(&Attribute::DnsHostName, &value), None);

        objects.add_index(Attribute::DnsHostName);
        assert_eq!(objects.find(&Attribute::DnsHostName, &value), Some(host));

        assert!(objects.add_value(host, Attribute::DnsHostName, AttributeValue::string("ws01")));
        assert_eq!(
            objects.find(&Attribute::DnsHostName, &AttributeValue::string("ws01")),
            Some(host)
        );
    }

    #[test]
    fn test_statistics_exclude_root() {
        let mut objects = Objects::new();
        objects.add(Object::new("a", ObjectType::Person));
        objects.add(Object::new("b", ObjectType::Person));
        objects.add(Object::new("c", ObjectType::Group));

        let stats = objects.statistics();
        assert_eq!(stats.get(&ObjectType::Person), Some(&2));
        assert_eq!(stats.get(&ObjectType::Group), Some(&1));
        assert_eq!(stats.get(&ObjectType::Root), None);
    }

    #[test]
    fn test_steady_state_reserve_uses_fixed_steps() {
        let mut v: Vec<u64> = Vec::new();
        AllocationMode::SteadyState.reserve(&mut v, 1);
        assert_eq!(v.capacity(), STEADY_STATE_INCREMENT);
        v.extend([1, 2, 3, 4]);
        AllocationMode::SteadyState.reserve(&mut v, 1);
        assert_eq!(v.capacity(), 2 * STEADY_STATE_INCREMENT);
    }

    #[test]
    #[should_panic(expected = "finalized graph")]
    fn test_add_edge_after_seal_panics() {
        let mut objects = Objects::new();
        let a = objects.add(Object::new("a", ObjectType::Person));
        let b = objects.add(Object::new("b", ObjectType::Person));
        objects.seal();
        objects.add_edge(a, b, EdgeType::Owns);
    }
}
