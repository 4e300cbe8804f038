//! Object database (C2).
//!
//! A [`Database`] is a fixed table of [`Descriptor`]s (immutable, built
//! once by [`Database::build`]) alongside a parallel table of mutable
//! [`Meta`] slots — the split the REDESIGN notes ask for in place of the
//! original's `X-macro`-populated static tables. An [`Oref`] is a stable
//! `(database_id, slot)` handle; `slot == ROOT` is the virtual root
//! (`id = 0`, type group) that every top-level object's `parent_id` points
//! at, and is never itself a table row.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicI32, AtomicU16, Ordering},
};

use ahash::AHashMap;

use crate::error::Error;

pub type DatabaseId = u8;

/// Sentinel slot naming the virtual root, per §3.
pub const ROOT: u32 = u32::MAX;
/// Sentinel slot meaning "unrestricted parent lookup", per §3.
pub const ANY: u32 = u32::MAX - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Oref {
    pub database_id: DatabaseId,
    pub slot: u32,
}

impl Oref {
    pub fn is_root(self) -> bool {
        self.slot == ROOT
    }
}

pub mod access {
    pub const USER_READ: u16 = 1 << 0;
    pub const USER_WRITE: u16 = 1 << 1;
    pub const EXPERT_READ: u16 = 1 << 2;
    pub const EXPERT_WRITE: u16 = 1 << 3;
    pub const MAKER_READ: u16 = 1 << 4;
    pub const MAKER_WRITE: u16 = 1 << 5;
    pub const READ_MASK: u16 = USER_READ | EXPERT_READ | MAKER_READ;
    pub const WRITE_MASK: u16 = USER_WRITE | EXPERT_WRITE | MAKER_WRITE;
    pub const ANY: u16 = READ_MASK | WRITE_MASK;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayElement {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
}

/// Default decimal places for a float object's text rendering (the
/// two-decimal convention the `Bat_V`/`Bat_A` measurement fixtures use).
pub const DEFAULT_F32_PRECISION: u8 = 2;

/// An object's static type, per §3.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    /// `precision` is the number of decimal places the text encoding
    /// renders with (`detail`'s float-precision meaning); the binary
    /// encoding always carries the exact value.
    F32 { precision: u8 },
    Decfrac { exponent: i8 },
    String { capacity: u16 },
    Bytes { capacity: u16 },
    Array { element: ArrayElement, capacity: u16 },
    Group,
    Function,
    Subset,
}

/// The current value held by a leaf, array, or subset object.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    Decfrac { exponent: i8, mantissa: i64 },
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Unit,
}

/// A parameterless side-effecting callback: EXEC targets and the
/// change-callback a group may carry (§4.8).
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// The immutable part of an object: everything fixed at database-build
/// time.
pub struct Descriptor {
    pub id: u16,
    pub name: String,
    pub parent_id: u16,
    pub ty: ObjectType,
    pub access_default: u16,
    pub subsets_default: u16,
    pub callback: Option<Callback>,
}

/// The mutable part of an object, one per slot, indexed in parallel with
/// `descriptors`.
struct Meta {
    access: AtomicU16,
    subsets: AtomicU16,
    detail: AtomicI32,
    value: RwLock<Value>,
}

/// A builder accumulating descriptors before [`Database::build`] checks
/// for duplicate ids and freezes the table.
#[derive(Default)]
pub struct Builder {
    rows: Vec<Descriptor>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, descriptor: Descriptor) -> Self {
        self.rows.push(descriptor);
        self
    }

    /// Freeze the table, reporting a duplicate id as an init-time error
    /// rather than letting it surface as a confusing first-use bug (§4.2).
    pub fn build(self, database_id: DatabaseId) -> Result<Database, Error> {
        let mut by_id = AHashMap::with_capacity(self.rows.len());
        for (slot, row) in self.rows.iter().enumerate() {
            if by_id.insert(row.id, slot as u32).is_some() {
                return Err(Error::Conflict);
            }
        }

        let meta = self
            .rows
            .iter()
            .map(|row| Meta {
                access: AtomicU16::new(row.access_default),
                subsets: AtomicU16::new(row.subsets_default),
                detail: AtomicI32::new(0),
                value: RwLock::new(default_value(&row.ty)),
            })
            .collect();

        Ok(Database { id: database_id, descriptors: self.rows, meta, by_id })
    }
}

fn default_value(ty: &ObjectType) -> Value {
    match ty {
        ObjectType::Bool => Value::Bool(false),
        ObjectType::U8 => Value::U8(0),
        ObjectType::I8 => Value::I8(0),
        ObjectType::U16 => Value::U16(0),
        ObjectType::I16 => Value::I16(0),
        ObjectType::U32 => Value::U32(0),
        ObjectType::I32 => Value::I32(0),
        ObjectType::U64 => Value::U64(0),
        ObjectType::I64 => Value::I64(0),
        ObjectType::F32 { .. } => Value::F32(0.0),
        ObjectType::Decfrac { exponent } => Value::Decfrac { exponent: *exponent, mantissa: 0 },
        ObjectType::String { .. } => Value::String(String::new()),
        ObjectType::Bytes { .. } => Value::Bytes(Vec::new()),
        ObjectType::Array { .. } => Value::Array(Vec::new()),
        ObjectType::Group | ObjectType::Function | ObjectType::Subset => Value::Unit,
    }
}

pub struct Database {
    pub id: DatabaseId,
    descriptors: Vec<Descriptor>,
    meta: Vec<Meta>,
    by_id: AHashMap<u16, u32>,
}

impl Database {
    fn oref(&self, slot: u32) -> Oref {
        Oref { database_id: self.id, slot }
    }

    pub fn descriptor(&self, oref: Oref) -> Option<&Descriptor> {
        if oref.slot == ROOT {
            return None;
        }
        self.descriptors.get(oref.slot as usize)
    }

    fn meta(&self, oref: Oref) -> Option<&Meta> {
        self.meta.get(oref.slot as usize)
    }

    pub fn oref_by_id(&self, id: u16) -> Option<Oref> {
        if id == 0 {
            return Some(self.oref(ROOT));
        }
        self.by_id.get(&id).map(|&slot| self.oref(slot))
    }

    fn parent_id_of(&self, oref: Oref) -> Option<u16> {
        if oref.is_root() { Some(0) } else { self.descriptor(oref).map(|d| d.id) }
    }

    /// Resolve one path segment by name under `parent`. `ANY`/`ROOT`
    /// parents both search top-level (`parent_id == 0`) objects.
    pub fn oref_by_name(&self, parent: Oref, name: &str) -> Option<Oref> {
        let parent_id = if parent.slot == ANY { 0 } else { self.parent_id_of(parent)? };
        self.descriptors
            .iter()
            .enumerate()
            .find(|(_, d)| d.parent_id == parent_id && d.name == name)
            .map(|(slot, _)| self.oref(slot as u32))
    }

    /// Resolve a slash-separated path. A leading `/` rewinds to root; a
    /// trailing slash strips the final empty segment (§4.2).
    pub fn oref_by_path(&self, parent: Oref, path: &str) -> Option<Oref> {
        let path = path.strip_suffix('/').unwrap_or(path);
        let (mut cur, path) = if let Some(rest) = path.strip_prefix('/') {
            (self.oref(ROOT), rest)
        } else {
            (parent, path)
        };
        if path.is_empty() {
            return Some(cur);
        }
        for segment in path.split('/') {
            cur = self.oref_by_name(cur, segment)?;
        }
        Some(cur)
    }

    fn parent_id_for_children(&self, oref: Oref) -> u16 {
        if oref.is_root() { 0 } else { self.descriptor(oref).map(|d| d.id).unwrap_or(u16::MAX) }
    }

    pub fn child_count(&self, oref: Oref) -> usize {
        let parent_id = self.parent_id_for_children(oref);
        self.descriptors.iter().filter(|d| d.parent_id == parent_id).count()
    }

    pub fn child_first(&self, oref: Oref) -> Option<Oref> {
        let parent_id = self.parent_id_for_children(oref);
        self.descriptors
            .iter()
            .position(|d| d.parent_id == parent_id)
            .map(|slot| self.oref(slot as u32))
    }

    pub fn child_next(&self, oref: Oref, after: Oref) -> Option<Oref> {
        let parent_id = self.parent_id_for_children(oref);
        self.descriptors
            .iter()
            .enumerate()
            .skip(after.slot as usize + 1)
            .find(|(_, d)| d.parent_id == parent_id)
            .map(|(slot, _)| self.oref(slot as u32))
    }

    pub fn children(&self, oref: Oref) -> Vec<Oref> {
        let parent_id = self.parent_id_for_children(oref);
        self.descriptors
            .iter()
            .enumerate()
            .filter(|(_, d)| d.parent_id == parent_id)
            .map(|(slot, _)| self.oref(slot as u32))
            .collect()
    }

    /// All objects in database order whose `subsets` bits intersect `mask`
    /// (§4.10).
    pub fn members_of_subset(&self, mask: u16) -> Vec<Oref> {
        self.meta
            .iter()
            .enumerate()
            .filter(|(_, m)| m.subsets.load(Ordering::Relaxed) & mask != 0)
            .map(|(slot, _)| self.oref(slot as u32))
            .collect()
    }

    pub fn access(&self, oref: Oref) -> u16 {
        if oref.is_root() {
            return access::ANY;
        }
        self.meta(oref).map(|m| m.access.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn set_access(&self, oref: Oref, access: u16) {
        if let Some(m) = self.meta(oref) {
            m.access.store(access, Ordering::Relaxed);
        }
    }

    pub fn subsets(&self, oref: Oref) -> u16 {
        self.meta(oref).map(|m| m.subsets.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn set_subsets(&self, oref: Oref, subsets: u16) {
        if let Some(m) = self.meta(oref) {
            m.subsets.store(subsets, Ordering::Relaxed);
        }
    }

    pub fn detail(&self, oref: Oref) -> i32 {
        self.meta(oref).map(|m| m.detail.load(Ordering::Relaxed)).unwrap_or(0)
    }

    pub fn set_detail(&self, oref: Oref, detail: i32) {
        if let Some(m) = self.meta(oref) {
            m.detail.store(detail, Ordering::Relaxed);
        }
    }

    pub fn value(&self, oref: Oref) -> Option<Value> {
        self.meta(oref).map(|m| m.value.read().unwrap().clone())
    }

    pub fn set_value(&self, oref: Oref, value: Value) {
        if let Some(m) = self.meta(oref) {
            *m.value.write().unwrap() = value;
        }
    }

    /// `may_read(oref, auth) = (access & READ_MASK & auth) != 0`; the root
    /// reference is always readable (§4.2).
    pub fn may_read(&self, oref: Oref, auth: u16) -> bool {
        oref.is_root() || (self.access(oref) & access::READ_MASK & auth) != 0
    }

    /// Analogous to [`Self::may_read`] for the write mask.
    pub fn may_write(&self, oref: Oref, auth: u16) -> bool {
        oref.is_root() || (self.access(oref) & access::WRITE_MASK & auth) != 0
    }

    pub fn invoke(&self, oref: Oref) -> Result<(), Error> {
        let descriptor = self.descriptor(oref).ok_or(Error::NotFound)?;
        match &descriptor.ty {
            ObjectType::Function => {
                if let Some(cb) = &descriptor.callback {
                    cb();
                }
                Ok(())
            }
            _ => Err(Error::MethodNotAllowed),
        }
    }

    /// Invoke a group's change callback, if it owns one (§4.8).
    pub fn invoke_group_callback(&self, oref: Oref) {
        if let Some(descriptor) = self.descriptor(oref) {
            if let Some(cb) = &descriptor.callback {
                cb();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: u16, name: &str, parent_id: u16, ty: ObjectType, access: u16) -> Descriptor {
        Descriptor {
            id,
            name: name.to_string(),
            parent_id,
            ty,
            access_default: access,
            subsets_default: 0,
            callback: None,
        }
    }

    fn sample_db() -> Database {
        Builder::new()
            .push(leaf(0x70, "meas", 0, ObjectType::Group, access::ANY))
            .push(leaf(0x71, "Bat_V", 0x70, ObjectType::F32 { precision: DEFAULT_F32_PRECISION }, access::READ_MASK))
            .push(leaf(0x72, "Bat_A", 0x70, ObjectType::F32 { precision: DEFAULT_F32_PRECISION }, access::READ_MASK))
            .push(leaf(0x73, "Ambient_degC", 0x70, ObjectType::I16, access::READ_MASK))
            .build(0)
            .unwrap()
    }

    #[test]
    fn path_resolution() {
        let db = sample_db();
        let root = Oref { database_id: 0, slot: ROOT };
        let meas = db.oref_by_path(root, "meas").unwrap();
        assert_eq!(db.descriptor(meas).unwrap().id, 0x70);
        let bat_v = db.oref_by_path(root, "meas/Bat_V").unwrap();
        assert_eq!(db.descriptor(bat_v).unwrap().id, 0x71);
        assert_eq!(db.oref_by_path(root, "/meas/Bat_V/").unwrap(), bat_v);
    }

    #[test]
    fn duplicate_id_is_rejected_at_build() {
        let dup = Builder::new()
            .push(leaf(1, "a", 0, ObjectType::Bool, 0))
            .push(leaf(1, "b", 0, ObjectType::Bool, 0))
            .build(0);
        assert_eq!(dup.err(), Some(Error::Conflict));
    }

    #[test]
    fn root_is_always_accessible() {
        let db = sample_db();
        let root = Oref { database_id: 0, slot: ROOT };
        assert!(db.may_read(root, 0));
        assert!(db.may_write(root, 0));
    }

    #[test]
    fn read_only_leaf_rejects_write_auth() {
        let db = sample_db();
        let bat_v = db.oref_by_id(0x71).unwrap();
        assert!(db.may_read(bat_v, access::USER_READ));
        assert!(!db.may_write(bat_v, access::USER_WRITE));
    }

    #[test]
    fn children_are_in_database_order() {
        let db = sample_db();
        let meas = db.oref_by_id(0x70).unwrap();
        let ids: Vec<u16> = db.children(meas).iter().map(|&o| db.descriptor(o).unwrap().id).collect();
        assert_eq!(ids, vec![0x71, 0x72, 0x73]);
    }
}
