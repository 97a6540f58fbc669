//! Schematic sheet entities assembled from a decoded sheet member file.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::assemble::{
    Built, Columns, JoinError, LengthPolicy, check_len, lookup, position_required,
    resolve_one_based,
};
use crate::block::typed::{BlockType, lossy};
use crate::decode::{BlockMap, Schema, decode_with_schema};
use crate::diag::Diagnostics;
use crate::error::EdbError;

pub mod keys {
    pub const STYLE_NAME: &str = "Style.Name";
    pub const PRIM_STYLE: &str = "Prim.Style";
    pub const PRIM_COORDS: &str = "Prim.Coords";
    pub const PRIM_ID: &str = "Prim.Id";
    pub const JOINT_POS: &str = "Joint.Pos";
    pub const JOINT_ID: &str = "Joint.Id";
    pub const WIRE_JOINTS: &str = "Wire.Joints";
    pub const WIRE_NET: &str = "Wire.Net";
    pub const WIRE_ID: &str = "Wire.Id";
    pub const NET_NAME: &str = "Net.Name";
    pub const NET_LABEL: &str = "Net.Label";
    pub const LABEL_TEXT: &str = "Label.Text";
    pub const GROUP_ID: &str = "Group.Id";
    pub const GROUP_MEMBERS: &str = "Group.Members";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Primitive {
    pub id: u32,
    /// `None` for the default style.
    pub style: Option<String>,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Joint {
    pub id: u32,
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Wire {
    /// Stored topology id. Frequently disagrees with the joints it should
    /// name, so it is carried but not used for joins.
    pub id_hint: u32,
    /// 0-based index into the sheet's nets.
    pub net: Option<usize>,
    /// Pairs of 0-based joint indices.
    pub segments: Vec<(usize, usize)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Net {
    pub name: String,
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: u32,
    /// Object ids of the members.
    pub members: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Primitive,
    Joint,
    Wire,
    Net,
    Group,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::Primitive,
        Self::Joint,
        Self::Wire,
        Self::Net,
        Self::Group,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primitive => "primitive",
            Self::Joint => "joint",
            Self::Wire => "wire",
            Self::Net => "net",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = EdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EdbError::Format(format!("unknown entity kind: {s}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity<'a> {
    Primitive(&'a Primitive),
    Joint(&'a Joint),
    Wire(&'a Wire),
    Net(&'a Net),
    Group(&'a Group),
}

/// One decoded sheet. Composites are assembled on first use.
pub struct Sheet {
    blocks: BlockMap,
    primitives: Built<Primitive>,
    joints: Built<Joint>,
    wires: Built<Wire>,
    nets: Built<Net>,
    groups: Built<Group>,
}

/// Every composite of a sheet, for serialization. `None` marks a
/// composite that could not be assembled.
#[derive(Debug, Serialize)]
pub struct SheetDump<'a> {
    pub primitives: Option<&'a [Primitive]>,
    pub joints: Option<&'a [Joint]>,
    pub wires: Option<&'a [Wire]>,
    pub nets: Option<&'a [Net]>,
    pub groups: Option<&'a [Group]>,
}

impl Sheet {
    /// Shapes and count groups of the keys a sheet file carries.
    pub fn schema() -> Schema {
        use keys::*;
        Schema::new()
            .field(STYLE_NAME, BlockType::Strings)
            .grouped(PRIM_STYLE, BlockType::records(4), "prim")
            .grouped(PRIM_COORDS, BlockType::records(16), "prim")
            .field(PRIM_ID, BlockType::records(4))
            .grouped(JOINT_POS, BlockType::records(8), "joint")
            .grouped(JOINT_ID, BlockType::records(4), "joint")
            .grouped(WIRE_JOINTS, BlockType::Segments, "wire")
            .grouped(WIRE_NET, BlockType::records(4), "wire")
            .field(WIRE_ID, BlockType::records(4))
            .grouped(NET_NAME, BlockType::Strings, "net")
            .grouped(NET_LABEL, BlockType::records(4), "net")
            .field(LABEL_TEXT, BlockType::Strings)
            .grouped(GROUP_ID, BlockType::records(4), "group")
            .grouped(GROUP_MEMBERS, BlockType::Segments, "group")
    }

    pub fn from_blocks(blocks: BlockMap) -> Self {
        Self {
            blocks,
            primitives: Built::new("primitives"),
            joints: Built::new("joints"),
            wires: Built::new("wires"),
            nets: Built::new("nets"),
            groups: Built::new("groups"),
        }
    }

    /// Decode a sheet member file with [`Sheet::schema`].
    pub fn decode(buf: &[u8]) -> (Self, Diagnostics) {
        let file = decode_with_schema(buf, &Self::schema());
        (Self::from_blocks(file.blocks), file.diagnostics)
    }

    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    fn columns(&self) -> Columns<'_> {
        Columns::new(&self.blocks)
    }

    pub fn primitives(&self) -> Option<&[Primitive]> {
        self.primitives
            .get_or_build(|| build_primitives(self.columns()))
    }

    pub fn joints(&self) -> Option<&[Joint]> {
        self.joints.get_or_build(|| build_joints(self.columns()))
    }

    pub fn wires(&self) -> Option<&[Wire]> {
        self.wires.get_or_build(|| {
            let joints = self.joints().ok_or(JoinError::Dependency {
                name: "wires",
                needs: "joints",
            })?;
            let nets = self.nets().ok_or(JoinError::Dependency {
                name: "wires",
                needs: "nets",
            })?;
            build_wires(self.columns(), joints, nets.len())
        })
    }

    pub fn nets(&self) -> Option<&[Net]> {
        self.nets.get_or_build(|| build_nets(self.columns()))
    }

    pub fn groups(&self) -> Option<&[Group]> {
        self.groups.get_or_build(|| build_groups(self.columns()))
    }

    /// Entity `index` (0-based) of `kind`, if its composite could be built
    /// and the index is in range.
    pub fn entity(&self, kind: EntityKind, index: usize) -> Option<Entity<'_>> {
        match kind {
            EntityKind::Primitive => self.primitives()?.get(index).map(Entity::Primitive),
            EntityKind::Joint => self.joints()?.get(index).map(Entity::Joint),
            EntityKind::Wire => self.wires()?.get(index).map(Entity::Wire),
            EntityKind::Net => self.nets()?.get(index).map(Entity::Net),
            EntityKind::Group => self.groups()?.get(index).map(Entity::Group),
        }
    }

    /// Whether object `id` is a member of the group whose id is `group_id`.
    pub fn inside_group(&self, id: u32, group_id: u32) -> bool {
        self.groups()
            .and_then(|gs| gs.iter().find(|g| g.id == group_id))
            .is_some_and(|g| g.members.contains(&id))
    }

    pub fn dump(&self) -> SheetDump<'_> {
        SheetDump {
            primitives: self.primitives(),
            joints: self.joints(),
            wires: self.wires(),
            nets: self.nets(),
            groups: self.groups(),
        }
    }
}

fn build_primitives(cols: Columns<'_>) -> Result<Vec<Primitive>, JoinError> {
    use keys::*;
    let coords = cols.records(PRIM_COORDS, 16)?;
    let n = coords.len();
    let styles = cols.records(PRIM_STYLE, 4)?;
    check_len(PRIM_STYLE, n, styles.len(), LengthPolicy::Exact)?;
    // Deleted objects can leave stale id slots behind the live ones.
    let ids = cols.records(PRIM_ID, 4)?;
    check_len(PRIM_ID, n, ids.len(), LengthPolicy::AllowLonger)?;
    let names = cols.strings_or_empty(STYLE_NAME)?;

    coords
        .iter()
        .zip(styles.iter())
        .zip(ids.iter())
        .map(|((c, s), id)| -> Result<Primitive, JoinError> {
            let style = lookup(PRIM_STYLE, s.u32(0), names)?.map(|b| lossy(b));
            Ok(Primitive {
                id: id.u32(0),
                style,
                x1: c.i32(0),
                y1: c.i32(1),
                x2: c.i32(2),
                y2: c.i32(3),
            })
        })
        .collect()
}

fn build_joints(cols: Columns<'_>) -> Result<Vec<Joint>, JoinError> {
    use keys::*;
    let pos = cols.records(JOINT_POS, 8)?;
    let ids = cols.records(JOINT_ID, 4)?;
    check_len(JOINT_ID, pos.len(), ids.len(), LengthPolicy::Exact)?;
    Ok(pos
        .iter()
        .zip(ids.iter())
        .map(|(p, id)| Joint {
            id: id.u32(0),
            x: p.i32(0),
            y: p.i32(1),
        })
        .collect())
}

fn build_wires(cols: Columns<'_>, joints: &[Joint], nets: usize) -> Result<Vec<Wire>, JoinError> {
    use keys::*;
    let pairs = cols.segments(WIRE_JOINTS)?;
    let n = pairs.len();
    let net_refs = cols.records(WIRE_NET, 4)?;
    check_len(WIRE_NET, n, net_refs.len(), LengthPolicy::Exact)?;
    let id_hints = cols.records(WIRE_ID, 4).ok();

    let mut wires = Vec::with_capacity(n);
    for (i, (flat, net_ref)) in pairs.iter().zip(net_refs.iter()).enumerate() {
        if flat.len() % 2 != 0 {
            return Err(JoinError::Unpaired {
                field: WIRE_JOINTS.to_string(),
                len: flat.len(),
            });
        }
        let segments = flat
            .chunks_exact(2)
            .map(|p| -> Result<(usize, usize), JoinError> {
                Ok((
                    position_required(WIRE_JOINTS, p[0], joints.len())?,
                    position_required(WIRE_JOINTS, p[1], joints.len())?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let net = resolve_one_based(net_ref.u32(0));
        if let Some(k) = net {
            if k >= nets {
                return Err(JoinError::IndexOutOfRange {
                    field: WIRE_NET.to_string(),
                    raw: net_ref.u32(0),
                    len: nets,
                });
            }
        }

        let id_hint = id_hints.and_then(|h| h.get(i)).map_or(0, |r| r.u32(0));
        if let Some(&(a, b)) = segments.first() {
            if id_hint != joints[a].id && id_hint != joints[b].id {
                tracing::debug!(wire = i, id_hint, "wire id does not match its first joints");
            }
        }
        wires.push(Wire {
            id_hint,
            net,
            segments,
        });
    }
    Ok(wires)
}

fn build_nets(cols: Columns<'_>) -> Result<Vec<Net>, JoinError> {
    use keys::*;
    let names = cols.strings(NET_NAME)?;
    let labels = if cols.contains(NET_LABEL) {
        let l = cols.records(NET_LABEL, 4)?;
        check_len(NET_LABEL, names.len(), l.len(), LengthPolicy::Exact)?;
        Some(l)
    } else {
        None
    };
    let texts = cols.strings_or_empty(LABEL_TEXT)?;

    names
        .iter()
        .enumerate()
        .map(|(i, name)| -> Result<Net, JoinError> {
            let raw = labels.and_then(|l| l.get(i)).map_or(0, |r| r.u32(0));
            Ok(Net {
                name: lossy(name),
                label: lookup(NET_LABEL, raw, texts)?.map(|b| lossy(b)),
            })
        })
        .collect()
}

fn build_groups(cols: Columns<'_>) -> Result<Vec<Group>, JoinError> {
    use keys::*;
    let ids = cols.records(GROUP_ID, 4)?;
    let members = cols.segments(GROUP_MEMBERS)?;
    check_len(GROUP_MEMBERS, ids.len(), members.len(), LengthPolicy::Exact)?;
    Ok(ids
        .iter()
        .zip(members)
        .map(|(id, m)| Group {
            id: id.u32(0),
            members: m.clone(),
        })
        .collect())
}
