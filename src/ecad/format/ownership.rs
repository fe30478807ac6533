//! Record ownership resolution.
//!
//! Records reference their owner by stream position through the
//! `OWNERINDEX` key, and the format guarantees owners are written before
//! the records they own. Reading therefore resolves owners in a single
//! forward pass; writing walks the forest pre-order and renumbers every
//! record so the invariant holds again, no matter how the in-memory tree
//! was edited.
//!
//! Resolution is deliberately forgiving: a record whose owner index points
//! at itself, forward, or out of range is demoted to a root with a warning
//! rather than failing the whole section. -1 is the ordinary no-owner
//! marker and stays silent.

use log::debug;

use crate::ecad::context::Context;
use crate::ecad::types::models::{NO_OWNER, Record};

/// Resolves `owner_index` references into parent/child links.
///
/// Clears any existing links first, then links each record to its owner
/// when the index refers to an earlier record in the stream. Returns the
/// root positions in stream order.
pub fn build_ownership_tree(records: &mut [Record], ctx: &mut Context) -> Vec<usize> {
    for record in records.iter_mut() {
        record.children.clear();
        record.parent = None;
    }

    let mut roots = Vec::new();
    for position in 0..records.len() {
        let owner = records[position].owner_index;
        if owner >= 0 && (owner as usize) < position {
            records[position].parent = Some(owner as usize);
            records[owner as usize].children.push(position);
        } else {
            if owner != NO_OWNER {
                ctx.warn(format!(
                    "record {position} claims unresolvable owner {owner}, treating as root"
                ));
            }
            roots.push(position);
        }
    }

    debug!(
        "ownership tree: {} records, {} roots",
        records.len(),
        roots.len()
    );
    roots
}

/// One record's place in the serialized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emission {
    /// Position of the record in the section's record vector.
    pub record: usize,
    /// Position the record will occupy in the output stream.
    pub position: usize,
    /// Owner index to store with the record, already renumbered to output
    /// positions. [`NO_OWNER`] for roots.
    pub owner_index: i32,
}

/// Flattens the forest into output order.
///
/// Walks each root's subtree pre-order, so every record is emitted after
/// its owner. Sibling order follows the `children` vectors; root order
/// follows `roots`. The returned emissions are in output order.
///
/// Hand-edited links get the same tolerance as on-disk owner indices: a
/// link that would emit a record twice (a duplicate or a cycle) or that
/// points outside the record vector is dropped with a warning, so every
/// record is emitted at most once and the walk always terminates.
pub fn assign_emission_indices(
    records: &[Record],
    roots: &[usize],
    ctx: &mut Context,
) -> Vec<Emission> {
    let mut emissions = Vec::with_capacity(records.len());
    let mut emitted = vec![false; records.len()];
    let mut stack: Vec<(usize, i32)> = roots.iter().rev().map(|&r| (r, NO_OWNER)).collect();

    while let Some((record, owner_index)) = stack.pop() {
        if record >= records.len() {
            ctx.warn(format!("ownership link points at missing record {record}"));
            continue;
        }
        if emitted[record] {
            ctx.warn(format!(
                "record {record} is linked from more than one owner, keeping the first link"
            ));
            continue;
        }
        emitted[record] = true;
        let position = emissions.len();
        emissions.push(Emission {
            record,
            position,
            owner_index,
        });
        for &child in records[record].children.iter().rev() {
            stack.push((child, position as i32));
        }
    }
    emissions
}
