//! Tar-of-tars packaging for phase 3's aggregation step and phase 4's
//! unpacking.
//!
//! Every node owns one inner tar: N members in slot order, every member
//! named after that node's own id (the same name repeated N times — tar
//! permits duplicate member names, and only sequential iteration order is
//! load-bearing here). The leader collects N inner tars into one outer tar
//! whose member names are unused placeholders; only the inner tars' member
//! names are ever read back.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use bulk_types::{NodeId, ProtocolError};

/// Builds this node's inner tar: `slot_files[k]` becomes the tar's `k`th
/// member, every member named `self_id`.
pub fn pack_node_tar(
    self_id: NodeId,
    slot_files: &[PathBuf],
    out_path: &Path,
) -> Result<(), ProtocolError> {
    let file = File::create(out_path).map_err(ProtocolError::Io)?;
    let mut builder = tar::Builder::new(file);
    let name = self_id.to_string();
    for path in slot_files {
        builder
            .append_path_with_name(path, &name)
            .map_err(ProtocolError::Io)?;
    }
    builder.finish().map_err(ProtocolError::Io)?;
    Ok(())
}

/// Builds the outer tar from every node's inner tar. Member names are
/// unused placeholders; only arrival order into this function matters, and
/// that is not semantically significant either (phase 4 reads the inner
/// tars' member names, not the outer tar's).
pub fn pack_outer(node_tars: &[PathBuf], out_path: &Path) -> Result<(), ProtocolError> {
    let file = File::create(out_path).map_err(ProtocolError::Io)?;
    let mut builder = tar::Builder::new(file);
    for path in node_tars {
        builder
            .append_path_with_name(path, "-1")
            .map_err(ProtocolError::Io)?;
    }
    builder.finish().map_err(ProtocolError::Io)?;
    Ok(())
}

/// Unpacks the outer tar into one contributor map per slot.
///
/// Returns a `Vec` of length `n_nodes`, indexed by slot; `result[k]` maps
/// every contributor's id to the file it produced for that slot. Every
/// inner tar's members are read in their stored order, which is the slot
/// order established when the contributing node wrote its own tar.
pub fn unpack_outer(
    outer_path: &Path,
    n_nodes: usize,
    temp_dir: &Path,
) -> Result<Vec<BTreeMap<NodeId, PathBuf>>, ProtocolError> {
    let mut slots: Vec<BTreeMap<NodeId, PathBuf>> = (0..n_nodes).map(|_| BTreeMap::new()).collect();

    let outer_file = File::open(outer_path).map_err(ProtocolError::Io)?;
    let mut outer = tar::Archive::new(outer_file);
    let mut outer_entries = outer.entries().map_err(ProtocolError::Io)?;

    for node_idx in 0..n_nodes {
        let mut entry = outer_entries
            .next()
            .ok_or_else(|| ProtocolError::Archive(format!("outer tar missing member {node_idx}")))?
            .map_err(ProtocolError::Io)?;

        let inner_path = temp_dir.join(format!("inner-{node_idx}.tar"));
        let mut inner_file = File::create(&inner_path).map_err(ProtocolError::Io)?;
        std::io::copy(&mut entry, &mut inner_file).map_err(ProtocolError::Io)?;
        drop(inner_file);

        let inner_file = File::open(&inner_path).map_err(ProtocolError::Io)?;
        let mut inner = tar::Archive::new(inner_file);
        let mut inner_entries = inner.entries().map_err(ProtocolError::Io)?;

        for slot in 0..n_nodes {
            let mut inner_entry = inner_entries
                .next()
                .ok_or_else(|| {
                    ProtocolError::Archive(format!("inner tar {node_idx} missing slot {slot}"))
                })?
                .map_err(ProtocolError::Io)?;

            let raw_name = inner_entry
                .path()
                .map_err(ProtocolError::Io)?
                .to_string_lossy()
                .into_owned();
            let contributor: u16 = raw_name.parse().map_err(|_| {
                ProtocolError::Archive(format!("non-numeric contributor id {raw_name:?}"))
            })?;
            let contributor = NodeId::new(contributor);

            let slot_path = temp_dir.join(format!("slot-{slot}-from-{contributor}.bin"));
            let mut out = File::create(&slot_path).map_err(ProtocolError::Io)?;
            std::io::copy(&mut inner_entry, &mut out).map_err(ProtocolError::Io)?;

            slots[slot].insert(contributor, slot_path);
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_file(path: &Path, contents: &[u8]) {
        let mut f = File::create(path).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn pack_and_unpack_round_trips_per_slot_contributors() {
        let tmp = tempfile::tempdir().unwrap();
        let n_nodes = 3;

        // Build one inner tar per node, each contributing distinct bytes
        // per slot so we can verify which contributor ended up where.
        let mut node_tars = Vec::new();
        for node in 0..n_nodes {
            let mut slot_files = Vec::new();
            for slot in 0..n_nodes {
                let path = tmp.path().join(format!("n{node}-s{slot}.bin"));
                write_file(&path, format!("node{node}-slot{slot}").as_bytes());
                slot_files.push(path);
            }
            let tar_path = tmp.path().join(format!("node-{node}.tar"));
            pack_node_tar(NodeId::new(node as u16), &slot_files, &tar_path).unwrap();
            node_tars.push(tar_path);
        }

        let outer_path = tmp.path().join("outer.tar");
        pack_outer(&node_tars, &outer_path).unwrap();

        let unpack_dir = tmp.path().join("unpacked");
        std::fs::create_dir(&unpack_dir).unwrap();
        let slots = unpack_outer(&outer_path, n_nodes, &unpack_dir).unwrap();

        assert_eq!(slots.len(), n_nodes);
        for slot in 0..n_nodes {
            assert_eq!(slots[slot].len(), n_nodes);
            for node in 0..n_nodes {
                let contributor = NodeId::new(node as u16);
                let path = &slots[slot][&contributor];
                let contents = std::fs::read(path).unwrap();
                assert_eq!(contents, format!("node{node}-slot{slot}").as_bytes());
            }
        }
    }
}
