//! Bootable ISO-9660 image assembly.
//!
//! The writer produces a single-session image with two directory
//! hierarchies over shared file extents: the primary ISO-9660 tree with
//! mangled 8.3 identifiers and a Joliet level-3 tree carrying the real
//! names in UCS-2. One El-Torito boot catalog entry marks the image
//! bootable for EFI firmware.
//!
//! Sector layout, in order: system area (16 sectors), volume descriptors
//! (primary, boot record, supplementary, terminator), boot catalog, L/M
//! path tables for both hierarchies, directory extents (primary then
//! Joliet, breadth-first), file extents.

mod boot;
mod manifest;
mod names;
mod record;
mod volume;

pub use manifest::DirectoryManifest;
pub use volume::SECTOR_SIZE;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use names::{joliet_identifier, primary_dir_identifier, primary_file_identifier, ucs2_be};
use record::{directory_record, path_table_entry, record_len};
use volume::VolumeLayout;

/// El-Torito platform id for EFI firmware.
pub const EFI_PLATFORM_ID: u8 = 2;

/// Conventional boot-file location inside the image.
pub const DEFAULT_BOOT_PATH: &str = "BOOT/BOOTx64.efi";

/// Content injected when the source tree carries no real boot file.
pub const PLACEHOLDER_BOOT_PAYLOAD: &[u8] = b"boot\n";

#[derive(thiserror::Error, Debug)]
pub enum IsoError {
    #[error("failed to read {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{0}' is not a usable path inside the image")]
    InvalidPath(String),
    #[error("{path} is {size} bytes; a single extent cannot hold more than 4 GiB")]
    FileTooLarge { path: PathBuf, size: u64 },
    #[error("failed to write image {path}: {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

enum FileData {
    Disk(PathBuf),
    Memory(Vec<u8>),
}

struct FileNode {
    data: FileData,
    size: u64,
}

#[derive(Default)]
struct DirNode {
    dirs: BTreeMap<String, DirNode>,
    files: BTreeMap<String, FileNode>,
}

struct BootSpec {
    path: String,
    platform_id: u8,
}

/// Incremental image builder. Directories and files are accumulated into an
/// in-memory tree (`BTreeMap`s keep every traversal name-sorted and thereby
/// deterministic); `write_to` computes the sector layout and streams the
/// image out in one sequential pass.
pub struct IsoWriter {
    volume_id: String,
    root: DirNode,
    boot: Option<BootSpec>,
    unix_time: i64,
}

#[derive(Clone, Copy)]
enum ChildRef {
    Dir(usize),
    File(usize),
}

#[derive(Clone, Copy, PartialEq)]
enum Tree {
    Primary,
    Joliet,
}

#[derive(Default)]
struct FlatDir {
    parent: usize,
    path: String,
    pri_id: Vec<u8>,
    jol_id: Vec<u8>,
    /// Children in source-name scan order. Each hierarchy requires its
    /// records sorted by its own identifiers, so the per-tree orders below
    /// are derived from this after the scan.
    scan_children: Vec<ChildRef>,
    pri_children: Vec<ChildRef>,
    jol_children: Vec<ChildRef>,
    pri_size: u32,
    jol_size: u32,
    pri_lba: u32,
    jol_lba: u32,
}

impl FlatDir {
    fn id(&self, tree: Tree) -> &[u8] {
        match tree {
            Tree::Primary => &self.pri_id,
            Tree::Joliet => &self.jol_id,
        }
    }

    fn children(&self, tree: Tree) -> &[ChildRef] {
        match tree {
            Tree::Primary => &self.pri_children,
            Tree::Joliet => &self.jol_children,
        }
    }

    fn size(&self, tree: Tree) -> u32 {
        match tree {
            Tree::Primary => self.pri_size,
            Tree::Joliet => self.jol_size,
        }
    }

    fn lba(&self, tree: Tree) -> u32 {
        match tree {
            Tree::Primary => self.pri_lba,
            Tree::Joliet => self.jol_lba,
        }
    }
}

struct FlatFile<'a> {
    path: String,
    pri_id: Vec<u8>,
    jol_id: Vec<u8>,
    size: u64,
    data: &'a FileData,
    lba: u32,
}

impl FlatFile<'_> {
    fn id(&self, tree: Tree) -> &[u8] {
        match tree {
            Tree::Primary => &self.pri_id,
            Tree::Joliet => &self.jol_id,
        }
    }
}

impl IsoWriter {
    pub fn new(volume_label: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            volume_id: volume_label.to_string(),
            root: DirNode::default(),
            boot: None,
            unix_time: now,
        }
    }

    /// Pin the recording timestamp, making repeated builds of the same tree
    /// byte-identical.
    pub fn with_timestamp(mut self, unix_time: i64) -> Self {
        self.unix_time = unix_time;
        self
    }

    fn split_path(rel: &str) -> Result<Vec<String>, IsoError> {
        let rel = rel.trim_start_matches('/').trim_end_matches('/');
        let parts: Vec<String> = rel.split('/').map(str::to_string).collect();
        if rel.is_empty() || parts.iter().any(|p| p.is_empty() || p == "." || p == "..") {
            return Err(IsoError::InvalidPath(rel.to_string()));
        }
        Ok(parts)
    }

    fn dir_node(&mut self, components: &[String]) -> &mut DirNode {
        let mut node = &mut self.root;
        for part in components {
            node = node.dirs.entry(part.clone()).or_default();
        }
        node
    }

    /// Record a directory (and any missing ancestors) at `rel`.
    pub fn add_directory(&mut self, rel: &str) -> Result<(), IsoError> {
        let parts = Self::split_path(rel)?;
        self.dir_node(&parts);
        Ok(())
    }

    /// Record a file backed by `disk_path` at `rel` inside the image.
    ///
    /// The format stores a file's length in a 32-bit field, so anything over
    /// 4 GiB is rejected here rather than truncated at write time.
    pub fn add_file(&mut self, disk_path: &Path, rel: &str) -> Result<(), IsoError> {
        let parts = Self::split_path(rel)?;
        let size = std::fs::metadata(disk_path)
            .map_err(|source| IsoError::Filesystem {
                path: disk_path.to_path_buf(),
                source,
            })?
            .len();
        if size > u64::from(u32::MAX) {
            return Err(IsoError::FileTooLarge {
                path: disk_path.to_path_buf(),
                size,
            });
        }
        let (name, parents) = parts.split_last().expect("split_path rejects empty");
        self.dir_node(parents).files.insert(
            name.clone(),
            FileNode {
                data: FileData::Disk(disk_path.to_path_buf()),
                size,
            },
        );
        Ok(())
    }

    /// Record a file with in-memory content at `rel`.
    pub fn add_file_bytes(&mut self, bytes: Vec<u8>, rel: &str) -> Result<(), IsoError> {
        let parts = Self::split_path(rel)?;
        let (name, parents) = parts.split_last().expect("split_path rejects empty");
        let size = bytes.len() as u64;
        if size > u64::from(u32::MAX) {
            return Err(IsoError::FileTooLarge {
                path: PathBuf::from(rel),
                size,
            });
        }
        self.dir_node(parents).files.insert(
            name.clone(),
            FileNode {
                data: FileData::Memory(bytes),
                size,
            },
        );
        Ok(())
    }

    pub fn has_file(&self, rel: &str) -> bool {
        let Ok(parts) = Self::split_path(rel) else {
            return false;
        };
        let (name, parents) = parts.split_last().expect("split_path rejects empty");
        let mut node = &self.root;
        for part in parents {
            match node.dirs.get(part) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.files.contains_key(name)
    }

    /// Register the El-Torito boot catalog entry: bootable, no emulation,
    /// pointing at the file recorded at `boot_rel`.
    pub fn add_el_torito(&mut self, boot_rel: &str, platform_id: u8) -> Result<(), IsoError> {
        let parts = Self::split_path(boot_rel)?;
        self.boot = Some(BootSpec {
            path: parts.join("/"),
            platform_id,
        });
        Ok(())
    }

    fn flatten(&self) -> (Vec<FlatDir>, Vec<FlatFile<'_>>) {
        let mut dirs = vec![FlatDir {
            pri_id: vec![0x00],
            jol_id: vec![0x00],
            ..FlatDir::default()
        }];
        let mut files: Vec<FlatFile<'_>> = Vec::new();
        let mut queue: VecDeque<(&DirNode, usize)> = VecDeque::from([(&self.root, 0)]);

        while let Some((node, idx)) = queue.pop_front() {
            let parent_path = dirs[idx].path.clone();
            let join = |name: &str| {
                if parent_path.is_empty() {
                    name.to_string()
                } else {
                    format!("{parent_path}/{name}")
                }
            };

            // A directory and a file cannot share a name on the source
            // filesystem, so one merged name-sorted pass covers both.
            let mut taken = HashSet::new();
            let mut named: Vec<(&str, bool)> = node
                .dirs
                .keys()
                .map(|n| (n.as_str(), true))
                .chain(node.files.keys().map(|n| (n.as_str(), false)))
                .collect();
            named.sort_by_key(|(name, _)| *name);

            for (name, is_dir) in named {
                if is_dir {
                    let child = &node.dirs[name];
                    let child_idx = dirs.len();
                    dirs.push(FlatDir {
                        parent: idx,
                        path: join(name),
                        pri_id: primary_dir_identifier(name, &mut taken).into_bytes(),
                        jol_id: ucs2_be(&joliet_identifier(name)),
                        ..FlatDir::default()
                    });
                    dirs[idx].scan_children.push(ChildRef::Dir(child_idx));
                    queue.push_back((child, child_idx));
                } else {
                    let file = &node.files[name];
                    let file_idx = files.len();
                    files.push(FlatFile {
                        path: join(name),
                        pri_id: primary_file_identifier(name, &mut taken).into_bytes(),
                        jol_id: ucs2_be(&joliet_identifier(name)),
                        size: file.size,
                        data: &file.data,
                        lba: 0,
                    });
                    dirs[idx].scan_children.push(ChildRef::File(file_idx));
                }
            }
        }

        // Each hierarchy orders sibling records by its own identifiers
        // (mangled 8.3 in the primary tree, UCS-2 in Joliet), which can
        // disagree with the source-name scan order (`B` sorts before `a`,
        // their 8.3 forms the other way around).
        for idx in 0..dirs.len() {
            let sorted_by = |tree: Tree| {
                let mut order = dirs[idx].scan_children.clone();
                order.sort_by(|a, b| {
                    let id = |c: &ChildRef| match *c {
                        ChildRef::Dir(i) => dirs[i].id(tree),
                        ChildRef::File(i) => files[i].id(tree),
                    };
                    id(a).cmp(id(b))
                });
                order
            };
            let pri = sorted_by(Tree::Primary);
            let jol = sorted_by(Tree::Joliet);
            dirs[idx].pri_children = pri;
            dirs[idx].jol_children = jol;
        }

        (dirs, files)
    }

    fn extent_size(id_lens: impl Iterator<Item = usize>) -> u32 {
        let mut pos: usize = 0;
        // "." and ".." occupy the first two records of every extent.
        for len in [1usize, 1].into_iter().chain(id_lens) {
            let rl = record_len(len);
            if pos % SECTOR_SIZE + rl > SECTOR_SIZE {
                pos = pos.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
            }
            pos += rl;
        }
        (pos.div_ceil(SECTOR_SIZE) * SECTOR_SIZE) as u32
    }

    fn path_table_size(dirs: &[FlatDir], tree: Tree) -> u32 {
        dirs.iter()
            .map(|d| {
                let len = d.id(tree).len();
                (8 + len + len % 2) as u32
            })
            .sum()
    }

    fn emit_dir_extent(
        dirs: &[FlatDir],
        files: &[FlatFile<'_>],
        idx: usize,
        tree: Tree,
        unix_time: i64,
    ) -> Vec<u8> {
        let dir = &dirs[idx];
        let parent = &dirs[dir.parent];
        let size = dir.size(tree) as usize;
        let mut buf = Vec::with_capacity(size);

        let mut push = |buf: &mut Vec<u8>, rec: Vec<u8>| {
            let used = buf.len() % SECTOR_SIZE;
            // Records never cross a sector boundary.
            if used != 0 && used + rec.len() > SECTOR_SIZE {
                buf.resize(buf.len() + (SECTOR_SIZE - used), 0);
            }
            buf.extend_from_slice(&rec);
        };

        push(
            &mut buf,
            directory_record(&[0x00], dir.lba(tree), dir.size(tree), true, unix_time),
        );
        push(
            &mut buf,
            directory_record(&[0x01], parent.lba(tree), parent.size(tree), true, unix_time),
        );

        for child in dir.children(tree) {
            let rec = match *child {
                ChildRef::Dir(i) => {
                    let d = &dirs[i];
                    directory_record(d.id(tree), d.lba(tree), d.size(tree), true, unix_time)
                }
                ChildRef::File(i) => {
                    let f = &files[i];
                    directory_record(f.id(tree), f.lba, f.size as u32, false, unix_time)
                }
            };
            push(&mut buf, rec);
        }

        buf.resize(size, 0);
        buf
    }

    /// Breadth-first directory order for one hierarchy's path table:
    /// level by level, siblings by identifier.
    fn path_table_order(dirs: &[FlatDir], tree: Tree) -> Vec<usize> {
        let mut order = vec![0];
        let mut pos = 0;
        while pos < order.len() {
            for child in dirs[order[pos]].children(tree) {
                if let ChildRef::Dir(i) = *child {
                    order.push(i);
                }
            }
            pos += 1;
        }
        order
    }

    fn build_path_table(dirs: &[FlatDir], tree: Tree, big_endian: bool) -> Vec<u8> {
        let order = Self::path_table_order(dirs, tree);
        // Directory numbers are 1-based positions in the table itself.
        let mut number = vec![0u16; dirs.len()];
        for (pos, &idx) in order.iter().enumerate() {
            number[idx] = (pos + 1) as u16;
        }

        let mut table = Vec::new();
        for &idx in &order {
            let dir = &dirs[idx];
            table.extend_from_slice(&path_table_entry(
                dir.id(tree),
                dir.lba(tree),
                number[dir.parent],
                big_endian,
            ));
        }
        table
    }

    /// Compute the layout and stream the whole image to `out_path`.
    pub fn write_to(&self, out_path: &Path) -> Result<(), IsoError> {
        let (mut dirs, mut files) = self.flatten();

        let boot = match &self.boot {
            Some(spec) => {
                let idx = files
                    .iter()
                    .position(|f| f.path == spec.path)
                    .ok_or_else(|| IsoError::InvalidPath(spec.path.clone()))?;
                Some((spec.platform_id, idx))
            }
            None => None,
        };

        // Directory extent sizes per hierarchy, over that hierarchy's own
        // record order (sector-boundary packing depends on the order).
        for idx in 0..dirs.len() {
            let pri_lens: Vec<usize> = dirs[idx]
                .children(Tree::Primary)
                .iter()
                .map(|c| match *c {
                    ChildRef::Dir(i) => dirs[i].pri_id.len(),
                    ChildRef::File(i) => files[i].pri_id.len(),
                })
                .collect();
            let jol_lens: Vec<usize> = dirs[idx]
                .children(Tree::Joliet)
                .iter()
                .map(|c| match *c {
                    ChildRef::Dir(i) => dirs[i].jol_id.len(),
                    ChildRef::File(i) => files[i].jol_id.len(),
                })
                .collect();
            dirs[idx].pri_size = Self::extent_size(pri_lens.into_iter());
            dirs[idx].jol_size = Self::extent_size(jol_lens.into_iter());
        }

        let pri_table_size = Self::path_table_size(&dirs, Tree::Primary);
        let jol_table_size = Self::path_table_size(&dirs, Tree::Joliet);
        let table_sectors = |bytes: u32| bytes.div_ceil(SECTOR_SIZE as u32);

        // Sequential LBA assignment.
        let mut lba: u32 = 16 + 3 + u32::from(boot.is_some());
        let boot_catalog_lba = if boot.is_some() {
            let at = lba;
            lba += 1;
            at
        } else {
            0
        };
        let pri_l_lba = lba;
        lba += table_sectors(pri_table_size);
        let pri_m_lba = lba;
        lba += table_sectors(pri_table_size);
        let jol_l_lba = lba;
        lba += table_sectors(jol_table_size);
        let jol_m_lba = lba;
        lba += table_sectors(jol_table_size);

        for dir in dirs.iter_mut() {
            dir.pri_lba = lba;
            lba += dir.pri_size / SECTOR_SIZE as u32;
        }
        for dir in dirs.iter_mut() {
            dir.jol_lba = lba;
            lba += dir.jol_size / SECTOR_SIZE as u32;
        }

        // File extents in directory order, following the primary record
        // order inside each directory so primary extents ascend.
        let mut file_order = Vec::with_capacity(files.len());
        for idx in 0..dirs.len() {
            for child in dirs[idx].children(Tree::Primary) {
                if let ChildRef::File(i) = *child {
                    file_order.push(i);
                }
            }
        }
        for &i in &file_order {
            files[i].lba = lba;
            lba += (files[i].size.div_ceil(SECTOR_SIZE as u64)) as u32;
        }
        let total_sectors = lba;

        log::debug!(
            "image layout: {} directories, {} files, {total_sectors} sectors",
            dirs.len(),
            files.len()
        );

        // Single sequential pass over the assigned layout.
        let out = File::create(out_path).map_err(|source| IsoError::ImageWrite {
            path: out_path.to_path_buf(),
            source,
        })?;
        let mut w = SectorSink::new(BufWriter::new(out), out_path);

        w.write(&vec![0u8; 16 * SECTOR_SIZE])?;

        let pri_root = directory_record(&[0x00], dirs[0].pri_lba, dirs[0].pri_size, true, self.unix_time);
        w.write(&volume::primary(&VolumeLayout {
            volume_id: &self.volume_id,
            total_sectors,
            path_table_size: pri_table_size,
            l_path_table_lba: pri_l_lba,
            m_path_table_lba: pri_m_lba,
            root_record: &pri_root,
            unix_time: self.unix_time,
        }))?;

        if boot.is_some() {
            w.write(&volume::boot_record(boot_catalog_lba))?;
        }

        let jol_root = directory_record(&[0x00], dirs[0].jol_lba, dirs[0].jol_size, true, self.unix_time);
        w.write(&volume::supplementary(&VolumeLayout {
            volume_id: &self.volume_id,
            total_sectors,
            path_table_size: jol_table_size,
            l_path_table_lba: jol_l_lba,
            m_path_table_lba: jol_m_lba,
            root_record: &jol_root,
            unix_time: self.unix_time,
        }))?;

        w.write(&volume::terminator())?;

        if let Some((platform_id, idx)) = boot {
            w.write(&boot::catalog_sector(platform_id, files[idx].lba, files[idx].size))?;
        }

        for (tree, big_endian) in [
            (Tree::Primary, false),
            (Tree::Primary, true),
            (Tree::Joliet, false),
            (Tree::Joliet, true),
        ] {
            w.write(&Self::build_path_table(&dirs, tree, big_endian))?;
            w.pad_to_sector()?;
        }

        for tree in [Tree::Primary, Tree::Joliet] {
            for idx in 0..dirs.len() {
                w.write(&Self::emit_dir_extent(&dirs, &files, idx, tree, self.unix_time))?;
            }
        }

        for &i in &file_order {
            let file = &files[i];
            match file.data {
                FileData::Memory(bytes) => w.write(bytes)?,
                FileData::Disk(path) => w.copy_file(path, file.size)?,
            }
            w.pad_to_sector()?;
        }

        debug_assert_eq!(w.position(), total_sectors as u64 * SECTOR_SIZE as u64);

        w.finish()
    }
}

/// Sequential sector-granular sink over the output file.
struct SectorSink<'a> {
    inner: BufWriter<File>,
    out_path: &'a Path,
    written: u64,
}

impl<'a> SectorSink<'a> {
    fn new(inner: BufWriter<File>, out_path: &'a Path) -> Self {
        Self {
            inner,
            out_path,
            written: 0,
        }
    }

    fn position(&self) -> u64 {
        self.written
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), IsoError> {
        self.inner
            .write_all(bytes)
            .map_err(|source| IsoError::ImageWrite {
                path: self.out_path.to_path_buf(),
                source,
            })?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn pad_to_sector(&mut self) -> Result<(), IsoError> {
        let rem = self.written % SECTOR_SIZE as u64;
        if rem != 0 {
            let pad = vec![0u8; SECTOR_SIZE - rem as usize];
            self.write(&pad)?;
        }
        Ok(())
    }

    /// Copy exactly `size` bytes from `path`, zero-padding if the file
    /// shrank since it was recorded.
    fn copy_file(&mut self, path: &Path, size: u64) -> Result<(), IsoError> {
        let file = File::open(path).map_err(|source| IsoError::Filesystem {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = file.take(size);
        let mut buf = [0u8; 64 * 1024];
        let mut copied: u64 = 0;
        loop {
            let n = reader.read(&mut buf).map_err(|source| IsoError::Filesystem {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            self.write(&buf[..n])?;
            copied += n as u64;
        }
        if copied < size {
            self.write(&vec![0u8; (size - copied) as usize])?;
        }
        Ok(())
    }

    fn finish(self) -> Result<(), IsoError> {
        let map = |source: io::Error, path: &Path| IsoError::ImageWrite {
            path: path.to_path_buf(),
            source,
        };
        let file = self
            .inner
            .into_inner()
            .map_err(|e| map(e.into_error(), self.out_path))?;
        file.sync_all().map_err(|e| map(e, self.out_path))
    }
}

/// Assemble a bootable image from a directory tree.
///
/// Walks `source` into a sorted manifest, records every directory and file
/// under the same relative path in both hierarchies, ensures a boot file at
/// `boot_file` (the tree's own file when present, a placeholder otherwise),
/// registers the EFI El-Torito entry, and writes `<volume_label>.iso` under
/// `out_dir`. The image is written under a temporary name and renamed on
/// success, so a failed build never leaves a truncated image at the final
/// path.
pub fn build_bootable_image(
    source: &Path,
    boot_file: &str,
    volume_label: &str,
    out_dir: &Path,
) -> Result<PathBuf, IsoError> {
    let boot_rel = boot_file.trim_start_matches('/');

    let manifest = DirectoryManifest::scan(source)?;
    log::info!(
        "assembling {volume_label}.iso from {} ({} directories, {} files)",
        source.display(),
        manifest.directories().len(),
        manifest.files().len()
    );

    let mut writer = IsoWriter::new(volume_label);
    for dir in manifest.directories() {
        writer.add_directory(dir)?;
    }
    for rel in manifest.files() {
        let disk_path = rel.split('/').fold(source.to_path_buf(), |p, c| p.join(c));
        writer.add_file(&disk_path, rel)?;
    }

    if writer.has_file(boot_rel) {
        log::info!("using boot file {boot_rel} from the source tree");
    } else {
        log::warn!(
            "{boot_rel} not present in the source tree; injecting placeholder \
             content, the image will not genuinely boot"
        );
        writer.add_file_bytes(PLACEHOLDER_BOOT_PAYLOAD.to_vec(), boot_rel)?;
    }
    writer.add_el_torito(boot_rel, EFI_PLATFORM_ID)?;

    let final_path = out_dir.join(format!("{volume_label}.iso"));
    let part_path = out_dir.join(format!("{volume_label}.iso.part"));

    if let Err(err) = writer.write_to(&part_path) {
        let _ = std::fs::remove_file(&part_path);
        return Err(err);
    }
    std::fs::rename(&part_path, &final_path).map_err(|source| IsoError::ImageWrite {
        path: final_path.clone(),
        source,
    })?;

    Ok(final_path)
}
