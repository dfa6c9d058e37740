//! End-to-end checks on assembled images: descriptor layout, El-Torito
//! bootability, Joliet tree contents and build determinism.

use std::fs;
use std::path::Path;

use macforge::iso::{self, DirectoryManifest, IsoWriter, SECTOR_SIZE};

fn fixture_tree() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("a")).unwrap();
    fs::create_dir(tmp.path().join("b")).unwrap();
    fs::write(tmp.path().join("a").join("x.txt"), b"x").unwrap();
    fs::write(tmp.path().join("a").join("y.txt"), b"y").unwrap();
    fs::write(tmp.path().join("b").join("z.txt"), b"z").unwrap();
    tmp
}

fn build_image(source: &Path, out: &Path) {
    let manifest = DirectoryManifest::scan(source).unwrap();
    let mut writer = IsoWriter::new("OPENCORE").with_timestamp(1_600_000_000);
    for dir in manifest.directories() {
        writer.add_directory(dir).unwrap();
    }
    for rel in manifest.files() {
        let disk = rel.split('/').fold(source.to_path_buf(), |p, c| p.join(c));
        writer.add_file(&disk, rel).unwrap();
    }
    writer
        .add_file_bytes(iso::PLACEHOLDER_BOOT_PAYLOAD.to_vec(), "BOOT/BOOTx64.efi")
        .unwrap();
    writer
        .add_el_torito("BOOT/BOOTx64.efi", iso::EFI_PLATFORM_ID)
        .unwrap();
    writer.write_to(out).unwrap();
}

fn sector(image: &[u8], lba: u32) -> &[u8] {
    let start = lba as usize * SECTOR_SIZE;
    &image[start..start + SECTOR_SIZE]
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes[..4].try_into().unwrap())
}

/// Decode a UCS-2BE Joliet identifier.
fn joliet_name(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|p| u16::from_be_bytes([p[0], p[1]]))
        .collect();
    String::from_utf16(&units).unwrap()
}

/// Walk one Joliet directory extent, returning (name, extent, size, is_dir)
/// for every child record.
fn read_children(image: &[u8], extent: u32, size: u32) -> Vec<(String, u32, u32, bool)> {
    let start = extent as usize * SECTOR_SIZE;
    let data = &image[start..start + size as usize];
    let mut children = Vec::new();
    let mut pos = 0;
    let mut seen = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 {
            // Records never cross sector boundaries; skip padding.
            pos = (pos / SECTOR_SIZE + 1) * SECTOR_SIZE;
            continue;
        }
        let rec = &data[pos..pos + len];
        let id_len = rec[32] as usize;
        let is_dir = rec[25] & 0x02 != 0;
        if seen >= 2 {
            // The first two records are "." and "..".
            children.push((
                joliet_name(&rec[33..33 + id_len]),
                le_u32(&rec[2..6]),
                le_u32(&rec[10..14]),
                is_dir,
            ));
        }
        seen += 1;
        pos += len;
    }
    children
}

fn collect_files(
    image: &[u8],
    extent: u32,
    size: u32,
    prefix: &str,
    out: &mut Vec<(String, u32, u32)>,
    dirs: &mut Vec<String>,
) {
    for (name, child_extent, child_size, is_dir) in read_children(image, extent, size) {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if is_dir {
            dirs.push(path.clone());
            collect_files(image, child_extent, child_size, &path, out, dirs);
        } else {
            out.push((path, child_extent, child_size));
        }
    }
}

/// Joliet root directory record lives at offset 156 of the SVD.
fn joliet_root(image: &[u8]) -> (u32, u32) {
    let svd = sector(image, 18);
    (le_u32(&svd[158..162]), le_u32(&svd[166..170]))
}

#[test]
fn volume_descriptor_set_layout() {
    let tmp = fixture_tree();
    let out = tmp.path().join("out.iso");
    build_image(tmp.path(), &out);
    let image = fs::read(&out).unwrap();

    assert_eq!(image.len() % SECTOR_SIZE, 0);

    let pvd = sector(&image, 16);
    assert_eq!(pvd[0], 1);
    assert_eq!(&pvd[1..6], b"CD001");
    assert_eq!(&pvd[40..48], b"OPENCORE");

    let boot_record = sector(&image, 17);
    assert_eq!(boot_record[0], 0);
    assert_eq!(&boot_record[7..30], b"EL TORITO SPECIFICATION");

    let svd = sector(&image, 18);
    assert_eq!(svd[0], 2);
    assert_eq!(&svd[88..91], b"%/E");

    assert_eq!(sector(&image, 19)[0], 255);

    // Recorded volume size matches the file on disk.
    let total_sectors = le_u32(&pvd[80..84]);
    assert_eq!(image.len(), total_sectors as usize * SECTOR_SIZE);
}

#[test]
fn el_torito_entry_is_bootable_for_efi() {
    let tmp = fixture_tree();
    let out = tmp.path().join("out.iso");
    build_image(tmp.path(), &out);
    let image = fs::read(&out).unwrap();

    let catalog_lba = le_u32(&sector(&image, 17)[71..75]);
    let catalog = sector(&image, catalog_lba);

    // Validation entry: platform id 2 (EFI), key bytes, zero word sum.
    assert_eq!(catalog[0], 0x01);
    assert_eq!(catalog[1], 2);
    assert_eq!(catalog[0x1e], 0x55);
    assert_eq!(catalog[0x1f], 0xAA);
    let mut sum: u32 = 0;
    for pair in catalog[..32].chunks_exact(2) {
        sum = (sum + u16::from_le_bytes([pair[0], pair[1]]) as u32) & 0xFFFF;
    }
    assert_eq!(sum, 0);

    // Initial entry: bootable, no emulation, pointing at the boot payload.
    assert_eq!(catalog[32], 0x88);
    assert_eq!(catalog[33], 0x00);
    let boot_lba = le_u32(&catalog[40..44]);
    let payload = &sector(&image, boot_lba)[..iso::PLACEHOLDER_BOOT_PAYLOAD.len()];
    assert_eq!(payload, iso::PLACEHOLDER_BOOT_PAYLOAD);
}

#[test]
fn joliet_tree_contains_exactly_the_manifest_plus_boot_entry() {
    let tmp = fixture_tree();
    let out = tmp.path().join("out.iso");
    build_image(tmp.path(), &out);
    let image = fs::read(&out).unwrap();

    let (root_extent, root_size) = joliet_root(&image);
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    collect_files(&image, root_extent, root_size, "", &mut files, &mut dirs);

    let mut file_paths: Vec<&str> = files.iter().map(|(p, _, _)| p.as_str()).collect();
    file_paths.sort();
    assert_eq!(
        file_paths,
        vec!["BOOT/BOOTx64.efi", "a/x.txt", "a/y.txt", "b/z.txt"]
    );

    dirs.sort();
    assert_eq!(dirs, vec!["BOOT", "a", "b"]);

    // File contents are carried verbatim.
    let (_, extent, size) = files
        .iter()
        .find(|(p, _, _)| p == "a/x.txt")
        .cloned()
        .unwrap();
    assert_eq!(size, 1);
    assert_eq!(&sector(&image, extent)[..1], b"x");
}

/// Raw identifiers of one primary directory extent, "." and ".." skipped.
fn primary_identifiers(image: &[u8], extent: u32, size: u32) -> Vec<String> {
    let start = extent as usize * SECTOR_SIZE;
    let data = &image[start..start + size as usize];
    let mut ids = Vec::new();
    let mut pos = 0;
    let mut seen = 0;
    while pos < data.len() {
        let len = data[pos] as usize;
        if len == 0 {
            pos = (pos / SECTOR_SIZE + 1) * SECTOR_SIZE;
            continue;
        }
        let rec = &data[pos..pos + len];
        let id_len = rec[32] as usize;
        if seen >= 2 {
            ids.push(String::from_utf8(rec[33..33 + id_len].to_vec()).unwrap());
        }
        seen += 1;
        pos += len;
    }
    ids
}

#[test]
fn primary_tree_is_ordered_by_mangled_identifier() {
    // "B" sorts before "a" as source names; their 8.3 forms ("B", "A")
    // sort the other way around.
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir(tmp.path().join("B")).unwrap();
    fs::create_dir(tmp.path().join("a")).unwrap();
    fs::write(tmp.path().join("B.txt"), b"1").unwrap();
    fs::write(tmp.path().join("a.txt"), b"2").unwrap();
    let out = tmp.path().join("out.iso");
    build_image(tmp.path(), &out);
    let image = fs::read(&out).unwrap();

    let pvd = sector(&image, 16);
    let root_extent = le_u32(&pvd[158..162]);
    let root_size = le_u32(&pvd[166..170]);
    assert_eq!(
        primary_identifiers(&image, root_extent, root_size),
        vec!["A", "A.TXT;1", "B", "B.TXT;1", "BOOT"]
    );

    // The L path table lists the same directories in identifier order,
    // all pointing at the root (directory number 1).
    let table_lba = le_u32(&pvd[140..144]);
    let table_size = le_u32(&pvd[132..136]);
    let table = &image[table_lba as usize * SECTOR_SIZE..][..table_size as usize];
    let mut entries = Vec::new();
    let mut pos = 0;
    while pos < table.len() {
        let id_len = table[pos] as usize;
        let parent = u16::from_le_bytes(table[pos + 6..pos + 8].try_into().unwrap());
        entries.push((table[pos + 8..pos + 8 + id_len].to_vec(), parent));
        pos += 8 + id_len + id_len % 2;
    }
    assert_eq!(entries[0], (vec![0u8], 1));
    let names: Vec<&[u8]> = entries[1..].iter().map(|(id, _)| id.as_slice()).collect();
    assert_eq!(names, vec![b"A".as_slice(), b"B", b"BOOT"]);
    assert!(entries[1..].iter().all(|(_, parent)| *parent == 1));
}

#[test]
fn rebuilding_an_unmodified_tree_is_byte_identical() {
    let tmp = fixture_tree();
    let outdir = tempfile::tempdir().unwrap();
    let first = outdir.path().join("first.iso");
    let second = outdir.path().join("second.iso");
    build_image(tmp.path(), &first);
    build_image(tmp.path(), &second);

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn build_bootable_image_injects_placeholder_and_renames_atomically() {
    let tmp = fixture_tree();
    let workdir = tempfile::tempdir().unwrap();

    let image_path =
        iso::build_bootable_image(tmp.path(), "/BOOT/BOOTx64.efi", "TESTVOL", workdir.path())
            .unwrap();

    assert_eq!(image_path, workdir.path().join("TESTVOL.iso"));
    assert!(workdir.path().join("TESTVOL.iso").exists());
    assert!(!workdir.path().join("TESTVOL.iso.part").exists());

    let image = fs::read(workdir.path().join("TESTVOL.iso")).unwrap();
    let catalog_lba = le_u32(&sector(&image, 17)[71..75]);
    let catalog = sector(&image, catalog_lba);
    let boot_lba = le_u32(&catalog[40..44]);
    assert_eq!(
        &sector(&image, boot_lba)[..iso::PLACEHOLDER_BOOT_PAYLOAD.len()],
        iso::PLACEHOLDER_BOOT_PAYLOAD
    );
}
