//! Resolve macOS installer products from Apple's software-update catalogs,
//! download their payloads, and assemble bootable ISO-9660 images.
//!
//! The crate splits into two independent components with no shared state:
//! [`catalog`] answers "which products carry version V and which files make
//! them up", and [`iso`] turns a directory tree into an EFI-bootable image.
//! [`release`] resolves bootloader release tags against a hosting API and
//! feeds the directory tree that [`iso`] consumes.

pub mod catalog;
pub mod channels;
pub mod client;
pub mod downloader;
pub mod iso;
pub mod picker;
pub mod release;
