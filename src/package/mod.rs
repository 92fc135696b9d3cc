//! Package identities and the on-disk layout derived from them.

mod id;
mod layout;
mod manifest;

pub use id::PackageId;
pub use layout::InstallLayout;
pub use manifest::{MANIFEST_FILE, Manifest};
