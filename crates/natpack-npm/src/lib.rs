//! natpack-npm - npm package layout helpers.
//!
//! Knows just enough about how npm lays packages out on disk for the native
//! addon plugin to find things:
//!
//! - `package.json` parsing, including the `binary` section used by
//!   pre-built binary locators
//! - walking ancestor directories and `node_modules` folders
//! - locating a library package from a module's point of view
//! - runtime dependency closure of an installed package
//! - discovery of dependencies that ship `.node` binaries

pub mod closure;
pub mod error;
pub mod natives;
pub mod package;
pub mod walk;

pub use closure::{DependencyClosure, InstalledPackage, dependency_closure};
pub use error::{NpmError, Result};
pub use natives::discover_natives;
pub use package::{BinarySection, ManifestCache, PackageJson};
pub use walk::{AncestorWalk, FsWalk, find_library, node_modules_dirs, package_root};
