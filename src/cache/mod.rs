//! Incremental generation cache
//!
//! Tracks, per source directory, a content digest of its proto files and
//! the files generated from them. A package is regenerated when:
//!
//! | Signal | Effect |
//! |--------|--------|
//! | `--force` | every package |
//! | protoc flag digest changed | every package |
//! | no entry for the package key | that package |
//! | proto file list changed (value or order) | that package |
//! | content digest changed or unreadable | that package |

pub mod hash;
pub mod manifest;

pub use hash::{hash_proto_files, hash_strings};
pub use manifest::{Cache, PackageInfo, CACHE_VERSION};
