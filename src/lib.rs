//! **P**ortable **e**xecutable **patch**ing without relinking.
//!
//! Supports:
//! * Parsing and validation of portable executable headers, sections and data directories
//! * Resizing and replacing data directories, relocating the sections that have to move
//! * Removing signatures and trailing data
//! * Serialization with a recomputed checksum
//!
//! Images are represented as trees of [`Blob`] views over the input, so large files are never
//! copied or materialized as a whole. See [`Image`] for the main entry point.
//!
//! # Examples
//!
//! ### Resource directory replacement
//! ```ignore
//! use pepatch::{DataDirectoryType, Image};
//!
//! // parse the executable image, reading the file lazily
//! let mut image = Image::parse_file(BINARY_PATH)?;
//!
//! // read the current resource directory
//! let range = image.find_directory(DataDirectoryType::ResourceTable).unwrap();
//! let resources = image.get_vm(range).unwrap();
//!
//! // decode, modify and re-encode the directory for its base address
//! let address = image.resize_directory(DataDirectoryType::ResourceTable, new_size)?;
//! let resources = encode_resources(decode_resources(&resources)?, address);
//!
//! // install the new directory content
//! image.set_directory(DataDirectoryType::ResourceTable, resources)?;
//!
//! // build an executable image with all changes applied
//! image.write_file(TARGET_PATH)?;
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(doc)))]

pub(crate) mod blob;
pub(crate) mod checksum;
pub(crate) mod errors;
pub(crate) mod image;
pub(crate) mod util;

pub mod constants;
pub mod types;

pub use crate::{blob::*, checksum::*, errors::*, image::*};
