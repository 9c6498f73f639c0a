//! Portable executable data types.
//!
//! These types are a one-to-one mapping of the data described in <https://docs.microsoft.com/en-us/windows/win32/debug/pe-format>

use core::{mem, slice};

use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::constants::*;

#[repr(C, packed(1))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct VersionU8 {
    pub major: u8,
    pub minor: u8,
}
#[repr(C, packed(2))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct VersionU16 {
    pub major: u16,
    pub minor: u16,
}
#[repr(C, packed(2))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct CoffHeader {
    pub machine:                 u16,
    pub number_of_sections:      u16,
    pub time_date_stamp:         u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols:       u32,
    pub size_of_optional_header: u16,
    pub characteristics:         u16,
}
#[repr(C, packed(2))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct StandardHeader {
    pub magic:                      u16,
    pub linker_version:             VersionU8,
    pub size_of_code:               u32,
    pub size_of_initialized_data:   u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point:     u32,
    pub base_of_code:               u32,
}
#[repr(C)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, Default)]
pub struct WindowsHeader<UXX> {
    pub image_base:               UXX,
    pub section_alignment:        u32,
    pub file_alignment:           u32,
    pub operating_system_version: VersionU16,
    pub image_version:            VersionU16,
    pub subsystem_version:        VersionU16,
    pub win32_version_value:      u32,
    pub size_of_image:            u32,
    pub size_of_headers:          u32,
    pub check_sum:                u32,
    pub subsystem:                u16,
    pub dll_characteristics:      u16,
    pub size_of_stack_reserve:    UXX,
    pub size_of_stack_commit:     UXX,
    pub size_of_heap_reserve:     UXX,
    pub size_of_heap_commit:      UXX,
    pub loader_flags:             u32,
    pub number_of_rva_and_sizes:  u32,
}
impl<UXX> WindowsHeader<UXX>
where
    UXX: IntoBytes,
{
    pub fn as_bytes(&self) -> &[u8] {
        // manually implement this here because zerocopy doesn't support derive for generic types
        unsafe {
            let len = mem::size_of_val(self);
            slice::from_raw_parts(self as *const Self as *const u8, len)
        }
    }
}

/// The windows-specific part of the optional header.
///
/// The 32-bit variant additionally carries `BaseOfData`, which sits between the standard
/// fields and the windows-specific fields in the PE32 layout.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub enum GenericWindowsHeader {
    WindowsHeader32 {
        base_of_data: u32,
        header:       WindowsHeader<u32>,
    },
    WindowsHeader64 {
        header: WindowsHeader<u64>,
    },
}
impl GenericWindowsHeader {
    /// Serialize the header in its on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            GenericWindowsHeader::WindowsHeader32 {
                base_of_data,
                header,
            } => {
                let mut bytes = Vec::with_capacity(4 + mem::size_of::<WindowsHeader<u32>>());
                bytes.extend_from_slice(&base_of_data.to_le_bytes());
                bytes.extend_from_slice(header.as_bytes());
                bytes
            }
            GenericWindowsHeader::WindowsHeader64 { header } => header.as_bytes().to_vec(),
        }
    }

    /// Returns the size of the complete optional header without data directories, including the standard fields.
    pub const fn optional_header_size(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { .. } => OPTIONAL_HEADER_32_SIZE,
            GenericWindowsHeader::WindowsHeader64 { .. } => OPTIONAL_HEADER_64_SIZE,
        }
    }

    pub const fn base_of_data(&self) -> Option<u32> {
        match self {
            GenericWindowsHeader::WindowsHeader32 { base_of_data, .. } => Some(*base_of_data),
            GenericWindowsHeader::WindowsHeader64 { .. } => None,
        }
    }

    pub const fn image_base(&self) -> u64 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.image_base as u64,
            GenericWindowsHeader::WindowsHeader64 { header } => header.image_base,
        }
    }

    pub const fn section_alignment(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.section_alignment,
            GenericWindowsHeader::WindowsHeader64 { header } => header.section_alignment,
        }
    }

    pub const fn file_alignment(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.file_alignment,
            GenericWindowsHeader::WindowsHeader64 { header } => header.file_alignment,
        }
    }

    pub const fn size_of_image(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.size_of_image,
            GenericWindowsHeader::WindowsHeader64 { header } => header.size_of_image,
        }
    }

    pub fn set_size_of_image(&mut self, size_of_image: u32) {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => {
                header.size_of_image = size_of_image
            }
            GenericWindowsHeader::WindowsHeader64 { header } => header.size_of_image = size_of_image,
        }
    }

    pub const fn size_of_headers(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.size_of_headers,
            GenericWindowsHeader::WindowsHeader64 { header } => header.size_of_headers,
        }
    }

    pub const fn check_sum(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.check_sum,
            GenericWindowsHeader::WindowsHeader64 { header } => header.check_sum,
        }
    }

    pub fn set_check_sum(&mut self, check_sum: u32) {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.check_sum = check_sum,
            GenericWindowsHeader::WindowsHeader64 { header } => header.check_sum = check_sum,
        }
    }

    pub const fn subsystem(&self) -> u16 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.subsystem,
            GenericWindowsHeader::WindowsHeader64 { header } => header.subsystem,
        }
    }

    pub const fn number_of_rva_and_sizes(&self) -> u32 {
        match self {
            GenericWindowsHeader::WindowsHeader32 { header, .. } => header.number_of_rva_and_sizes,
            GenericWindowsHeader::WindowsHeader64 { header } => header.number_of_rva_and_sizes,
        }
    }
}

#[repr(C, packed(4))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct ImageDataDirectory {
    pub virtual_address: u32,
    pub size:            u32,
}
impl ImageDataDirectory {
    /// Returns `true` if the directory points somewhere.
    pub const fn is_present(&self) -> bool { self.virtual_address != 0 }

    pub const fn end(&self) -> u64 { self.virtual_address as u64 + self.size as u64 }
}

#[repr(C, packed(4))]
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, FromBytes, IntoBytes, Immutable, Default,
)]
pub struct SectionHeader {
    pub name:                   u64,
    pub virtual_size:           u32,
    pub virtual_address:        u32,
    pub size_of_raw_data:       u32,
    pub pointer_to_raw_data:    u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations:  u16,
    pub number_of_linenumbers:  u16,
    pub characteristics:        u32,
}

impl SectionHeader {
    pub fn name(&self) -> Option<String> {
        let name = self.name.to_le_bytes();
        let name = core::str::from_utf8(
            &name[0..name.iter().position(|&c| c == b'\0').unwrap_or(name.len())],
        )
        .ok();
        name.map(|name| name.to_string())
    }

    /// Returns `true` if the section is marked as not needed after load.
    pub const fn is_discardable(&self) -> bool {
        self.characteristics & IMAGE_SCN_MEM_DISCARDABLE != 0
    }
}
