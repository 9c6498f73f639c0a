#![allow(dead_code)]

use std::sync::Once;

use pepatch::{checksum, constants::*, Blob};

static INIT_LOGGER: Once = Once::new();
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::builder()
            .is_test(false)
            .filter_level(log::LevelFilter::Info)
            .format_timestamp(None)
            .format_module_path(false)
            .format_level(true)
            .format_target(false)
            .write_style(env_logger::WriteStyle::Auto)
            .init();
    });
}

pub const PE_OFFSET: usize = 0x80;
pub const FILE_ALIGNMENT: u32 = 0x200;
pub const SECTION_ALIGNMENT: u32 = 0x1000;

pub struct TestSection {
    pub name:            &'static str,
    pub virtual_size:    u32,
    pub raw:             Vec<u8>,
    pub characteristics: u32,
}

/// Synthetic image description used to produce well-formed test binaries.
pub struct TestImage {
    pub pe64:        bool,
    pub sections:    Vec<TestSection>,
    pub directories: Vec<(u32, u32)>,
    pub trailer:     Vec<u8>,
    pub checksum:    bool,
}

pub struct Layout {
    pub data:             Vec<u8>,
    pub section_table:    usize,
    pub data_directories: usize,
    pub virtual_addresses: Vec<u32>,
    pub raw_offsets:      Vec<u32>,
    pub trailer_offset:   usize,
}

fn align(value: usize, alignment: usize) -> usize { value.div_ceil(alignment) * alignment }

pub fn pattern(size: usize, seed: u8) -> Vec<u8> {
    (0..size).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn put_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}
pub fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
pub fn get_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

impl TestImage {
    /// `.text` (code, raw data shorter than its virtual size), `.rsrc` (dedicated to the resource
    /// directory), `.reloc` (dedicated to the base relocations) and `.udata` (no raw data).
    pub fn sample() -> Self {
        let mut directories = vec![(0, 0); 16];
        directories[IMAGE_DIRECTORY_ENTRY_RESOURCE] = (0x3000, 0x900);
        directories[IMAGE_DIRECTORY_ENTRY_BASERELOC] = (0x4000, 0x80);
        directories[IMAGE_DIRECTORY_ENTRY_DEBUG] = (0x1100, 0x1c);
        Self {
            pe64: false,
            sections: vec![
                TestSection {
                    name:            ".text",
                    virtual_size:    0x1800,
                    raw:             pattern(0x1600, 1),
                    characteristics: IMAGE_SCN_CNT_CODE | IMAGE_SCN_MEM_EXECUTE | IMAGE_SCN_MEM_READ,
                },
                TestSection {
                    name:            ".rsrc",
                    virtual_size:    0x900,
                    raw:             pattern(0x900, 2),
                    characteristics: IMAGE_SCN_CNT_INITIALIZED_DATA | IMAGE_SCN_MEM_READ,
                },
                TestSection {
                    name:            ".reloc",
                    virtual_size:    0x80,
                    raw:             pattern(0x80, 3),
                    characteristics: IMAGE_SCN_CNT_INITIALIZED_DATA
                        | IMAGE_SCN_MEM_READ
                        | IMAGE_SCN_MEM_DISCARDABLE,
                },
                TestSection {
                    name:            ".udata",
                    virtual_size:    0x300,
                    raw:             Vec::new(),
                    characteristics: IMAGE_SCN_CNT_UNINITIALIZED_DATA
                        | IMAGE_SCN_MEM_READ
                        | IMAGE_SCN_MEM_DISCARDABLE,
                },
            ],
            directories,
            trailer: Vec::new(),
            checksum: true,
        }
    }

    pub fn optional_header_size(&self) -> usize { if self.pe64 { 112 } else { 96 } }

    pub fn build(&self) -> Layout {
        let optional_header_size = self.optional_header_size();
        let data_directories = PE_OFFSET + 4 + 20 + optional_header_size;
        let section_table = data_directories + self.directories.len() * 8;
        let headers_end = section_table + self.sections.len() * 40;
        let size_of_headers = align(headers_end, FILE_ALIGNMENT as usize);

        let mut virtual_addresses = Vec::new();
        let mut raw_offsets = Vec::new();
        let mut virtual_address = SECTION_ALIGNMENT as usize;
        let mut raw_offset = size_of_headers;
        for section in self.sections.iter() {
            virtual_addresses.push(virtual_address as u32);
            virtual_address =
                align(virtual_address + section.virtual_size as usize, SECTION_ALIGNMENT as usize);
            if section.raw.is_empty() {
                raw_offsets.push(0);
            } else {
                raw_offsets.push(raw_offset as u32);
                raw_offset += align(section.raw.len(), FILE_ALIGNMENT as usize);
            }
        }
        let size_of_image = virtual_address as u32;
        let trailer_offset = raw_offset;

        let mut data = vec![0; raw_offset];
        data[0..2].copy_from_slice(b"MZ");
        put_u32(&mut data, 0x3c, PE_OFFSET as u32);
        data[0x40..0x4e].copy_from_slice(b"This is a stub");
        data[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_OFFSET + 4;
        put_u16(&mut data, coff, if self.pe64 { 0x8664 } else { 0x14c });
        put_u16(&mut data, coff + 2, self.sections.len() as u16);
        put_u32(&mut data, coff + 4, 0x5f3759df);
        put_u16(&mut data, coff + 16, (optional_header_size + self.directories.len() * 8) as u16);
        put_u16(&mut data, coff + 18, 0x0102);

        let optional = coff + 20;
        put_u16(&mut data, optional, if self.pe64 { PE_64_MAGIC } else { PE_32_MAGIC });
        data[optional + 2] = 14;
        data[optional + 3] = 29;
        put_u32(&mut data, optional + 4, 0x1600);
        put_u32(&mut data, optional + 16, 0x1010);
        put_u32(&mut data, optional + 20, 0x1000);
        if self.pe64 {
            put_u64(&mut data, optional + 24, 0x1_4000_0000);
        } else {
            put_u32(&mut data, optional + 24, 0x3000);
            put_u32(&mut data, optional + 28, 0x40_0000);
        }
        put_u32(&mut data, optional + 32, SECTION_ALIGNMENT);
        put_u32(&mut data, optional + 36, FILE_ALIGNMENT);
        put_u16(&mut data, optional + 40, 6);
        put_u16(&mut data, optional + 48, 6);
        put_u32(&mut data, optional + 56, size_of_image);
        put_u32(&mut data, optional + 60, size_of_headers as u32);
        put_u16(&mut data, optional + 68, 2);
        put_u16(&mut data, optional + 70, 0x8160);
        if self.pe64 {
            put_u64(&mut data, optional + 72, 0x10_0000);
            put_u64(&mut data, optional + 80, 0x1000);
            put_u64(&mut data, optional + 88, 0x10_0000);
            put_u64(&mut data, optional + 96, 0x1000);
            put_u32(&mut data, optional + 108, self.directories.len() as u32);
        } else {
            put_u32(&mut data, optional + 72, 0x10_0000);
            put_u32(&mut data, optional + 76, 0x1000);
            put_u32(&mut data, optional + 80, 0x10_0000);
            put_u32(&mut data, optional + 84, 0x1000);
            put_u32(&mut data, optional + 92, self.directories.len() as u32);
        }

        for (index, &(virtual_address, size)) in self.directories.iter().enumerate() {
            put_u32(&mut data, data_directories + index * 8, virtual_address);
            put_u32(&mut data, data_directories + index * 8 + 4, size);
        }

        for (index, section) in self.sections.iter().enumerate() {
            let header = section_table + index * 40;
            let name = section.name.as_bytes();
            data[header..header + name.len()].copy_from_slice(name);
            put_u32(&mut data, header + 8, section.virtual_size);
            put_u32(&mut data, header + 12, virtual_addresses[index]);
            put_u32(
                &mut data,
                header + 16,
                align(section.raw.len(), FILE_ALIGNMENT as usize) as u32,
            );
            put_u32(&mut data, header + 20, raw_offsets[index]);
            put_u32(&mut data, header + 36, section.characteristics);
            if !section.raw.is_empty() {
                let start = raw_offsets[index] as usize;
                data[start..start + section.raw.len()].copy_from_slice(&section.raw);
            }
        }

        data.extend_from_slice(&self.trailer);

        if self.checksum {
            let value = checksum(&Blob::from(&data)).unwrap();
            put_u32(&mut data, checksum_offset(), value);
        }

        Layout {
            data,
            section_table,
            data_directories,
            virtual_addresses,
            raw_offsets,
            trailer_offset,
        }
    }
}

pub fn checksum_offset() -> usize { PE_OFFSET + 4 + 20 + 64 }

/// Recompute the checksum of a modified test binary.
pub fn fix_checksum(data: &mut [u8]) {
    put_u32(data, checksum_offset(), 0);
    let value = checksum(&Blob::from(&*data)).unwrap();
    put_u32(data, checksum_offset(), value);
}
