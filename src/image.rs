//! Portable executable image representation.
//!
//! See <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format> for more information.

use core::{mem::size_of, ops::Range};
use std::{fs::File, io::Write, path::Path};

use ahash::RandomState;
use indexmap::IndexMap;
use log::{debug, warn};
use zerocopy::{FromBytes, IntoBytes};

use crate::{blob::*, checksum::checksum, constants::*, errors::*, types::*, util::*};

/// Image data directory type enumeration.
///
/// The discriminant of each variant is the index of the directory in the data directory table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum DataDirectoryType {
    ExportTable,
    ImportTable,
    ResourceTable,
    ExceptionTable,
    CertificateTable,
    BaseRelocationTable,
    Debug,
    Architecture,
    GlobalPtr,
    TLSTable,
    LoadConfigTable,
    BoundImport,
    IAT,
    DelayImportDescriptor,
    CLRRuntimeHeader,
    Reserved,
}
impl From<DataDirectoryType> for usize {
    fn from(directory: DataDirectoryType) -> Self { directory as usize }
}

/// Options controlling how an image is parsed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct ParseOptions {
    /// Skip verification of a nonzero checksum in the optional header.
    pub ignore_checksum: bool,
}

/// A section of an image: its header and, if present on disk, its raw content.
#[derive(Debug, Clone)]
pub struct Section {
    pub(crate) header: SectionHeader,
    pub(crate) data:   Option<Blob>,
}
impl Section {
    pub fn header(&self) -> &SectionHeader { &self.header }

    /// Returns the raw content of the section, or `None` if the section has no data on disk.
    pub fn data(&self) -> Option<&Blob> { self.data.as_ref() }

    pub fn name(&self) -> Option<String> { self.header.name() }

    /// Size the section occupies in memory. Empty sections still occupy their address.
    fn virtual_extent(&self) -> u64 {
        match self.header.virtual_size {
            0 => self.header.size_of_raw_data.max(1) as u64,
            virtual_size => virtual_size as u64,
        }
    }

    fn contains(&self, start: u64, end: u64) -> bool {
        let virtual_address = self.header.virtual_address as u64;
        virtual_address <= start && end <= virtual_address + self.header.virtual_size as u64
    }
}

/// Portable executable image representation.
///
/// This struct is the main entry point for parsing, querying and updating a portable executable image.
/// All content is held as [`Blob`] views into the source, so only replaced data directories are held in memory.
#[derive(Debug, Clone)]
pub struct Image {
    pub(crate) dos_stub:         Blob,
    pub(crate) coff_header:      CoffHeader,
    pub(crate) standard_header:  StandardHeader,
    pub(crate) windows_header:   GenericWindowsHeader,
    pub(crate) data_directories: Vec<ImageDataDirectory>,
    pub(crate) sections:         Vec<Section>,
    pub(crate) header_slack:     Blob,
    pub(crate) trailer:          Blob,

    trailer_offset: u64,
}

fn load<T: FromBytes + Copy>(image: &Blob, offset: u64) -> Result<T, ImageReadError> {
    let data = image.read(offset, size_of::<T>())?;
    Ok(read::<T>(&data)?)
}

/// Returns the image with the four bytes at `offset` replaced by `value`.
fn splice_u32(image: &Blob, offset: u64, value: u32) -> Result<Blob, BlobError> {
    Ok(join([
        image.slice(..offset)?,
        Blob::from(&value.to_le_bytes()),
        image.slice(offset + 4..)?,
    ]))
}

impl Image {
    /// Parse a portable executable image from a blob or a byte slice.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the data is not a valid portable executable image,
    /// its checksum is incorrect, or its sections are not laid out contiguously.
    pub fn parse<B: Into<Blob>>(image: B) -> Result<Self, ImageReadError> {
        Self::parse_with(image, ParseOptions::default())
    }

    /// Parse a portable executable image with the given options.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the data is not a valid portable executable image.
    pub fn parse_with<B: Into<Blob>>(
        image: B, options: ParseOptions,
    ) -> Result<Self, ImageReadError> {
        let image = image.into();

        let pe_dos_magic = load::<u16>(&image, 0)?;
        debug!("pe_dos_magic: {:#x?}", pe_dos_magic);
        if pe_dos_magic != PE_DOS_MAGIC {
            return Err(ImageReadError::InvalidHeader("no dos magic".into()));
        }

        let pe_signature_offset = load::<u16>(&image, PE_PTR_OFFSET as u64)? as u64;
        debug!("pe_signature_offset: {:#x?}", pe_signature_offset);

        let pe_signature = load::<u32>(&image, pe_signature_offset)?;
        debug!("pe_signature: {:#x?}", pe_signature);
        if pe_signature != PE_NT_SIGNATURE {
            return Err(ImageReadError::InvalidHeader("no pe signature".into()));
        }

        let coff_header_offset = pe_signature_offset + 4;
        let coff_header = load::<CoffHeader>(&image, coff_header_offset)?;
        debug!("{:#x?}: {:#x?}", coff_header_offset, coff_header);

        let standard_header_offset = coff_header_offset + COFF_HEADER_SIZE as u64;
        let standard_header = load::<StandardHeader>(&image, standard_header_offset)?;
        debug!("{:#x?}: {:#x?}", standard_header_offset, standard_header);

        let windows_header = match { standard_header.magic } {
            PE_32_MAGIC => GenericWindowsHeader::WindowsHeader32 {
                base_of_data: load::<u32>(&image, standard_header_offset + 24)?,
                header:       load::<WindowsHeader<u32>>(&image, standard_header_offset + 28)?,
            },
            PE_64_MAGIC => GenericWindowsHeader::WindowsHeader64 {
                header: load::<WindowsHeader<u64>>(&image, standard_header_offset + 24)?,
            },
            magic => {
                return Err(ImageReadError::InvalidHeader(format!(
                    "unknown optional header magic {:#x}",
                    magic
                )));
            }
        };
        debug!("{:#x?}", windows_header);

        if windows_header.file_alignment() == 0 {
            return Err(ImageReadError::InvalidHeader("file alignment must be nonzero".into()));
        }
        if windows_header.section_alignment() == 0 {
            return Err(ImageReadError::InvalidHeader(
                "section alignment must be nonzero".into(),
            ));
        }

        let checksum_offset = standard_header_offset + CHECKSUM_OFFSET_IN_OPTIONAL_HEADER as u64;
        let stored_checksum = windows_header.check_sum();
        if !options.ignore_checksum && stored_checksum != 0 {
            let computed_checksum = checksum(&splice_u32(&image, checksum_offset, 0)?)?;
            debug!(
                "checksum: stored {:#x?}, computed {:#x?}",
                stored_checksum, computed_checksum
            );
            if stored_checksum != computed_checksum {
                return Err(ImageReadError::ChecksumMismatch {
                    stored:   stored_checksum,
                    computed: computed_checksum,
                });
            }
        }

        let number_of_rva_and_sizes = windows_header.number_of_rva_and_sizes();
        let expected_optional_header_size = windows_header.optional_header_size() as u64
            + number_of_rva_and_sizes as u64 * DATA_DIRECTORY_SIZE as u64;
        if coff_header.size_of_optional_header as u64 != expected_optional_header_size {
            return Err(ImageReadError::InvalidHeader(format!(
                "optional header size {:#x} does not match {} data directories ({:#x})",
                coff_header.size_of_optional_header,
                number_of_rva_and_sizes,
                expected_optional_header_size
            )));
        }

        let data_directories_offset =
            standard_header_offset + windows_header.optional_header_size() as u64;
        let mut data_directories = Vec::with_capacity(number_of_rva_and_sizes as usize);
        for index in 0..number_of_rva_and_sizes as u64 {
            let offset = data_directories_offset + index * DATA_DIRECTORY_SIZE as u64;
            let data_directory = load::<ImageDataDirectory>(&image, offset)?;
            debug!("{:#x?}: {}: {:#x?}", offset, index, data_directory);
            data_directories.push(data_directory);
        }

        let file_alignment = windows_header.file_alignment();
        let section_table_offset =
            standard_header_offset + coff_header.size_of_optional_header as u64;
        let mut sections = Vec::with_capacity(coff_header.number_of_sections as usize);
        for index in 0..coff_header.number_of_sections as u64 {
            let offset = section_table_offset + index * SECTION_HEADER_SIZE as u64;
            let header = load::<SectionHeader>(&image, offset)?;
            let name = header.name().unwrap_or("?".to_string());
            debug!("{:#x?}: {}: {:#x?}", offset, name, header);

            if !is_aligned(header.pointer_to_raw_data, file_alignment) {
                return Err(ImageReadError::InvalidSection(format!(
                    "section {}@{} is misaligned ({:#x})",
                    name, index, header.pointer_to_raw_data
                )));
            }
            if !is_aligned(header.size_of_raw_data, file_alignment) {
                return Err(ImageReadError::InvalidSection(format!(
                    "size of section {}@{} is misaligned ({:#x})",
                    name, index, header.size_of_raw_data
                )));
            }

            let data = if header.pointer_to_raw_data == 0 || header.size_of_raw_data == 0 {
                None
            } else {
                let start = header.pointer_to_raw_data as u64;
                let end = start + header.size_of_raw_data as u64;
                Some(image.slice(start..end).map_err(|_| {
                    ImageReadError::InvalidSection(format!(
                        "section {}@{} points outside the image ({:#x} > {:#x})",
                        name,
                        index,
                        end,
                        image.len()
                    ))
                })?)
            };
            sections.push(Section { header, data });
        }
        let directories_end =
            section_table_offset + coff_header.number_of_sections as u64 * SECTION_HEADER_SIZE as u64;

        let mut present_sections = sections
            .iter()
            .filter(|section| section.data.is_some())
            .map(|section| section.header)
            .collect::<Vec<_>>();
        present_sections.sort_by_key(|header| header.pointer_to_raw_data);
        let (first_section, last_section) = match (present_sections.first(), present_sections.last())
        {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(ImageReadError::InvalidLayout("no present sections".into())),
        };
        for pair in present_sections.windows(2) {
            if pair[0].pointer_to_raw_data as u64 + pair[0].size_of_raw_data as u64
                != pair[1].pointer_to_raw_data as u64
            {
                return Err(ImageReadError::InvalidLayout(
                    "there are holes between sections".into(),
                ));
            }
        }
        let first_section_start = first_section.pointer_to_raw_data as u64;
        if first_section_start < directories_end {
            return Err(ImageReadError::InvalidLayout(format!(
                "first section at {:#x} overlaps the section table ending at {:#x}",
                first_section_start, directories_end
            )));
        }
        let end_of_image = last_section.pointer_to_raw_data as u64 + last_section.size_of_raw_data as u64;
        debug!(
            "sections span {:#x?}..{:#x?}, trailer: {:#x?}",
            first_section_start,
            end_of_image,
            image.len() - end_of_image
        );

        let image = Self {
            dos_stub: image.slice(..pe_signature_offset)?,
            coff_header,
            standard_header,
            windows_header,
            data_directories,
            sections,
            header_slack: image.slice(directories_end..first_section_start)?,
            trailer: image.slice(end_of_image..)?,
            trailer_offset: end_of_image,
        };

        image.check_vm_layout().map_err(ImageReadError::InvalidLayout)?;
        image.check_data_directories().map_err(ImageReadError::InvalidDirectory)?;

        if let Some(signature) = image.data_directories.get(IMAGE_DIRECTORY_ENTRY_SECURITY) {
            if signature.size != 0 && signature.end() != image.file_end() {
                warn!(
                    "signature at {:#x}+{:#x} does not end at the end of the file ({:#x})",
                    { signature.virtual_address },
                    { signature.size },
                    image.file_end()
                );
            }
        }

        Ok(image)
    }

    /// Parse a portable executable image from a file.
    ///
    /// The file is kept open and read lazily while the image is in use.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the file could not be read, is not a valid portable executable image or is missing required headers.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ImageReadError> {
        Self::parse(Blob::open(path)?)
    }

    /// Parse a portable executable image from a reader.
    ///
    /// # Returns
    /// Returns the `Image`, or an error if the reader could not be read, is not a valid portable executable image or is missing required headers.
    pub fn parse_reader<R: std::io::Read>(reader: &mut R) -> Result<Self, ImageReadError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::parse(data)
    }

    fn section_alignment(&self) -> u64 { self.windows_header.section_alignment() as u64 }

    fn file_alignment(&self) -> u64 { self.windows_header.file_alignment() as u64 }

    fn file_end(&self) -> u64 { self.trailer_offset + self.trailer.len() }

    fn headers_end(&self) -> u64 {
        self.dos_stub.len()
            + 4
            + COFF_HEADER_SIZE as u64
            + self.windows_header.optional_header_size() as u64
            + self.data_directories.len() as u64 * DATA_DIRECTORY_SIZE as u64
            + self.sections.len() as u64 * SECTION_HEADER_SIZE as u64
    }

    /// Sections must be aligned in memory and follow each other without holes or overlaps.
    fn check_vm_layout(&self) -> Result<(), String> {
        let section_alignment = self.section_alignment();
        let mut next_free_address = None;
        for section in self.sections.iter() {
            let virtual_address = section.header.virtual_address as u64;
            if !is_aligned(virtual_address, section_alignment) {
                return Err(format!(
                    "section {} is misaligned in memory ({:#x})",
                    section.name().unwrap_or("?".to_string()),
                    virtual_address
                ));
            }
            if let Some(next_free_address) = next_free_address {
                if virtual_address != next_free_address {
                    return Err(format!(
                        "there are holes in the section map: section {} at {:#x}, expected {:#x}",
                        section.name().unwrap_or("?".to_string()),
                        virtual_address,
                        next_free_address
                    ));
                }
            }
            next_free_address = Some(aligned_to(
                virtual_address + section.virtual_extent(),
                section_alignment,
            ));
        }
        Ok(())
    }

    /// Directories have to resolve to the headers or to a section.
    /// The security directory holds a file offset instead of an address and is exempt.
    fn check_data_directories(&self) -> Result<(), String> {
        let size_of_headers = self.windows_header.size_of_headers() as u64;
        for (index, directory) in self.data_directories.iter().enumerate() {
            if index == IMAGE_DIRECTORY_ENTRY_SECURITY || !directory.is_present() {
                continue;
            }
            let start = directory.virtual_address as u64;
            let end = directory.end();
            if end <= size_of_headers {
                continue;
            }
            let backed = self.sections.iter().any(|section| {
                let virtual_address = section.header.virtual_address as u64;
                let extent =
                    section.header.virtual_size.max(section.header.size_of_raw_data) as u64;
                virtual_address <= start && end <= virtual_address + extent
            });
            if !backed {
                return Err(format!(
                    "data directory {} at {:#x}+{:#x} is not backed by a section",
                    index,
                    start,
                    end - start
                ));
            }
        }
        Ok(())
    }

    /// Returns the bytes preceding the PE signature.
    pub fn dos_stub(&self) -> &Blob { &self.dos_stub }

    /// Returns the parsed coff header.
    pub fn coff_header(&self) -> &CoffHeader { &self.coff_header }

    /// Returns the parsed standard header.
    pub fn standard_header(&self) -> &StandardHeader { &self.standard_header }

    /// Returns the parsed windows header.
    pub fn windows_header(&self) -> &GenericWindowsHeader { &self.windows_header }

    /// Returns the data directory at the index, or `None` if the directory table is shorter.
    pub fn data_directory<D: Into<usize>>(&self, directory: D) -> Option<&ImageDataDirectory> {
        self.data_directories.get(directory.into())
    }

    /// Returns all entries of the data directory table.
    pub fn data_directories(&self) -> &[ImageDataDirectory] { &self.data_directories }

    /// Returns all sections in section table order.
    pub fn sections(&self) -> &[Section] { &self.sections }

    /// Returns the section at the index.
    pub fn section<Index: Into<usize>>(&self, index: Index) -> Option<&Section> {
        self.sections.get(index.into())
    }

    /// Returns the section whose virtual extent contains the address.
    pub fn section_for_address(&self, virtual_address: u32) -> Option<&Section> {
        let address = virtual_address as u64;
        self.sections.iter().find(|section| {
            let start = section.header.virtual_address as u64;
            start <= address && address < start + section.header.virtual_size as u64
        })
    }

    /// Returns the section containing the data directory.
    pub fn section_for_data_directory<D: Into<usize>>(&self, directory: D) -> Option<&Section> {
        self.find_directory(directory)
            .and_then(|range| self.section_for_address(range.start))
    }

    /// Returns the bytes following the last section on disk.
    pub fn trailer(&self) -> &Blob { &self.trailer }

    pub fn has_trailer(&self) -> bool { !self.trailer.is_empty() }

    /// Returns the file offset of the checksum field.
    pub fn checksum_offset(&self) -> u64 {
        self.dos_stub.len() + 4 + COFF_HEADER_SIZE as u64 + CHECKSUM_OFFSET_IN_OPTIONAL_HEADER as u64
    }

    /// Returns `true` if the image carries a signature in its security directory.
    pub fn has_signature(&self) -> bool {
        self.data_directories
            .get(IMAGE_DIRECTORY_ENTRY_SECURITY)
            .is_some_and(|directory| directory.is_present() && directory.size != 0)
    }

    /// Remove the signature from the trailer and clear the security directory.
    ///
    /// # Returns
    /// Returns an error if the signature does not end at the end of the file or does not lie entirely in the trailer.
    pub fn remove_signature(&mut self) -> Result<(), ImageEditError> {
        let Some(signature) = self.data_directories.get(IMAGE_DIRECTORY_ENTRY_SECURITY).copied()
        else {
            return Ok(());
        };
        if signature.size == 0 {
            return Ok(());
        }
        if signature.end() != self.file_end() {
            return Err(ImageEditError::SignatureNotAtEnd);
        }
        if (signature.virtual_address as u64) < self.trailer_offset {
            return Err(ImageEditError::SignatureOutsideTrailer);
        }
        debug!(
            "removing signature at {:#x?}+{:#x?}",
            { signature.virtual_address },
            { signature.size }
        );
        self.trailer = self
            .trailer
            .slice(..self.trailer.len() - signature.size as u64)
            .map_err(|_| ImageEditError::SignatureOutsideTrailer)?;
        self.data_directories[IMAGE_DIRECTORY_ENTRY_SECURITY] = ImageDataDirectory::default();
        Ok(())
    }

    /// Remove the signature and all other bytes following the last section.
    ///
    /// # Returns
    /// Returns an error if the signature could not be removed.
    pub fn remove_trailer(&mut self) -> Result<(), ImageEditError> {
        self.remove_signature()?;
        self.trailer = Blob::empty();
        Ok(())
    }

    /// Returns `true` if the data directory exists and points somewhere.
    pub fn has_directory<D: Into<usize>>(&self, directory: D) -> bool {
        self.find_directory(directory).is_some()
    }

    /// Returns the virtual address range of the data directory, or `None` if it does not exist.
    pub fn find_directory<D: Into<usize>>(&self, directory: D) -> Option<Range<u32>> {
        let directory = self.data_directories.get(directory.into())?;
        if !directory.is_present() {
            return None;
        }
        Some(directory.virtual_address..directory.virtual_address.saturating_add(directory.size))
    }

    /// Returns the content of a virtual address range as it is mapped at load time.
    ///
    /// The range has to lie within a single section. Bytes past the raw data of the section read as zero.
    pub fn get_vm(&self, range: Range<u32>) -> Option<Blob> {
        let (start, end) = (range.start as u64, range.end as u64);
        if start > end {
            return None;
        }
        let section = self.sections.iter().find(|section| section.contains(start, end))?;

        let offset = start - section.header.virtual_address as u64;
        let size = end - start;
        let raw = section.data.clone().unwrap_or_default();
        let initialized = raw.len().saturating_sub(offset).min(size);
        let initialized = if initialized == 0 {
            Blob::empty()
        } else {
            raw.slice(offset..offset + initialized).ok()?
        };
        let uninitialized = Blob::zeroed(size - initialized.len());
        Some(join([initialized, uninitialized]))
    }

    /// Returns the index of the section dedicated to the data directory.
    ///
    /// A dedicated section starts at the address of the directory and has exactly its size.
    fn directory_section(&self, directory: usize) -> Result<usize, ImageEditError> {
        let data_directory = self
            .data_directories
            .get(directory)
            .filter(|data_directory| data_directory.is_present())
            .ok_or(ImageEditError::MissingSection(directory))?;
        let section = self
            .sections
            .iter()
            .position(|section| {
                section.header.virtual_address == data_directory.virtual_address
                    && section.header.virtual_size == data_directory.size
            })
            .ok_or(ImageEditError::MissingSection(directory))?;
        if let Some((other, _)) =
            self.data_directories.iter().enumerate().find(|&(index, other)| {
                index != directory
                    && index != IMAGE_DIRECTORY_ENTRY_SECURITY
                    && other.virtual_address == data_directory.virtual_address
                    && other.size == data_directory.size
            })
        {
            return Err(ImageEditError::AmbiguousDirectory(directory, other));
        }
        Ok(section)
    }

    /// Returns `true` if the data directory has a dedicated section and all sections following it are discardable.
    ///
    /// Resizing a directory beyond its aligned size moves all following sections in memory.
    pub fn is_dir_safely_resizable<D: Into<usize>>(&self, directory: D) -> bool {
        match self.directory_section(directory.into()) {
            Ok(index) => self.sections[index + 1..]
                .iter()
                .all(|section| section.header.is_discardable()),
            Err(_) => false,
        }
    }

    fn resize(&mut self, directory: usize, size: u32) -> Result<(usize, u32), ImageEditError> {
        let index = self.directory_section(directory)?;
        let section_alignment = self.section_alignment();
        let section = self.sections[index].header;
        let virtual_address = section.virtual_address;

        let old_extent = aligned_to(section.virtual_size as u64, section_alignment);
        if size as u64 <= old_extent {
            debug!(
                "resizing directory {} in place: {:#x?} -> {:#x?} (aligned: {:#x?})",
                directory,
                { section.virtual_size },
                size,
                old_extent
            );
            self.sections[index].header.virtual_size = size;
            self.data_directories[directory].size = size;
            return Ok((index, virtual_address));
        }

        // pack the following sections behind the resized one
        let new_extent = aligned_to(size as u64, section_alignment);
        let mut moves = IndexMap::<usize, u32, _>::with_hasher(RandomState::new());
        let mut address = virtual_address as u64 + new_extent;
        for (other, section) in self.sections.iter().enumerate().skip(index + 1) {
            if !section.header.is_discardable() {
                warn!(
                    "resizing directory {} moves non-discardable section {}",
                    directory,
                    section.name().unwrap_or("?".to_string())
                );
            }
            moves.insert(
                other,
                u32::try_from(address).map_err(|_| ImageEditError::SizeOverflow(address))?,
            );
            address = aligned_to(address + section.virtual_extent(), section_alignment);
        }
        if address > u32::MAX as u64 {
            return Err(ImageEditError::SizeOverflow(address));
        }

        for (moved, data_directory) in self.data_directories.iter_mut().enumerate() {
            if moved == IMAGE_DIRECTORY_ENTRY_SECURITY || !data_directory.is_present() {
                continue;
            }
            for (&other, &target) in moves.iter() {
                let start = self.sections[other].header.virtual_address;
                let extent = aligned_to(self.sections[other].virtual_extent(), section_alignment);
                let directory_address = data_directory.virtual_address;
                if start <= directory_address && (directory_address as u64) < start as u64 + extent
                {
                    data_directory.virtual_address = directory_address - start + target;
                    debug!(
                        "moving data directory {}: {:#x?} -> {:#x?}",
                        moved,
                        directory_address,
                        { data_directory.virtual_address }
                    );
                    break;
                }
            }
        }

        for (&other, &target) in moves.iter() {
            debug!(
                "moving section {}: {:#x?} -> {:#x?}",
                self.sections[other].name().unwrap_or("?".to_string()),
                { self.sections[other].header.virtual_address },
                target
            );
            self.sections[other].header.virtual_address = target;
        }
        self.sections[index].header.virtual_size = size;
        self.data_directories[directory].size = size;

        Ok((index, virtual_address))
    }

    /// Resize a data directory and its dedicated section.
    ///
    /// If the new size fits the aligned extent of the section, only the sizes are updated and nothing moves.
    /// Otherwise all following sections are packed behind the resized section, and data directories
    /// pointing into moved sections are moved with them. Sections preceding the directory are never moved.
    ///
    /// # Returns
    /// Returns the virtual address of the directory, or an error if the directory has no dedicated section.
    pub fn resize_directory<D: Into<usize>>(
        &mut self, directory: D, size: u32,
    ) -> Result<u32, ImageEditError> {
        self.resize(directory.into(), size).map(|(_, virtual_address)| virtual_address)
    }

    /// Replace the content of a data directory.
    ///
    /// The directory is resized to the length of the data, which replaces the content of its dedicated section.
    /// The data is referenced, not copied.
    /// The content has to be built for the returned virtual address, which is unchanged by the resize.
    ///
    /// # Returns
    /// Returns the virtual address of the directory, or an error if the directory could not be resized.
    pub fn set_directory<D: Into<usize>, B: Into<Blob>>(
        &mut self, directory: D, data: B,
    ) -> Result<u32, ImageEditError> {
        let data = data.into();
        let size = u32::try_from(data.len()).map_err(|_| ImageEditError::SizeOverflow(data.len()))?;
        let (index, virtual_address) = self.resize(directory.into(), size)?;
        self.sections[index].data = Some(data);
        Ok(virtual_address)
    }

    /// Build the image with all changes applied.
    ///
    /// Sections are packed on disk in section table order following the headers, `SizeOfImage` is
    /// recomputed, and the checksum is set. The updated headers are committed to the image.
    ///
    /// # Returns
    /// Returns the image data, or an error if the sections are not contiguous in memory.
    pub fn build(&mut self) -> Result<Blob, ImageWriteError> {
        // copy to-be-modified data to allow erroring out without invalidating the image
        let mut windows_header = self.windows_header;
        let mut data_directories = self.data_directories.clone();
        let mut sections = self.sections.clone();

        windows_header.set_check_sum(0);
        let section_alignment = self.section_alignment();
        let size_of_image = sections
            .iter()
            .map(|section| {
                aligned_to(
                    section.header.virtual_address as u64 + section.virtual_extent(),
                    section_alignment,
                )
            })
            .max()
            .unwrap_or_default();
        let size_of_image = u32::try_from(size_of_image).map_err(|_| {
            ImageWriteError::InvalidLayout(format!("image size {:#x} too large", size_of_image))
        })?;
        debug!("size of image: {:#x?}", size_of_image);
        windows_header.set_size_of_image(size_of_image);

        self.check_vm_layout().map_err(ImageWriteError::InvalidLayout)?;

        let file_alignment = self.file_alignment();
        let headers_end = self.headers_end() + self.header_slack.len();
        let sections_start = aligned_to(headers_end, file_alignment);
        let mut offset = sections_start;
        for section in sections.iter_mut() {
            if section.data.is_none() && section.header.pointer_to_raw_data == 0 {
                continue;
            }
            let size_of_raw_data =
                aligned_to(section.data.as_ref().map(Blob::len).unwrap_or_default(), file_alignment);
            section.header.pointer_to_raw_data = u32::try_from(offset).map_err(|_| {
                ImageWriteError::InvalidLayout(format!("file offset {:#x} too large", offset))
            })?;
            section.header.size_of_raw_data = u32::try_from(size_of_raw_data).map_err(|_| {
                ImageWriteError::InvalidLayout(format!(
                    "section size {:#x} too large",
                    size_of_raw_data
                ))
            })?;
            offset += size_of_raw_data;
        }
        let trailer_offset = offset;

        if let Some(signature) = data_directories.get_mut(IMAGE_DIRECTORY_ENTRY_SECURITY) {
            if signature.size != 0 && signature.virtual_address as u64 >= self.trailer_offset {
                let address = signature.virtual_address as u64 - self.trailer_offset + trailer_offset;
                debug!("moving signature: {:#x?} -> {:#x?}", { signature.virtual_address }, address);
                signature.virtual_address = u32::try_from(address).map_err(|_| {
                    ImageWriteError::InvalidLayout(format!("signature offset {:#x} too large", address))
                })?;
            }
        }

        let mut headers = Vec::with_capacity((headers_end - self.dos_stub.len()) as usize);
        headers.extend_from_slice(&PE_NT_SIGNATURE.to_le_bytes());
        headers.extend_from_slice(self.coff_header.as_bytes());
        headers.extend_from_slice(self.standard_header.as_bytes());
        headers.extend_from_slice(&windows_header.to_bytes());
        for data_directory in data_directories.iter() {
            headers.extend_from_slice(data_directory.as_bytes());
        }
        for section in sections.iter() {
            headers.extend_from_slice(section.header.as_bytes());
        }

        let mut parts = vec![
            self.dos_stub.clone(),
            Blob::from(headers),
            self.header_slack.clone(),
            Blob::zeroed(sections_start - headers_end),
        ];
        for section in sections.iter() {
            if let Some(data) = &section.data {
                parts.push(data.clone());
                parts.push(Blob::zeroed(aligned_to(data.len(), file_alignment) - data.len()));
            }
        }
        parts.push(self.trailer.clone());
        let image = join(parts);

        let checksum_offset = self.checksum_offset();
        let image_checksum = checksum(&image)?;
        debug!("checksum: {:#x?}", image_checksum);
        let image = splice_u32(&image, checksum_offset, image_checksum)?;
        windows_header.set_check_sum(image_checksum);

        self.windows_header = windows_header;
        self.data_directories = data_directories;
        self.sections = sections;
        self.trailer_offset = trailer_offset;

        Ok(image)
    }

    /// Build the image and write it to a writer in bounded chunks.
    ///
    /// # Returns
    /// Returns the number of bytes written, or an error if the image could not be built or the writer could not be written.
    pub fn write_writer<W: Write>(&mut self, writer: &mut W) -> Result<u64, ImageWriteError> {
        let image = self.build()?;
        Ok(image.write_to(writer)?)
    }

    /// Build the image and write it to a file.
    ///
    /// The file must not be the file the image was parsed from with [`Image::parse_file`],
    /// since the unchanged parts of the image are read from it while writing.
    ///
    /// # Returns
    /// Returns the number of bytes written, or an error if the image could not be built or the file could not be written.
    pub fn write_file<P: AsRef<Path>>(&mut self, path: P) -> Result<u64, ImageWriteError> {
        let mut file = File::create(path)?;
        let written = self.write_writer(&mut file)?;
        file.flush()?;
        Ok(written)
    }
}
