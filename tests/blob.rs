mod common;

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use common::*;
use pepatch::*;

/// Reader returning at most a few bytes per call.
struct Trickle {
    inner: Cursor<Vec<u8>>,
    step:  usize,
}
impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.step);
        self.inner.read(&mut buf[..count])
    }
}
impl Seek for Trickle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { self.inner.seek(pos) }
}

/// The same 40 bytes assembled from every kind of blob.
fn composite(reference: &[u8]) -> Blob {
    let io = Blob::from_reader(Cursor::new(reference[10..24].to_vec()), 14);
    join([
        Blob::from(&reference[..4]),
        Blob::zeroed(6),
        io.slice(..8).unwrap(),
        join([io.slice(8..).unwrap(), Blob::from(&reference[24..30])]),
        Blob::from(reference[30..].to_vec()).slice(..).unwrap(),
    ])
}

fn reference() -> Vec<u8> {
    let mut reference = pattern(40, 1);
    reference[4..10].fill(0);
    reference
}

#[test]
fn reads_match_reference() {
    init_logger();

    let reference = reference();
    let blob = composite(&reference);
    assert_eq!(blob.len(), 40);

    for offset in 0..=40u64 {
        for size in 0..=(40 - offset) as usize {
            let data = blob.read(offset, size).unwrap();
            assert_eq!(
                data,
                reference[offset as usize..offset as usize + size],
                "read {}+{}",
                offset,
                size
            );
        }
    }
}

#[test]
fn slices_match_reference() {
    init_logger();

    let reference = reference();
    let blob = composite(&reference);

    for start in 0..=40u64 {
        for end in start..=40u64 {
            let slice = blob.slice(start..end).unwrap();
            assert_eq!(slice.len(), end - start);
            assert_eq!(slice.to_vec().unwrap(), reference[start as usize..end as usize]);
        }
    }

    let nested = blob.slice(3..35).unwrap().slice(5..20).unwrap().slice(2..=9).unwrap();
    assert_eq!(nested.to_vec().unwrap(), reference[10..18]);
}

#[test]
fn out_of_range() {
    init_logger();

    let blob = Blob::from(pattern(16, 2));
    assert!(matches!(
        blob.read(10, 7),
        Err(BlobError::OutOfRange {
            offset: 10,
            size:   7,
            length: 16,
        })
    ));
    assert!(matches!(blob.read(u64::MAX, 2), Err(BlobError::OutOfRange { .. })));
    assert!(matches!(blob.read_byte(16), Err(BlobError::OutOfRange { .. })));
    assert!(matches!(blob.slice(4..17), Err(BlobError::OutOfRange { .. })));
    #[allow(clippy::reversed_empty_ranges)]
    let reversed = blob.slice(8..4);
    assert!(matches!(reversed, Err(BlobError::OutOfRange { .. })));

    assert_eq!(blob.read(16, 0).unwrap(), Vec::<u8>::new());
    assert!(blob.slice(16..).unwrap().is_empty());
}

#[test]
fn concat_identities() {
    init_logger();

    let blob = Blob::from(pattern(32, 3));
    let empty = Blob::empty();

    assert!(blob.concat(&empty).parts().is_none(), "concatenating an empty blob is the identity");
    assert!(empty.concat(&blob).parts().is_none());
    assert_eq!(blob.concat(&empty).to_vec().unwrap(), pattern(32, 3));
    assert!(join(Vec::<Blob>::new()).is_empty());
    assert!(join([blob.clone()]).parts().is_none());

    let left = blob.slice(..8).unwrap().concat(&blob.slice(8..16).unwrap());
    let right = blob.slice(16..24).unwrap().concat(&blob.slice(24..).unwrap());
    let joined = left.concat(&right);
    assert_eq!(joined.parts().map(|parts| parts.len()), Some(4), "concatenations are flat");
    assert!(joined.parts().unwrap().iter().all(|part| part.parts().is_none()));
    assert_eq!(joined.to_vec().unwrap(), pattern(32, 3));

    let grouped = left.concat(&blob.slice(16..24).unwrap()).concat(&blob.slice(24..).unwrap());
    assert_eq!(grouped.to_vec().unwrap(), joined.to_vec().unwrap(), "concatenation is associative");
}

#[test]
fn padding() {
    init_logger();

    let blob = Blob::pad(0x20, 0xcc);
    assert_eq!(blob.len(), 0x20);
    assert!(blob.to_vec().unwrap().iter().all(|&byte| byte == 0xcc));
    assert_eq!(blob.slice(4..8).unwrap().to_vec().unwrap(), vec![0xcc; 4]);
    assert_eq!(blob.read_byte(0x1f).unwrap(), 0xcc);
    assert!(Blob::zeroed(0).is_empty());

    let text = Blob::from("text").concat(&Blob::pad(2, b'!'));
    assert_eq!(text.to_vec().unwrap(), b"text!!");
}

#[test]
fn io_source_short_reads() {
    init_logger();

    let data = pattern(0x1000, 4);
    let blob = Blob::from_reader(
        Trickle {
            inner: Cursor::new(data.clone()),
            step:  3,
        },
        data.len() as u64,
    );
    assert_eq!(blob.to_vec().unwrap(), data);
    assert_eq!(blob.read(0x7ff, 0x11).unwrap(), data[0x7ff..0x810]);
}

#[test]
fn io_source_truncated() {
    init_logger();

    let blob = Blob::from_reader(Cursor::new(pattern(0x10, 5)), 0x20);
    assert_eq!(blob.read(0, 0x10).unwrap(), pattern(0x10, 5));
    match blob.read(0x8, 0x10) {
        Err(BlobError::IOError(error)) => assert_eq!(error.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected an io error, got {:?}", other),
    }
}

#[test]
fn io_source_measures_length() {
    init_logger();

    let blob = Blob::from_source(Cursor::new(pattern(0x123, 6))).unwrap();
    assert_eq!(blob.len(), 0x123);
    assert_eq!(blob.read(0x100, 0x23).unwrap(), pattern(0x123, 6)[0x100..]);
}

#[test]
fn write_in_chunks() {
    init_logger();

    let large = pattern(0x18_0000, 7);
    let blob = join([
        Blob::from(large.clone()),
        Blob::zeroed(0x10_0001),
        Blob::from(&b"end"[..]),
    ]);

    let mut output = Vec::<u8>::new();
    let written = blob.write_to(&mut output).unwrap();
    assert_eq!(written, 0x18_0000 + 0x10_0001 + 3);
    assert_eq!(output.len() as u64, written);
    assert_eq!(output[..0x18_0000], large[..]);
    assert!(output[0x18_0000..0x28_0001].iter().all(|&byte| byte == 0));
    assert_eq!(&output[0x28_0001..], b"end");

    let mut output = Vec::<u8>::new();
    assert_eq!(Blob::empty().write_to(&mut output).unwrap(), 0);
    assert!(output.is_empty());
}

#[test]
fn reader_read_and_seek() {
    init_logger();

    let reference = reference();
    let mut reader = composite(&reference).reader();

    let mut buffer = [0; 12];
    reader.read_exact(&mut buffer).unwrap();
    assert_eq!(buffer, reference[..12]);
    assert_eq!(reader.position(), 12);

    reader.seek(SeekFrom::End(-4)).unwrap();
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, reference[36..]);

    reader.seek(SeekFrom::Start(20)).unwrap();
    reader.seek(SeekFrom::Current(-2)).unwrap();
    let mut buffer = [0; 4];
    reader.read_exact(&mut buffer).unwrap();
    assert_eq!(buffer, reference[18..22]);

    assert!(reader.seek(SeekFrom::Current(-100)).is_err());

    reader.seek(SeekFrom::Start(100)).unwrap();
    assert_eq!(reader.read(&mut buffer).unwrap(), 0, "reading past the end yields nothing");

    assert_eq!(reader.into_inner().len(), 40);
}
