use alloc::collections::BTreeMap;
use alloc::{vec, vec::Vec};
use bitcoin::io::{self as bitcoin_io, Read};

use crate::error::Error;

/// Default limit for a single record inside a nested TLV stream.
pub const MAX_TLV_RECORD_SIZE: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(pub u64);

impl Type {
    pub fn is_odd(self) -> bool {
        self.0 % 2 != 0
    }
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    tlv_type: Type,
    value: Vec<u8>,
}

impl Record {
    pub fn tlv_type(&self) -> Type {
        self.tlv_type
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn value_reader(&self) -> bitcoin_io::Cursor<&[u8]> {
        bitcoin_io::Cursor::new(self.value.as_slice())
    }

    /// Decodes the record value with `f`, requiring that every byte is consumed.
    pub fn decode_with<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut bitcoin_io::Cursor<&[u8]>) -> Result<T, Error>,
    {
        let mut reader = self.value_reader();
        let decoded = f(&mut reader)?;
        if reader.position() as usize != self.value.len() {
            return Err(Error::InvalidTlvValue(
                self.tlv_type.0,
                alloc::format!(
                    "{} trailing bytes",
                    self.value.len() - reader.position() as usize
                ),
            ));
        }
        Ok(decoded)
    }

    /// Returns the value as a fixed size array.
    pub fn fixed<const N: usize>(&self) -> Result<[u8; N], Error> {
        self.value.as_slice().try_into().map_err(|_| {
            Error::InvalidTlvValue(
                self.tlv_type.0,
                alloc::format!("expected {} bytes, got {}", N, self.value.len()),
            )
        })
    }
}

/// Sequential reader over a BigSize-framed TLV stream.
pub struct Stream<R: Read> {
    reader: R,
    max_record_size: u64,
    last_type: Option<u64>,
}

impl<R: Read> Stream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_TLV_RECORD_SIZE)
    }

    pub fn with_limit(reader: R, max_record_size: u64) -> Self {
        Stream {
            reader,
            max_record_size,
            last_type: None,
        }
    }

    /// Reads the next record, returning `None` on a clean end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        let mut first = [0u8; 1];
        let read = loop {
            match self.reader.read(&mut first) {
                Ok(n) => break n,
                Err(e) if e.kind() == bitcoin_io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        };
        if read == 0 {
            return Ok(None);
        }

        let tlv_type = read_bigsize_with_prefix(first[0], &mut self.reader)?;
        if let Some(previous) = self.last_type {
            if tlv_type <= previous {
                return Err(Error::NonIncreasingTlvType {
                    previous,
                    current: tlv_type,
                });
            }
        }
        self.last_type = Some(tlv_type);

        let length = read_bigsize(&mut self.reader)?;
        if length > self.max_record_size {
            return Err(Error::RecordTooLarge {
                tlv_type,
                size: length,
                limit: self.max_record_size,
            });
        }

        let mut value = vec![0; length as usize];
        self.reader.read_exact(&mut value).map_err(|e| {
            Error::TlvStream(alloc::format!(
                "failed to read value for type {} (length {}): {}",
                tlv_type,
                length,
                e
            ))
        })?;

        Ok(Some(Record {
            tlv_type: Type(tlv_type),
            value,
        }))
    }
}

/// Stores an unrecognised record, rejecting unknown even types.
pub fn handle_unknown(
    record: Record,
    unknown_odd_types: &mut BTreeMap<u64, Vec<u8>>,
) -> Result<(), Error> {
    let tlv_type = record.tlv_type();
    if tlv_type.is_odd() {
        unknown_odd_types.insert(tlv_type.0, record.value);
        Ok(())
    } else {
        Err(Error::UnknownTlvType(tlv_type.0))
    }
}

/// A record that knows its own type and how to serialize its value.
pub trait EncodeRecord {
    fn tlv_type(&self) -> Type;
    fn encode_value(&self, out: &mut Vec<u8>);
}

/// Encodes `records` merged with any preserved odd types, ordered by type.
pub fn encode_stream<E: EncodeRecord>(
    records: &[E],
    unknown_odd_types: &BTreeMap<u64, Vec<u8>>,
) -> Vec<u8> {
    let mut encoded: Vec<(u64, Vec<u8>)> = records
        .iter()
        .map(|record| {
            let mut value = Vec::new();
            record.encode_value(&mut value);
            (record.tlv_type().0, value)
        })
        .collect();
    for (tlv_type, value) in unknown_odd_types {
        if !encoded.iter().any(|(known, _)| known == tlv_type) {
            encoded.push((*tlv_type, value.clone()));
        }
    }
    encoded.sort_by_key(|(tlv_type, _)| *tlv_type);

    let mut out = Vec::new();
    for (tlv_type, value) in encoded {
        encode_record(Type(tlv_type), &value, &mut out);
    }
    out
}

/// Encodes a single TLV record into the provided buffer.
pub fn encode_record(tlv_type: Type, value: &[u8], out: &mut Vec<u8>) {
    encode_bigsize(tlv_type.0, out);
    encode_bigsize(value.len() as u64, out);
    out.extend_from_slice(value);
}

/// Encodes a BigSize varint into the provided buffer.
pub fn encode_bigsize(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_be_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Encodes a length-prefixed byte slice.
pub fn encode_var_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    encode_bigsize(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8, Error> {
    Ok(read_array::<R, 1>(r)?[0])
}

pub fn read_u16_be<R: Read + ?Sized>(r: &mut R) -> Result<u16, Error> {
    Ok(u16::from_be_bytes(read_array(r)?))
}

pub fn read_u32_be<R: Read + ?Sized>(r: &mut R) -> Result<u32, Error> {
    Ok(u32::from_be_bytes(read_array(r)?))
}

pub fn read_u64_be<R: Read + ?Sized>(r: &mut R) -> Result<u64, Error> {
    Ok(u64::from_be_bytes(read_array(r)?))
}

pub fn read_array<R: Read + ?Sized, const N: usize>(r: &mut R) -> Result<[u8; N], Error> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(Error::Io)?;
    Ok(buf)
}

/// Reads a BigSize varint, rejecting non-canonical encodings.
pub fn read_bigsize<R: Read + ?Sized>(r: &mut R) -> Result<u64, Error> {
    let first = read_u8(r)?;
    read_bigsize_with_prefix(first, r)
}

fn read_bigsize_with_prefix<R: Read + ?Sized>(first: u8, r: &mut R) -> Result<u64, Error> {
    let (value, min) = match first {
        0..=0xFC => return Ok(first as u64),
        0xFD => (read_u16_be(r)? as u64, 0xFD),
        0xFE => (read_u32_be(r)? as u64, 0x1_0000),
        0xFF => (read_u64_be(r)?, 0x1_0000_0000),
    };
    if value < min {
        return Err(Error::TlvStream(alloc::format!(
            "non-canonical BigSize encoding of {}",
            value
        )));
    }
    Ok(value)
}

/// Reads length-prefixed bytes, refusing lengths above `max_len`.
pub fn read_var_bytes<R: Read + ?Sized>(r: &mut R, max_len: u64) -> Result<Vec<u8>, Error> {
    let len = read_bigsize(r)?;
    if len > max_len {
        return Err(Error::TlvStream(alloc::format!(
            "var bytes length {} exceeds limit {}",
            len,
            max_len
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes).map_err(Error::Io)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Raw(u64, &'static [u8]);

    impl EncodeRecord for Raw {
        fn tlv_type(&self) -> Type {
            Type(self.0)
        }

        fn encode_value(&self, out: &mut Vec<u8>) {
            out.extend_from_slice(self.1);
        }
    }

    #[test]
    fn bigsize_boundaries() {
        let cases: &[(u64, &str)] = &[
            (0, "00"),
            (0xFC, "fc"),
            (0xFD, "fd00fd"),
            (0xFFFF, "fdffff"),
            (0x1_0000, "fe00010000"),
            (0xFFFF_FFFF, "feffffffff"),
            (0x1_0000_0000, "ff0000000100000000"),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_bigsize(*value, &mut out);
            assert_eq!(hex::encode(&out), *expected);
            assert_eq!(read_bigsize(&mut out.as_slice()).unwrap(), *value);
        }
    }

    #[test]
    fn non_canonical_bigsize_rejected() {
        let bytes = hex::decode("fd00fc").unwrap();
        assert!(matches!(
            read_bigsize(&mut bytes.as_slice()),
            Err(Error::TlvStream(_))
        ));
    }

    #[test]
    fn stream_merges_unknown_odd_types_in_order() {
        let mut unknown = BTreeMap::new();
        unknown.insert(3u64, alloc::vec![0xaa]);
        let encoded = encode_stream(&[Raw(0, &[1]), Raw(4, &[2, 2])], &unknown);
        assert_eq!(hex::encode(&encoded), "0001010301aa04020202");

        let mut stream = Stream::new(encoded.as_slice());
        let types: Vec<u64> = core::iter::from_fn(|| stream.next_record().unwrap())
            .map(|record| record.tlv_type().0)
            .collect();
        assert_eq!(types, [0, 3, 4]);
    }

    #[test]
    fn stream_rejects_out_of_order_types() {
        let bytes = hex::decode("02010100010a").unwrap();
        let mut stream = Stream::new(bytes.as_slice());
        assert!(stream.next_record().unwrap().is_some());
        assert!(matches!(
            stream.next_record(),
            Err(Error::NonIncreasingTlvType {
                previous: 2,
                current: 0
            })
        ));
    }

    #[test]
    fn truncated_value_is_an_error() {
        let bytes = hex::decode("0005aabb").unwrap();
        let mut stream = Stream::new(bytes.as_slice());
        assert!(matches!(stream.next_record(), Err(Error::TlvStream(_))));
    }

    #[test]
    fn record_limit_enforced() {
        let bytes = hex::decode("00fe00200000").unwrap();
        let mut stream = Stream::with_limit(bytes.as_slice(), 16);
        assert!(matches!(
            stream.next_record(),
            Err(Error::RecordTooLarge { tlv_type: 0, .. })
        ));
    }

    #[test]
    fn unknown_even_type_rejected() {
        let mut unknown = BTreeMap::new();
        let bytes = hex::decode("0601ff").unwrap();
        let record = Stream::new(bytes.as_slice()).next_record().unwrap().unwrap();
        assert!(matches!(
            handle_unknown(record, &mut unknown),
            Err(Error::UnknownTlvType(6))
        ));
    }
}
