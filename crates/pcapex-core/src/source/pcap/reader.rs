use std::io::{Read, Seek, SeekFrom};

use super::error::PcapSourceError;
use super::layout;

/// Read the magic bytes and rewind the reader to the start.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use pcapex_core::source::pcap::reader::read_magic_and_rewind;
/// use std::io::Cursor;
///
/// let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
/// let mut cursor = Cursor::new(bytes);
/// let magic = read_magic_and_rewind(&mut cursor).unwrap();
/// assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
/// ```
///
/// # Errors
/// Returns `PcapSourceError` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

/// Check whether the magic bytes match PCAPNG.
pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Timestamp precision and byte order of a legacy PCAP file, as
/// `(nanosecond, big_endian)`; `None` for a magic that is not PCAP.
pub fn legacy_magic_flags(magic: &[u8; 4]) -> Option<(bool, bool)> {
    match *magic {
        layout::PCAP_MAGIC_NANO_BE => Some((true, true)),
        layout::PCAP_MAGIC_NANO_LE => Some((true, false)),
        layout::PCAP_MAGIC_MICRO_BE => Some((false, true)),
        layout::PCAP_MAGIC_MICRO_LE => Some((false, false)),
        _ => None,
    }
}

/// Convert a legacy PCAP timestamp to seconds.
pub fn legacy_ts_to_seconds(ts_sec: u32, ts_frac: u32, nanosecond: bool) -> f64 {
    let scale = if nanosecond { 1e-9 } else { 1e-6 };
    ts_sec as f64 + (ts_frac as f64 * scale)
}

/// Number of timestamp units per second for a PCAPNG `if_tsresol` value.
///
/// The high bit selects a power of two, otherwise a power of ten. Returns
/// `None` when the resolution does not fit in a `u64`.
pub fn pcapng_units_per_second(tsresol: u8) -> Option<u64> {
    let exponent = u32::from(tsresol & 0x7f);
    if tsresol & 0x80 == 0 {
        10u64.checked_pow(exponent)
    } else {
        2u64.checked_pow(exponent)
    }
}

/// Convert PCAPNG high/low timestamp to seconds.
///
/// # Examples
/// ```text
/// use pcapex_core::source::pcap::reader::pcapng_ts_to_seconds;
///
/// let seconds = pcapng_ts_to_seconds(0, 1_500_000, 6);
/// assert!((seconds - 1.5).abs() < f64::EPSILON);
/// ```
pub fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32, tsresol: u8) -> f64 {
    let ts = ((ts_high as u64) << 32) | (ts_low as u64);
    let units = pcapng_units_per_second(tsresol)
        .or_else(|| pcapng_units_per_second(layout::PCAPNG_DEFAULT_TSRESOL))
        .unwrap_or(1_000_000);
    ts as f64 / units as f64
}

#[cfg(test)]
mod tests {
    use super::{
        is_pcapng_magic, legacy_magic_flags, legacy_ts_to_seconds, pcapng_units_per_second,
        read_magic_and_rewind,
    };
    use crate::source::pcap::error::PcapSourceError;
    use crate::source::pcap::layout;
    use std::io::Cursor;
    use std::io::Read;

    #[test]
    fn detect_pcapng_magic() {
        let data = layout::PCAPNG_MAGIC;
        assert!(is_pcapng_magic(&data));
        assert!(!is_pcapng_magic(&layout::PCAP_MAGIC_MICRO_LE));
    }

    #[test]
    fn read_magic_rewinds() {
        let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
        let mut cursor = Cursor::new(bytes);
        let magic = read_magic_and_rewind(&mut cursor).unwrap();
        assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
        let mut buf = [0u8; 1];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x0a);
    }

    #[test]
    fn read_magic_too_short() {
        let bytes = [0x0a, 0x0d, 0x0d];
        let mut cursor = Cursor::new(bytes);
        let err = read_magic_and_rewind(&mut cursor).unwrap_err();
        assert!(matches!(err, PcapSourceError::Io(_)));
    }

    #[test]
    fn legacy_magic_flags_cover_all_variants() {
        assert_eq!(legacy_magic_flags(&layout::PCAP_MAGIC_MICRO_LE), Some((false, false)));
        assert_eq!(legacy_magic_flags(&layout::PCAP_MAGIC_MICRO_BE), Some((false, true)));
        assert_eq!(legacy_magic_flags(&layout::PCAP_MAGIC_NANO_LE), Some((true, false)));
        assert_eq!(legacy_magic_flags(&layout::PCAP_MAGIC_NANO_BE), Some((true, true)));
    }

    #[test]
    fn unknown_magic_has_no_flags() {
        assert_eq!(legacy_magic_flags(b"GIF8"), None);
        assert_eq!(legacy_magic_flags(&layout::PCAPNG_MAGIC), None);
    }

    #[test]
    fn legacy_ts_honours_precision() {
        assert!((legacy_ts_to_seconds(2, 500_000, false) - 2.5).abs() < 1e-9);
        assert!((legacy_ts_to_seconds(2, 250_000_000, true) - 2.25).abs() < 1e-9);
    }

    #[test]
    fn pcapng_ts_to_seconds_converts_microseconds() {
        let seconds = super::pcapng_ts_to_seconds(0, 1_500_000, 6);
        assert!((seconds - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn pcapng_resolution_supports_powers_of_two() {
        assert_eq!(pcapng_units_per_second(9), Some(1_000_000_000));
        assert_eq!(pcapng_units_per_second(0x80 | 10), Some(1024));
        assert_eq!(pcapng_units_per_second(100), None);
    }
}
