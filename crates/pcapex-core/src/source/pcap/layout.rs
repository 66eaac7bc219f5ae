pub const PCAP_READER_BUFFER_SIZE: usize = 64 * 1024;

pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

pub const PCAP_MAGIC_MICRO_BE: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
pub const PCAP_MAGIC_MICRO_LE: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
pub const PCAP_MAGIC_NANO_BE: [u8; 4] = [0xa1, 0xb2, 0x3c, 0x4d];
pub const PCAP_MAGIC_NANO_LE: [u8; 4] = [0x4d, 0x3c, 0xb2, 0xa1];

/// Default PCAPNG `if_tsresol`: microseconds.
pub const PCAPNG_DEFAULT_TSRESOL: u8 = 6;
