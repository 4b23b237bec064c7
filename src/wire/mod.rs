/*! Low-level packet access and construction.

The `wire` module deals with packet *representation* on two levels.

 * The lowercase byte-wrapper structures ([`ethernet_frame`],
   [`ipv4_packet`], …) extract fields from raw octet sequences and insert
   fields into them. They never allocate and never copy payload data.
 * The `Repr` family of structs and enums ([`ArpRepr`], [`Ipv4Repr`], …)
   is a compact high-level representation of header data that can be
   created by parsing and written back out with `emit`.

When parsing untrusted input it is *necessary* to go through the
`new_checked` constructors; so long as the buffer is not modified
afterwards, no accessor will panic. `Repr::parse` never panics and
`Repr::emit` never panics as long as the buffer is at least
`Repr::buffer_len()` octets long.

[`ethernet_frame`]: struct.ethernet_frame.html
[`ipv4_packet`]: struct.ipv4_packet.html
[`ArpRepr`]: struct.ArpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html
*/
// The field/accessor layout of this module follows the smoltcp wire module
// (0-clause BSD, whitequark@whitequark.org) by way of its ethox rework.

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod ethernet;
mod arp;
mod ipv4;
mod icmpv4;
mod segment;

/// The error type for parsing and emission in the wire module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer is too short to contain the claimed structure.
    Truncated,
    /// A field contains a value that contradicts another field.
    Malformed,
    /// A checksum over the data did not match the checksum field.
    WrongChecksum,
    /// A discriminant field holds a value without assigned meaning.
    Unrecognized,
    /// The structure is valid but uses a feature this stack does not
    /// implement, such as IPv4 options.
    Unsupported,
}

/// The result type of the wire module.
pub type Result<T> = core::result::Result<T, Error>;

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(match self {
            Error::Truncated => "truncated",
            Error::Malformed => "malformed",
            Error::WrongChecksum => "wrong checksum",
            Error::Unrecognized => "unrecognized",
            Error::Unsupported => "unsupported",
        })
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final
    /// complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        // Sum in 32-byte chunks to keep the loop tight.
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // The last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    #[allow(dead_code)]
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }
}

pub use self::ethernet::{
    ethernet as ethernet_frame,
    EtherType as EthernetProtocol,
    Address as EthernetAddress,
    ParseAddressError as ParseEthernetAddressError,
    Repr as EthernetRepr};

pub use self::arp::{
    arp as arp_packet,
    Hardware as ArpHardware,
    Operation as ArpOperation,
    Repr as ArpRepr};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Protocol as IpProtocol,
    Address as Ipv4Address,
    Cidr as Ipv4Cidr,
    Subnet as Ipv4Subnet,
    ParseError as ParseIpv4Error,
    Repr as Ipv4Repr};

pub use self::icmpv4::{
    icmpv4 as icmpv4_packet,
    Message as Icmpv4Message,
    DstUnreachable as Icmpv4DstUnreachable,
    TimeExceeded as Icmpv4TimeExceeded,
    Repr as Icmpv4Repr};

pub use self::segment::{
    segment as ctcp_segment,
    Flags as SegmentFlags,
    SeqNumber,
    Repr as SegmentRepr,
    MAX_SEG_DATA_SIZE};
