use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, Result};

/// The largest payload a single segment may carry.
pub const MAX_SEG_DATA_SIZE: usize = 1440;

/// A sequence number, with the semantics of a wrapping 32-bit counter.
///
/// Sequence numbers compare by their wrapping distance, so an ordering
/// query is only meaningful for numbers less than half the sequence space
/// apart. That holds for everything windowed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// The initial sequence number of every connection.
    pub const INIT: SeqNumber = SeqNumber(1);
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        (self.0.wrapping_sub(other.0) as i32).partial_cmp(&0)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    fn sub(self, rhs: SeqNumber) -> usize {
        let dist = self.0.wrapping_sub(rhs.0);
        if (dist as i32) < 0 {
            panic!("sequence number difference with underflow");
        }
        dist as usize
    }
}

/// The flags word of a segment.
///
/// The bit values are those of the classic TCP header flags, carried in a
/// 32-bit field.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Flags(pub u32);

impl Flags {
    pub const ACK: Flags = Flags(0x10);
    pub const FIN: Flags = Flags(0x01);

    /// Query whether the acknowledgment flag is set.
    pub fn ack(self) -> bool {
        self.0 & Self::ACK.0 != 0
    }

    /// Query whether the finish flag is set.
    pub fn fin(self) -> bool {
        self.0 & Self::FIN.0 != 0
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

byte_wrapper! {
    /// A byte sequence representing a cTCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct segment([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const SEQNO:    Field =  0..4;
    pub(crate) const ACKNO:    Field =  4..8;
    pub(crate) const LENGTH:   Field =  8..10;
    pub(crate) const FLAGS:    Field = 10..14;
    pub(crate) const WINDOW:   Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const DATA:     Rest  = 18..;
}

impl segment {
    /// Imbue a raw octet buffer with segment structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with segment structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Unwrap the segment as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap the segment as a mutable raw byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Return the header length.
    pub fn header_len() -> usize {
        field::DATA.start
    }

    /// Return the length of a buffer required to hold a segment with the
    /// payload of a given length.
    pub fn buffer_len(payload_len: usize) -> usize {
        field::DATA.start + payload_len
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// The length *field* must cover at least the header and must not
    /// exceed the buffer; the datagram layer may pad beyond it.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::DATA.start {
            Err(Error::Truncated)
        } else if usize::from(self.len_field()) < field::DATA.start {
            Err(Error::Malformed)
        } else if len < usize::from(self.len_field()) {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the sequence number field.
    pub fn seqno(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQNO]))
    }

    /// Return the acknowledgment number field.
    pub fn ackno(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACKNO]))
    }

    /// Return the length field, covering header plus data.
    pub fn len_field(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the flags field.
    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u32(&self.0[field::FLAGS]))
    }

    /// Return the window field.
    pub fn window(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WINDOW])
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the number of data octets.
    pub fn data_len(&self) -> usize {
        usize::from(self.len_field()) - field::DATA.start
    }

    /// Validate the checksum over the whole segment.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0[..usize::from(self.len_field())]) == !0
    }

    /// Set the sequence number field.
    pub fn set_seqno(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQNO], value.0)
    }

    /// Set the acknowledgment number field.
    pub fn set_ackno(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACKNO], value.0)
    }

    /// Set the length field.
    pub fn set_len_field(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    /// Set the flags field.
    pub fn set_flags(&mut self, value: Flags) {
        NetworkEndian::write_u32(&mut self.0[field::FLAGS], value.0)
    }

    /// Set the window field.
    pub fn set_window(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WINDOW], value)
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Compute and fill in the checksum over the whole segment.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let len = usize::from(self.len_field());
        let checksum = !checksum::data(&self.0[..len]);
        self.set_checksum(checksum);
    }

    /// Return the data as a byte slice.
    pub fn data_slice(&self) -> &[u8] {
        &self.0[field::DATA.start..usize::from(self.len_field())]
    }

    /// Return the data as a mutable byte slice.
    pub fn data_mut_slice(&mut self) -> &mut [u8] {
        let len = usize::from(self.len_field());
        &mut self.0[field::DATA.start..len]
    }
}

impl AsRef<[u8]> for segment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for segment {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// A high-level representation of a segment header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub seqno:   SeqNumber,
    pub ackno:   SeqNumber,
    pub flags:   Flags,
    pub window:  u16,
    pub payload: usize,
}

impl Repr {
    /// Parse a segment and return a high-level representation.
    ///
    /// The checksum is verified; corrupted segments are
    /// `Error::WrongChecksum`.
    pub fn parse(packet: &segment) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum() {
            return Err(Error::WrongChecksum);
        }

        Ok(Repr {
            seqno: packet.seqno(),
            ackno: packet.ackno(),
            flags: packet.flags(),
            window: packet.window(),
            payload: packet.data_len(),
        })
    }

    /// Return the length of a segment that will be emitted from this
    /// high-level representation.
    pub fn buffer_len(&self) -> usize {
        field::DATA.start + self.payload
    }

    /// Emit a high-level representation into a segment.
    ///
    /// The data must be written by the caller before filling the checksum
    /// with [`fill_checksum`].
    ///
    /// [`fill_checksum`]: struct.segment.html#method.fill_checksum
    pub fn emit(&self, packet: &mut segment) {
        packet.set_seqno(self.seqno);
        packet.set_ackno(self.ackno);
        packet.set_len_field(self.buffer_len() as u16);
        packet.set_flags(self.flags);
        packet.set_window(self.window);
        packet.set_checksum(0);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cTCP seq={} ack={} win={} len={}",
               self.seqno, self.ackno, self.window, self.payload)?;
        if self.flags.ack() { write!(f, " ACK")? }
        if self.flags.fin() { write!(f, " FIN")? }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static SEGMENT_BYTES: [u8; 20] =
        [0x00, 0x00, 0x00, 0x01,
         0x00, 0x00, 0x00, 0x01,
         0x00, 0x14,
         0x00, 0x00, 0x00, 0x10,
         0x05, 0xa0,
         0x91, 0xd0,
         0x68, 0x69];

    fn segment_repr() -> Repr {
        Repr {
            seqno: SeqNumber(1),
            ackno: SeqNumber(1),
            flags: Flags::ACK,
            window: 1440,
            payload: 2,
        }
    }

    #[test]
    fn test_seq_number_ordering() {
        assert!(SeqNumber(10) < SeqNumber(20));
        assert!(SeqNumber(20) > SeqNumber(10));
        // Comparison survives the wrap.
        assert!(SeqNumber(u32::max_value() - 1) < SeqNumber(3));
        assert_eq!(SeqNumber(u32::max_value() - 1) + 5, SeqNumber(3));
        assert_eq!(SeqNumber(3) - SeqNumber(u32::max_value() - 1), 5);
    }

    #[test]
    fn test_deconstruct() {
        let packet = segment::new_checked(&SEGMENT_BYTES[..]).unwrap();
        assert_eq!(packet.seqno(), SeqNumber(1));
        assert_eq!(packet.ackno(), SeqNumber(1));
        assert_eq!(packet.len_field(), 20);
        assert_eq!(packet.flags(), Flags::ACK);
        assert!(packet.flags().ack());
        assert!(!packet.flags().fin());
        assert_eq!(packet.window(), 1440);
        assert_eq!(packet.checksum(), 0x91d0);
        assert_eq!(packet.data_slice(), b"hi");
        assert!(packet.verify_checksum());
    }

    #[test]
    fn test_construct() {
        let repr = segment_repr();
        let mut bytes = vec![0xa5; repr.buffer_len()];
        let packet = segment::new_unchecked_mut(&mut bytes);
        repr.emit(packet);
        packet.data_mut_slice().copy_from_slice(b"hi");
        packet.fill_checksum();
        assert_eq!(packet.as_bytes(), &SEGMENT_BYTES[..]);
    }

    #[test]
    fn test_parse() {
        let packet = segment::new_unchecked(&SEGMENT_BYTES[..]);
        assert_eq!(Repr::parse(packet), Ok(segment_repr()));
    }

    #[test]
    fn test_corrupt() {
        let mut bytes = SEGMENT_BYTES;
        bytes[19] ^= 0x01;
        let packet = segment::new_unchecked(&bytes[..]);
        assert_eq!(Repr::parse(packet), Err(Error::WrongChecksum));
    }

    #[test]
    fn test_padding_tolerated() {
        // A datagram longer than the length field parses fine.
        let mut bytes = SEGMENT_BYTES.to_vec();
        bytes.extend_from_slice(&[0; 6]);
        let packet = segment::new_checked(&bytes[..]).unwrap();
        assert_eq!(Repr::parse(packet), Ok(segment_repr()));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(segment::new_checked(&SEGMENT_BYTES[..17]), Err(Error::Truncated));
        assert_eq!(segment::new_checked(&SEGMENT_BYTES[..19]), Err(Error::Truncated));
    }
}
