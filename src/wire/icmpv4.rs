use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, Result};

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum Message(u8) {
        EchoReply      =  0,
        DstUnreachable =  3,
        EchoRequest    =  8,
        TimeExceeded   = 11,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::EchoReply      => write!(f, "echo reply"),
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::EchoRequest    => write!(f, "echo request"),
            Message::TimeExceeded   => write!(f, "time exceeded"),
            Message::Unknown(id)    => write!(f, "{}", id)
        }
    }
}

enum_with_unknown! {
    /// Message subtype for "Destination Unreachable".
    pub enum DstUnreachable(u8) {
        NetUnreachable   = 0,
        HostUnreachable  = 1,
        ProtoUnreachable = 2,
        PortUnreachable  = 3,
    }
}

impl fmt::Display for DstUnreachable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DstUnreachable::NetUnreachable =>
                write!(f, "destination network unreachable"),
            DstUnreachable::HostUnreachable =>
                write!(f, "destination host unreachable"),
            DstUnreachable::ProtoUnreachable =>
                write!(f, "destination protocol unreachable"),
            DstUnreachable::PortUnreachable =>
                write!(f, "destination port unreachable"),
            DstUnreachable::Unknown(id) =>
                write!(f, "{}", id)
        }
    }
}

enum_with_unknown! {
    /// Message subtype for "Time Exceeded".
    pub enum TimeExceeded(u8) {
        TtlExpired  = 0,
        FragExpired = 1,
    }
}

byte_wrapper! {
    /// A byte sequence representing an ICMPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const TYPE:       usize = 0;
    pub(crate) const CODE:       usize = 1;
    pub(crate) const CHECKSUM:   Field = 2..4;

    pub(crate) const UNUSED:     Field = 4..6;
    pub(crate) const NEXT_MTU:   Field = 6..8;

    pub(crate) const ECHO_IDENT: Field = 4..6;
    pub(crate) const ECHO_SEQNO: Field = 6..8;

    pub(crate) const HEADER_END: usize = 8;
}

/// How much of the offending datagram an error message quotes: the fixed
/// IP header plus eight payload octets.
pub(crate) const QUOTE_LEN: usize = 28;

impl icmpv4 {
    /// Imbue a raw octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &icmpv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut icmpv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&icmpv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Unwrap the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap the packet as a mutable raw byte slice.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < field::HEADER_END {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the header length.
    pub fn header_len() -> usize {
        field::HEADER_END
    }

    /// Return the length of a buffer required to hold a packet with the
    /// payload of a given length.
    pub fn buffer_len(payload_len: usize) -> usize {
        field::HEADER_END + payload_len
    }

    /// Return the message type field.
    pub fn msg_type(&self) -> Message {
        Message::from(self.0[field::TYPE])
    }

    /// Return the message code field.
    pub fn msg_code(&self) -> u8 {
        self.0[field::CODE]
    }

    /// Return the checksum field.
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the identifier field (for echo request and reply packets).
    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_IDENT])
    }

    /// Return the sequence number field (for echo request and reply
    /// packets).
    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_SEQNO])
    }

    /// Return the next-hop MTU field (for destination unreachable
    /// packets).
    pub fn next_mtu(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::NEXT_MTU])
    }

    /// Validate the checksum over the whole message.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(self.as_bytes()) == !0
    }

    /// Set the message type field.
    pub fn set_msg_type(&mut self, value: Message) {
        self.0[field::TYPE] = value.into();
    }

    /// Set the message code field.
    pub fn set_msg_code(&mut self, value: u8) {
        self.0[field::CODE] = value;
    }

    /// Set the checksum field.
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value);
    }

    /// Set the identifier field (for echo request and reply packets).
    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_IDENT], value);
    }

    /// Set the sequence number field (for echo request and reply
    /// packets).
    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_SEQNO], value);
    }

    /// Zero the unused field (for error packets).
    pub fn set_unused(&mut self) {
        NetworkEndian::write_u16(&mut self.0[field::UNUSED], 0);
    }

    /// Set the next-hop MTU field (for destination unreachable packets).
    pub fn set_next_mtu(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::NEXT_MTU], value);
    }

    /// Compute and fill in the checksum over the whole message.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(&self.0);
        self.set_checksum(checksum);
    }

    /// Return the payload as a byte slice.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[field::HEADER_END..]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0[field::HEADER_END..]
    }
}

impl AsRef<[u8]> for icmpv4 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsMut<[u8]> for icmpv4 {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// A high-level representation of an ICMPv4 header.
///
/// For the error messages, the quoted octets of the offending datagram are
/// the payload of the packet and are copied separately by the caller;
/// `buffer_len` accounts for them.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    EchoRequest {
        ident:  u16,
        seq_no: u16,
        payload: usize,
    },
    EchoReply {
        ident:  u16,
        seq_no: u16,
        payload: usize,
    },
    DstUnreachable {
        reason: DstUnreachable,
        next_mtu: u16,
    },
    TimeExceeded {
        reason: TimeExceeded,
    },
}

impl Repr {
    /// Get the echo reply for this message if it is an echo request.
    pub fn echo_reply(self) -> Option<Repr> {
        match self {
            Repr::EchoRequest { ident, seq_no, payload } =>
                Some(Repr::EchoReply { ident, seq_no, payload }),
            _ => None,
        }
    }

    /// Parse an ICMPv4 packet and return a high-level representation.
    pub fn parse(packet: &icmpv4) -> Result<Repr> {
        packet.check_len()?;
        if !packet.verify_checksum() {
            return Err(Error::WrongChecksum);
        }

        match (packet.msg_type(), packet.msg_code()) {
            (Message::EchoRequest, 0) => {
                Ok(Repr::EchoRequest {
                    ident:  packet.echo_ident(),
                    seq_no: packet.echo_seq_no(),
                    payload: packet.payload_slice().len(),
                })
            },

            (Message::EchoReply, 0) => {
                Ok(Repr::EchoReply {
                    ident:  packet.echo_ident(),
                    seq_no: packet.echo_seq_no(),
                    payload: packet.payload_slice().len(),
                })
            },

            (Message::DstUnreachable, code) => {
                if packet.payload_slice().len() < QUOTE_LEN {
                    return Err(Error::Truncated);
                }
                Ok(Repr::DstUnreachable {
                    reason: DstUnreachable::from(code),
                    next_mtu: packet.next_mtu(),
                })
            },

            (Message::TimeExceeded, code) => {
                if packet.payload_slice().len() < QUOTE_LEN {
                    return Err(Error::Truncated);
                }
                Ok(Repr::TimeExceeded {
                    reason: TimeExceeded::from(code),
                })
            },

            (Message::Unknown(_), _) => Err(Error::Unrecognized),
            _ => Err(Error::Unsupported),
        }
    }

    /// Return the length of a packet that will be emitted from this
    /// high-level representation.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EchoRequest { payload, .. } |
            Repr::EchoReply { payload, .. } => {
                field::HEADER_END + payload
            },
            Repr::DstUnreachable { .. } |
            Repr::TimeExceeded { .. } => {
                field::HEADER_END + QUOTE_LEN
            },
        }
    }

    /// Emit a high-level representation into an ICMPv4 packet.
    ///
    /// The payload (echo data or quoted datagram) must be written by the
    /// caller before filling the checksum with [`fill_checksum`].
    ///
    /// [`fill_checksum`]: struct.icmpv4.html#method.fill_checksum
    pub fn emit(&self, packet: &mut icmpv4) {
        match *self {
            Repr::EchoRequest { ident, seq_no, payload: _ } => {
                packet.set_msg_type(Message::EchoRequest);
                packet.set_msg_code(0);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
            },

            Repr::EchoReply { ident, seq_no, payload: _ } => {
                packet.set_msg_type(Message::EchoReply);
                packet.set_msg_code(0);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
            },

            Repr::DstUnreachable { reason, next_mtu } => {
                packet.set_msg_type(Message::DstUnreachable);
                packet.set_msg_code(reason.into());
                packet.set_unused();
                packet.set_next_mtu(next_mtu);
            },

            Repr::TimeExceeded { reason } => {
                packet.set_msg_type(Message::TimeExceeded);
                packet.set_msg_code(reason.into());
                packet.set_unused();
                packet.set_next_mtu(0);
            },
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repr::EchoRequest { ident, seq_no, payload } =>
                write!(f, "ICMPv4 echo request id={} seq={} len={}",
                       ident, seq_no, payload),
            Repr::EchoReply { ident, seq_no, payload } =>
                write!(f, "ICMPv4 echo reply id={} seq={} len={}",
                       ident, seq_no, payload),
            Repr::DstUnreachable { reason, .. } =>
                write!(f, "ICMPv4 destination unreachable ({})", reason),
            Repr::TimeExceeded { .. } =>
                write!(f, "ICMPv4 time exceeded"),
        }
    }
}
