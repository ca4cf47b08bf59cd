//! Wire packet framing.
//!
//! Every packet is a fixed 8920-byte frame: version and network magic,
//! two session ids, an opcode, the sender's tip (block number, hashes,
//! cumulative weight), a length-prefixed transaction buffer, and a
//! CRC-16 over everything but the trailing four bytes. Framing errors
//! are hostile: a conforming peer cannot produce them.

use std::net::Ipv4Addr;

use crate::blockchain::chain::ChainTip;
use crate::config::{HASH_LEN, PACKET_LEN, PVERSION, TRAN_BUFF_LEN, TX_EOT, TX_NETWORK};
use crate::crypto::crc16;
use crate::error::WireError;
use crate::network::sync::Advert;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Null = 0,
    Hello = 1,
    HelloAck = 2,
    Tx = 3,
    Found = 4,
    GetBlock = 5,
    GetIpl = 6,
    SendBlock = 7,
    SendIp = 8,
    Busy = 9,
    Nack = 10,
    GetTrailers = 11,
    Balance = 12,
    SendBalance = 13,
    Resolve = 14,
}

/// First opcode a peer may send after the handshake.
pub const FIRST_OP: u16 = Opcode::Tx as u16;
pub const LAST_OP: u16 = Opcode::Resolve as u16;

impl Opcode {
    pub fn from_u16(v: u16) -> Option<Opcode> {
        match v {
            0 => Some(Opcode::Null),
            1 => Some(Opcode::Hello),
            2 => Some(Opcode::HelloAck),
            3 => Some(Opcode::Tx),
            4 => Some(Opcode::Found),
            5 => Some(Opcode::GetBlock),
            6 => Some(Opcode::GetIpl),
            7 => Some(Opcode::SendBlock),
            8 => Some(Opcode::SendIp),
            9 => Some(Opcode::Busy),
            10 => Some(Opcode::Nack),
            11 => Some(Opcode::GetTrailers),
            12 => Some(Opcode::Balance),
            13 => Some(Opcode::SendBalance),
            14 => Some(Opcode::Resolve),
            _ => None,
        }
    }

    /// Valid as a request after HELLO / HELLO_ACK.
    pub fn is_request(self) -> bool {
        let v = self as u16;
        (FIRST_OP..=LAST_OP).contains(&v)
    }
}

#[derive(Clone)]
pub struct Packet {
    pub version: u8,
    pub id1: u16,
    pub id2: u16,
    pub opcode: u16,
    /// Sender's current tip block number.
    pub cblock: [u8; 8],
    /// Block number for the I/O operation in progress.
    pub blocknum: [u8; 8],
    pub cblockhash: [u8; HASH_LEN],
    pub pblockhash: [u8; HASH_LEN],
    pub weight: [u8; HASH_LEN],
    /// Meaningful bytes in `buffer`.
    pub len: u16,
    pub buffer: Vec<u8>,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet(op={} cblock={} len={})",
            self.opcode,
            u64::from_le_bytes(self.cblock),
            self.len
        )
    }
}

impl Packet {
    pub fn new(opcode: Opcode) -> Packet {
        Packet {
            version: PVERSION,
            id1: 0,
            id2: 0,
            opcode: opcode as u16,
            cblock: [0; 8],
            blocknum: [0; 8],
            cblockhash: [0; HASH_LEN],
            pblockhash: [0; HASH_LEN],
            weight: [0; HASH_LEN],
            len: 0,
            buffer: vec![0u8; TRAN_BUFF_LEN],
        }
    }

    pub fn opcode(&self) -> Result<Opcode, WireError> {
        Opcode::from_u16(self.opcode).ok_or(WireError::BadOpcode(self.opcode))
    }

    /// Fill the advertised tip fields. TX packets reuse the weight
    /// field as an ip map and keep it untouched.
    pub fn stamp_tip(&mut self, tip: &ChainTip) {
        self.cblock = tip.bnum;
        self.cblockhash = tip.bhash;
        self.pblockhash = tip.phash;
        if self.opcode != Opcode::Tx as u16 {
            self.weight = tip.weight;
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PACKET_LEN);
        out.extend_from_slice(&[self.version, 0]);
        out.extend_from_slice(&TX_NETWORK.to_le_bytes());
        out.extend_from_slice(&self.id1.to_le_bytes());
        out.extend_from_slice(&self.id2.to_le_bytes());
        out.extend_from_slice(&self.opcode.to_le_bytes());
        out.extend_from_slice(&self.cblock);
        out.extend_from_slice(&self.blocknum);
        out.extend_from_slice(&self.cblockhash);
        out.extend_from_slice(&self.pblockhash);
        out.extend_from_slice(&self.weight);
        out.extend_from_slice(&self.len.to_le_bytes());
        debug_assert_eq!(self.buffer.len(), TRAN_BUFF_LEN);
        out.extend_from_slice(&self.buffer);
        let crc = crc16(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&TX_EOT.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Packet, WireError> {
        if buf.len() != PACKET_LEN {
            return Err(WireError::ShortPacket(buf.len()));
        }
        let network = u16::from_le_bytes([buf[2], buf[3]]);
        if network != TX_NETWORK {
            return Err(WireError::BadMagic);
        }
        let eot = u16::from_le_bytes([buf[PACKET_LEN - 2], buf[PACKET_LEN - 1]]);
        if eot != TX_EOT {
            return Err(WireError::BadTrailer);
        }
        let stored = u16::from_le_bytes([buf[PACKET_LEN - 4], buf[PACKET_LEN - 3]]);
        if crc16(&buf[..PACKET_LEN - 4]) != stored {
            return Err(WireError::BadCrc);
        }

        let mut at = 0usize;
        let version = buf[0];
        at += 4; // version pair + network magic
        let id1 = u16::from_le_bytes([buf[at], buf[at + 1]]);
        at += 2;
        let id2 = u16::from_le_bytes([buf[at], buf[at + 1]]);
        at += 2;
        let opcode = u16::from_le_bytes([buf[at], buf[at + 1]]);
        at += 2;
        let mut cblock = [0u8; 8];
        cblock.copy_from_slice(&buf[at..at + 8]);
        at += 8;
        let mut blocknum = [0u8; 8];
        blocknum.copy_from_slice(&buf[at..at + 8]);
        at += 8;
        let mut cblockhash = [0u8; HASH_LEN];
        cblockhash.copy_from_slice(&buf[at..at + HASH_LEN]);
        at += HASH_LEN;
        let mut pblockhash = [0u8; HASH_LEN];
        pblockhash.copy_from_slice(&buf[at..at + HASH_LEN]);
        at += HASH_LEN;
        let mut weight = [0u8; HASH_LEN];
        weight.copy_from_slice(&buf[at..at + HASH_LEN]);
        at += HASH_LEN;
        let len = u16::from_le_bytes([buf[at], buf[at + 1]]);
        at += 2;
        let buffer = buf[at..at + TRAN_BUFF_LEN].to_vec();

        Ok(Packet {
            version,
            id1,
            id2,
            opcode,
            cblock,
            blocknum,
            cblockhash,
            pblockhash,
            weight,
            len,
            buffer,
        })
    }

    /// View a FOUND packet as a tip advertisement.
    pub fn advert(&self, peer: Ipv4Addr) -> Advert {
        Advert {
            peer,
            bnum: self.cblock,
            bhash: self.cblockhash,
            phash: self.pblockhash,
            weight: self.weight,
        }
    }
}
