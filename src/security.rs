// UALINK MODEL — SECURITY IV
// 96-bit AES-GCM initialisation vector: a 64-bit fixed field that must be
// zero, then the 32-bit invocation counter. Key management and encryption are
// external; only the field layout is modelled.

use crate::bits::{field, PacketFormat};

pub const SECURITY_IV_FORMAT: PacketFormat<2> = PacketFormat::new([
    field("fixed", 64),      // 95:32
    field("invocation", 32), // 31:0
]);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Iv96 {
    pub invocation: u32,
}

pub fn serialize_iv96(iv: &Iv96) -> [u8; 12] {
    let mut out = [0u8; 12];
    match SECURITY_IV_FORMAT.pack(&[0, iv.invocation as u64], &mut out) {
        Ok(()) => out,
        Err(_) => unreachable!(),
    }
}

/// Rejects an IV whose fixed field is nonzero.
pub fn deserialize_iv96(bytes: &[u8; 12]) -> Option<Iv96> {
    let v = SECURITY_IV_FORMAT.unpack(bytes);
    if v[0] != 0 {
        return None;
    }
    Some(Iv96 {
        invocation: v[1] as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let iv = Iv96 {
            invocation: 0xDEAD_BEEF,
        };
        let bytes = serialize_iv96(&iv);
        assert_eq!(&bytes[..8], &[0u8; 8]);
        assert_eq!(&bytes[8..], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(deserialize_iv96(&bytes), Some(iv));
    }

    #[test]
    fn nonzero_fixed_field_rejected() {
        let mut bytes = serialize_iv96(&Iv96 { invocation: 1 });
        bytes[0] = 0x80;
        assert!(deserialize_iv96(&bytes).is_none());
    }
}
