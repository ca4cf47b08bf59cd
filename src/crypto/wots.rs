//! Winternitz one-time signatures over SHA-256.
//!
//! Parameters are fixed: n = 32, w = 16, giving 64 message chains plus
//! 3 checksum chains (67 total, 2144 signature bytes). Verification
//! reconstructs a candidate public key from the signature and message
//! digest; the caller compares it against the key vector stored in the
//! leading bytes of the source address. Keys are one-time: a second
//! spend fails the ledger balance check, not a signature check.
//!
//! The chain function is keyed by a 32-byte public seed and a 32-byte
//! hash-address seed, both taken from the trailing bytes of the address.

use sha2::{Digest, Sha256};

pub const WOTS_N: usize = 32;
pub const WOTS_W: u32 = 16;
pub const WOTS_LOG_W: u32 = 4;
pub const WOTS_LEN1: usize = 64;
pub const WOTS_LEN2: usize = 3;
pub const WOTS_LEN: usize = WOTS_LEN1 + WOTS_LEN2;
pub const WOTS_SIG_LEN: usize = WOTS_LEN * WOTS_N; // 2144

/// Domain-separation prefixes for the tweakable hash.
const PAD_F: u8 = 0;
const PAD_PRF: u8 = 3;

/// Hash address: eight 32-bit words. Word 5 selects the chain, word 6 the
/// position within the chain, word 7 switches between key and bitmask.
type HashAddr = [u32; 8];

fn addr_from_seed(seed: &[u8; 32]) -> HashAddr {
    let mut addr = [0u32; 8];
    for (i, chunk) in seed.chunks_exact(4).enumerate() {
        addr[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    addr
}

fn addr_to_bytes(addr: &HashAddr) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, word) in addr.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

fn set_chain(addr: &mut HashAddr, chain: u32) {
    addr[5] = chain;
}

fn set_hash(addr: &mut HashAddr, hash: u32) {
    addr[6] = hash;
}

fn set_key_and_mask(addr: &mut HashAddr, which: u32) {
    addr[7] = which;
}

/// PRF(key, input) = SHA-256(pad(3) || key || input).
fn prf(key: &[u8; 32], input: &[u8; 32]) -> [u8; 32] {
    let mut h = Sha256::new();
    let mut pad = [0u8; 32];
    pad[31] = PAD_PRF;
    h.update(pad);
    h.update(key);
    h.update(input);
    h.finalize().into()
}

/// Keyed, masked chain step: SHA-256(pad(0) || key || (input ^ bitmask)).
fn thash_f(input: &[u8; 32], pub_seed: &[u8; 32], addr: &mut HashAddr) -> [u8; 32] {
    set_key_and_mask(addr, 0);
    let key = prf(pub_seed, &addr_to_bytes(addr));
    set_key_and_mask(addr, 1);
    let mask = prf(pub_seed, &addr_to_bytes(addr));

    let mut masked = [0u8; 32];
    for i in 0..WOTS_N {
        masked[i] = input[i] ^ mask[i];
    }

    let mut h = Sha256::new();
    let pad = [0u8; 32]; // pad(PAD_F)
    debug_assert_eq!(PAD_F, 0);
    h.update(pad);
    h.update(key);
    h.update(masked);
    h.finalize().into()
}

/// Iterate the chain function `steps` times starting at position `start`.
fn gen_chain(
    input: &[u8; 32],
    start: u32,
    steps: u32,
    pub_seed: &[u8; 32],
    addr: &mut HashAddr,
) -> [u8; 32] {
    let mut out = *input;
    let mut i = start;
    while i < start + steps && i < WOTS_W {
        set_hash(addr, i);
        out = thash_f(&out, pub_seed, addr);
        i += 1;
    }
    out
}

/// Split bytes into base-w digits, high nibble first.
fn base_w(input: &[u8], out_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(out_len);
    let mut in_idx = 0;
    let mut bits = 0u32;
    let mut total = 0u8;
    for _ in 0..out_len {
        if bits == 0 {
            total = input[in_idx];
            in_idx += 1;
            bits = 8;
        }
        bits -= WOTS_LOG_W;
        out.push((total >> bits) & (WOTS_W - 1) as u8);
    }
    out
}

/// Message digits plus the Winternitz checksum digits.
fn chain_lengths(msg: &[u8; 32]) -> [u8; WOTS_LEN] {
    let mut lengths = [0u8; WOTS_LEN];
    let digits = base_w(msg, WOTS_LEN1);
    lengths[..WOTS_LEN1].copy_from_slice(&digits);

    let mut csum: u32 = 0;
    for &d in &digits {
        csum += WOTS_W - 1 - d as u32;
    }
    // Left-shift so the checksum digits align on a nibble boundary.
    csum <<= 8 - (WOTS_LEN2 as u32 * WOTS_LOG_W) % 8;
    let csum_bytes = [(csum >> 8) as u8, csum as u8];
    let csum_digits = base_w(&csum_bytes, WOTS_LEN2);
    lengths[WOTS_LEN1..].copy_from_slice(&csum_digits);
    lengths
}

/// Reconstruct the public key vector from a signature and message digest.
///
/// Verification succeeds iff the returned 2144 bytes equal the leading
/// 2144 bytes of the signer's address.
pub fn pk_from_sig(
    sig: &[u8; WOTS_SIG_LEN],
    msg: &[u8; 32],
    pub_seed: &[u8; 32],
    addr_seed: &[u8; 32],
) -> [u8; WOTS_SIG_LEN] {
    let lengths = chain_lengths(msg);
    let mut addr = addr_from_seed(addr_seed);
    let mut pk = [0u8; WOTS_SIG_LEN];

    for i in 0..WOTS_LEN {
        set_chain(&mut addr, i as u32);
        let mut seg = [0u8; 32];
        seg.copy_from_slice(&sig[i * WOTS_N..(i + 1) * WOTS_N]);
        let out = gen_chain(
            &seg,
            lengths[i] as u32,
            WOTS_W - 1 - lengths[i] as u32,
            pub_seed,
            &mut addr,
        );
        pk[i * WOTS_N..(i + 1) * WOTS_N].copy_from_slice(&out);
    }
    pk
}

/// Expand a 32-byte secret into the per-chain starting secrets.
fn expand_seed(seed: &[u8; 32]) -> Vec<[u8; 32]> {
    let mut out = Vec::with_capacity(WOTS_LEN);
    for i in 0..WOTS_LEN {
        let mut ctr = [0u8; 32];
        ctr[28..].copy_from_slice(&(i as u32).to_be_bytes());
        out.push(prf(seed, &ctr));
    }
    out
}

/// Derive the public key vector from a secret seed.
pub fn pkgen(
    seed: &[u8; 32],
    pub_seed: &[u8; 32],
    addr_seed: &[u8; 32],
) -> [u8; WOTS_SIG_LEN] {
    let sk = expand_seed(seed);
    let mut addr = addr_from_seed(addr_seed);
    let mut pk = [0u8; WOTS_SIG_LEN];
    for i in 0..WOTS_LEN {
        set_chain(&mut addr, i as u32);
        let out = gen_chain(&sk[i], 0, WOTS_W - 1, pub_seed, &mut addr);
        pk[i * WOTS_N..(i + 1) * WOTS_N].copy_from_slice(&out);
    }
    pk
}

/// Sign a message digest. Each seed must sign exactly once.
pub fn sign(
    msg: &[u8; 32],
    seed: &[u8; 32],
    pub_seed: &[u8; 32],
    addr_seed: &[u8; 32],
) -> [u8; WOTS_SIG_LEN] {
    let lengths = chain_lengths(msg);
    let sk = expand_seed(seed);
    let mut addr = addr_from_seed(addr_seed);
    let mut sig = [0u8; WOTS_SIG_LEN];
    for i in 0..WOTS_LEN {
        set_chain(&mut addr, i as u32);
        let out = gen_chain(&sk[i], 0, lengths[i] as u32, pub_seed, &mut addr);
        sig[i * WOTS_N..(i + 1) * WOTS_N].copy_from_slice(&out);
    }
    sig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    #[test]
    fn sign_then_reconstruct_matches_public_key() {
        let seed = digest(b"secret seed");
        let pub_seed = digest(b"public seed");
        let addr_seed = digest(b"address seed");
        let msg = digest(b"spend 500 satoshi");

        let pk = pkgen(&seed, &pub_seed, &addr_seed);
        let sig = sign(&msg, &seed, &pub_seed, &addr_seed);
        let pk2 = pk_from_sig(&sig, &msg, &pub_seed, &addr_seed);
        assert_eq!(pk[..], pk2[..]);
    }

    #[test]
    fn different_message_fails() {
        let seed = digest(b"secret seed");
        let pub_seed = digest(b"public seed");
        let addr_seed = digest(b"address seed");

        let pk = pkgen(&seed, &pub_seed, &addr_seed);
        let sig = sign(&digest(b"original"), &seed, &pub_seed, &addr_seed);
        let pk2 = pk_from_sig(&sig, &digest(b"forged"), &pub_seed, &addr_seed);
        assert_ne!(pk[..], pk2[..]);
    }

    #[test]
    fn tampered_signature_fails() {
        let seed = digest(b"secret seed");
        let pub_seed = digest(b"public seed");
        let addr_seed = digest(b"address seed");
        let msg = digest(b"message");

        let pk = pkgen(&seed, &pub_seed, &addr_seed);
        let mut sig = sign(&msg, &seed, &pub_seed, &addr_seed);
        sig[100] ^= 1;
        let pk2 = pk_from_sig(&sig, &msg, &pub_seed, &addr_seed);
        assert_ne!(pk[..], pk2[..]);
    }

    #[test]
    fn wrong_seeds_fail() {
        let seed = digest(b"secret seed");
        let pub_seed = digest(b"public seed");
        let addr_seed = digest(b"address seed");
        let msg = digest(b"message");

        let pk = pkgen(&seed, &pub_seed, &addr_seed);
        let sig = sign(&msg, &seed, &pub_seed, &addr_seed);

        let pk2 = pk_from_sig(&sig, &msg, &digest(b"other pub"), &addr_seed);
        assert_ne!(pk[..], pk2[..]);
        let pk3 = pk_from_sig(&sig, &msg, &pub_seed, &digest(b"other addr"));
        assert_ne!(pk[..], pk3[..]);
    }

    #[test]
    fn checksum_covers_all_zero_digits() {
        // An all-zero digest maximizes the checksum; lengths must stay in
        // range and verification must still round-trip.
        let lengths = chain_lengths(&[0u8; 32]);
        assert!(lengths.iter().all(|&l| l < WOTS_W as u8));

        let seed = digest(b"s");
        let pub_seed = digest(b"p");
        let addr_seed = digest(b"a");
        let pk = pkgen(&seed, &pub_seed, &addr_seed);
        let sig = sign(&[0u8; 32], &seed, &pub_seed, &addr_seed);
        assert_eq!(pk[..], pk_from_sig(&sig, &[0u8; 32], &pub_seed, &addr_seed)[..]);
    }
}
