//! The semantic-haiku proof of work.
//!
//! A trailer's 32-byte nonce carries two 16-token haikus. The proof is
//! accepted when both haikus are grammatical under the frame list and
//! SHA-256 over the 312-byte chain
//!
//! `link ‖ expand(tokens₁) ‖ tokens₂ ‖ block-number`
//!
//! begins with `difficulty` zero bits. The verifier re-derives the
//! expanded text from the token indices; nothing the solver expanded is
//! trusted.

use sha2::{Digest, Sha256};

use crate::consensus::dict::{DICT, FRAMES, F_XLIT, MAX_HAIKU, NFRAMES};

/// Length of the grammar-expanded haiku text inside the hash chain.
pub const EXPAND_LEN: usize = 256;

/// link(32) + expanded text(256) + second haiku(16) + block number(8).
pub const CHAIN_LEN: usize = 32 + EXPAND_LEN + MAX_HAIKU + 8;

/// True when `hash` starts with `difficulty` zero bits.
pub fn eval(hash: &[u8; 32], difficulty: u32) -> bool {
    let d = difficulty.min(256) as usize;
    let full = d / 8;
    if hash[..full].iter().any(|&b| b != 0) {
        return false;
    }
    let rem = d % 8;
    if rem == 0 {
        return true;
    }
    hash[full] & !(0xffu8 >> rem) == 0
}

/// Expand a token vector into the 256-byte text buffer the chain hashes.
/// Token 0 terminates; each word is followed by a space unless it already
/// ends in a newline.
pub fn expand(tokens: &[u8; MAX_HAIKU]) -> [u8; EXPAND_LEN] {
    let mut out = [0u8; EXPAND_LEN];
    let mut at = 0;
    for &tok in tokens {
        if tok == 0 {
            break;
        }
        let word = DICT[tok as usize].token.as_bytes();
        out[at..at + word.len()].copy_from_slice(word);
        at += word.len();
        if out[at - 1] != b'\n' {
            out[at] = b' ';
            at += 1;
        }
    }
    out
}

/// True when some frame accepts every token position.
pub fn syntax_ok(tokens: &[u8; MAX_HAIKU]) -> bool {
    let mut features = [0u32; MAX_HAIKU];
    for (f, &tok) in features.iter_mut().zip(tokens.iter()) {
        *f = DICT[tok as usize].features;
    }

    'frames: for frame in FRAMES.iter() {
        for j in 0..MAX_HAIKU {
            if frame[j] == 0 {
                if features[j] == 0 {
                    return true;
                }
                continue 'frames;
            }
            if frame[j] & F_XLIT != 0 {
                if (frame[j] & 0xff) as u8 != tokens[j] {
                    continue 'frames;
                }
                continue;
            }
            if features[j] & frame[j] == 0 {
                continue 'frames;
            }
        }
        return true;
    }
    false
}

fn hash_chain(link: &[u8; 32], text: &[u8; EXPAND_LEN], second: &[u8], bnum: &[u8; 8]) -> [u8; 32] {
    let mut chain = [0u8; CHAIN_LEN];
    chain[..32].copy_from_slice(link);
    chain[32..32 + EXPAND_LEN].copy_from_slice(text);
    chain[32 + EXPAND_LEN..32 + EXPAND_LEN + MAX_HAIKU].copy_from_slice(second);
    chain[32 + EXPAND_LEN + MAX_HAIKU..].copy_from_slice(bnum);
    Sha256::digest(chain).into()
}

/// Verify a proof. Returns the expanded haiku text when both the grammar
/// predicate and the hash-bit predicate hold.
pub fn check(
    link: &[u8; 32],
    nonce: &[u8; 32],
    difficulty: u32,
    bnum: &[u8; 8],
) -> Option<String> {
    let mut first = [0u8; MAX_HAIKU];
    let mut second = [0u8; MAX_HAIKU];
    first.copy_from_slice(&nonce[..MAX_HAIKU]);
    second.copy_from_slice(&nonce[MAX_HAIKU..]);

    if !syntax_ok(&first) || !syntax_ok(&second) {
        return None;
    }

    let text = expand(&first);
    let hash = hash_chain(link, &text, &second, bnum);
    if !eval(&hash, difficulty) {
        return None;
    }

    let end = text.iter().position(|&b| b == 0).unwrap_or(EXPAND_LEN);
    Some(String::from_utf8_lossy(&text[..end]).into_owned())
}

/// Fill a frame with matching tokens, varied by `salt`.
fn fill_frame(frame: &[u32; MAX_HAIKU], salt: u32) -> [u8; MAX_HAIKU] {
    let mut out = [0u8; MAX_HAIKU];
    for (j, &slot) in frame.iter().enumerate() {
        if slot == 0 {
            continue;
        }
        if slot & F_XLIT != 0 {
            out[j] = (slot & 0xff) as u8;
            continue;
        }
        let candidates: Vec<u8> = (1..DICT.len())
            .filter(|&i| DICT[i].features & slot != 0)
            .map(|i| i as u8)
            .collect();
        let pick = (salt as usize).wrapping_add(j.wrapping_mul(31)) % candidates.len();
        out[j] = candidates[pick];
    }
    out
}

/// Deterministic solver: enumerate grammatical haiku pairs until the
/// hash-bit predicate holds. Returns the nonce and the expanded text.
/// The search is driven by the miner; the verifier never calls this.
pub fn solve(link: &[u8; 32], difficulty: u32, bnum: &[u8; 8]) -> Option<([u8; 32], String)> {
    const MAX_ATTEMPTS: u32 = 1 << 22;

    for salt in 0..MAX_ATTEMPTS {
        let first = fill_frame(&FRAMES[salt as usize % NFRAMES], salt);
        let second = fill_frame(
            &FRAMES[(salt as usize / NFRAMES) % NFRAMES],
            salt.wrapping_mul(0x9e37_79b9).wrapping_add(1),
        );

        let text = expand(&first);
        let hash = hash_chain(link, &text, &second, bnum);
        if eval(&hash, difficulty) {
            let mut nonce = [0u8; 32];
            nonce[..MAX_HAIKU].copy_from_slice(&first);
            nonce[MAX_HAIKU..].copy_from_slice(&second);
            let end = text.iter().position(|&b| b == 0).unwrap_or(EXPAND_LEN);
            return Some((nonce, String::from_utf8_lossy(&text[..end]).into_owned()));
        }
    }
    None
}
