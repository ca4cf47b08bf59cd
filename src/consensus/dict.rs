//! Token dictionary and sentence frames for the semantic-haiku puzzle.
//!
//! This table is consensus data: every node carries the same 256 tokens
//! with the same feature sets, and the same frame list. A haiku is a
//! vector of up to 16 token indices; it is grammatical when some frame
//! accepts every position. Changing a single byte here forks the chain.

/// Verb, present participle.
pub const F_ING: u32 = 1;
/// Verb, infinitive.
pub const F_INF: u32 = 2;
/// Verb of motion.
pub const F_MOTION: u32 = 4;
/// Noun, singular.
pub const F_NS: u32 = 8;
/// Noun, plural.
pub const F_NPL: u32 = 16;
/// Mass noun.
pub const F_MASS: u32 = 32;
/// Ambience adverbial.
pub const F_AMB: u32 = 64;
/// Time of day.
pub const F_TIMED: u32 = 128;
/// Season or era.
pub const F_TIMEY: u32 = 256;
pub const F_TIME: u32 = F_TIMED | F_TIMEY;
pub const F_AT: u32 = 512;
pub const F_ON: u32 = 1024;
pub const F_IN: u32 = 2048;
pub const F_LOC: u32 = F_AT | F_ON | F_IN;
pub const F_NOUN: u32 = F_NS | F_NPL | F_MASS | F_TIME | F_LOC;
/// Preposition.
pub const F_PREP: u32 = 4096;
/// Adjective.
pub const F_ADJ: u32 = 8192;
pub const F_OP: u32 = 16384;
pub const F_DETS: u32 = 32768;
pub const F_DETPL: u32 = 0x10000;
/// Frame slot demands one exact literal token; the token index is in the
/// low byte of the slot value.
pub const F_XLIT: u32 = 0x20000;

pub const MAX_DICT: usize = 256;
pub const MAX_HAIKU: usize = 16;
pub const NFRAMES: usize = 10;

// Literal frame slots (low byte = dictionary index).
const S_NL: u32 = F_XLIT + 1;
const S_CO: u32 = F_XLIT + 2;
const S_MD: u32 = F_XLIT + 3;
#[allow(dead_code)]
const S_LIKE: u32 = F_XLIT + 4;
const S_A: u32 = F_XLIT + 5;
#[allow(dead_code)]
const S_THE: u32 = F_XLIT + 6;
#[allow(dead_code)]
const S_OF: u32 = F_XLIT + 7;
#[allow(dead_code)]
const S_NO: u32 = F_XLIT + 8;
const S_S: u32 = F_XLIT + 9;

#[derive(Debug, Clone, Copy)]
pub struct DictEntry {
    pub token: &'static str,
    pub features: u32,
}

const fn e(token: &'static str, features: u32) -> DictEntry {
    DictEntry { token, features }
}

/// Accepted sentence shapes, NIL-padded to 16 slots.
pub static FRAMES: [[u32; MAX_HAIKU]; NFRAMES] = [
    [F_PREP, F_ADJ, F_MASS, S_NL, F_NPL, S_NL, F_INF | F_ING, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_PREP, F_MASS, S_NL, F_ADJ, F_NPL, S_NL, F_INF | F_ING, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_PREP, F_TIMED, S_NL, F_ADJ, F_NPL, S_NL, F_INF | F_ING, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_PREP, F_TIMED, S_NL, S_A, F_NS, S_NL, F_ING, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_TIME, F_AMB, S_NL, F_PREP, S_A, F_ADJ, F_NS, S_MD, S_NL, F_ADJ | F_ING, 0, 0, 0, 0, 0, 0],
    [F_TIME, F_AMB, S_NL, F_ADJ, F_MASS, S_NL, F_ING, 0, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_TIME, F_MASS, S_NL, F_INF, S_S, S_CO, S_NL, F_AMB, 0, 0, 0, 0, 0, 0, 0, 0],
    [F_ING, F_PREP, S_A, F_ADJ, F_NS, S_NL, F_MASS, F_ING, S_MD, S_NL, S_A, F_ADJ, F_NS, 0, 0, 0],
    [F_ING, F_PREP, F_TIME, F_MASS, S_NL, F_MASS, F_ING, S_MD, S_NL, S_A, F_ADJ, F_NS, 0, 0, 0, 0],
    [S_A, F_NS, S_NL, F_PREP, F_TIMED, F_MASS, S_MD, S_NL, F_ADJ, 0, 0, 0, 0, 0, 0, 0],
];

/// The token table. Index 0 is the terminator; 1..=17 are literals
/// referenced by frame slots; the rest are the word pool.
pub static DICT: [DictEntry; MAX_DICT] = [
    e("", 0),
    // -- literals --
    e("\n", F_XLIT),
    e(",", F_XLIT),
    e("--", F_XLIT),
    e("like", F_XLIT | F_PREP),
    e("a", F_XLIT),
    e("the", F_XLIT),
    e("of", F_XLIT | F_PREP),
    e("no", F_XLIT),
    e("'s", F_XLIT),
    e("after", F_XLIT | F_PREP),
    e("before", F_XLIT | F_PREP),
    e("at", F_XLIT | F_PREP),
    e("in", F_XLIT | F_PREP),
    e("on", F_XLIT | F_PREP),
    e("under", F_XLIT | F_PREP),
    e("above", F_XLIT | F_PREP),
    e("below", F_XLIT | F_PREP),
    // -- prepositions --
    e("beyond", F_PREP),
    e("beneath", F_PREP),
    e("against", F_PREP),
    e("along", F_PREP),
    e("amid", F_PREP),
    e("among", F_PREP),
    e("around", F_PREP),
    e("behind", F_PREP),
    e("beside", F_PREP),
    e("between", F_PREP),
    e("near", F_PREP),
    e("through", F_PREP),
    // -- adjectives --
    e("cold", F_ADJ),
    e("warm", F_ADJ),
    e("still", F_ADJ),
    e("quiet", F_ADJ),
    e("bright", F_ADJ),
    e("dark", F_ADJ),
    e("pale", F_ADJ),
    e("soft", F_ADJ),
    e("gray", F_ADJ),
    e("white", F_ADJ),
    e("red", F_ADJ),
    e("gold", F_ADJ),
    e("green", F_ADJ),
    e("blue", F_ADJ),
    e("silver", F_ADJ),
    e("ancient", F_ADJ),
    e("empty", F_ADJ),
    e("hollow", F_ADJ),
    e("gentle", F_ADJ),
    e("silent", F_ADJ),
    e("frozen", F_ADJ),
    e("misty", F_ADJ),
    e("distant", F_ADJ),
    e("hidden", F_ADJ),
    e("lonely", F_ADJ),
    e("narrow", F_ADJ),
    e("shallow", F_ADJ),
    e("crooked", F_ADJ),
    e("weathered", F_ADJ),
    e("bare", F_ADJ),
    e("dim", F_ADJ),
    e("deep", F_ADJ),
    e("slow", F_ADJ),
    e("swift", F_ADJ),
    e("small", F_ADJ),
    e("vast", F_ADJ),
    e("wet", F_ADJ),
    e("dry", F_ADJ),
    e("thin", F_ADJ),
    e("faded", F_ADJ),
    // -- singular nouns --
    e("river", F_NS),
    e("stone", F_NS),
    e("mountain", F_NS),
    e("cloud", F_NS),
    e("moon", F_NS),
    e("sun", F_NS),
    e("star", F_NS),
    e("tree", F_NS),
    e("leaf", F_NS),
    e("petal", F_NS),
    e("crane", F_NS),
    e("frog", F_NS),
    e("sparrow", F_NS),
    e("heron", F_NS),
    e("cricket", F_NS),
    e("temple", F_NS),
    e("bell", F_NS),
    e("gate", F_NS),
    e("bridge", F_NS),
    e("lantern", F_NS),
    e("boat", F_NS),
    e("path", F_NS),
    e("field", F_NS),
    e("pond", F_NS),
    e("well", F_NS),
    e("roof", F_NS),
    e("window", F_NS),
    e("garden", F_NS),
    e("blossom", F_NS),
    e("branch", F_NS),
    e("shadow", F_NS),
    e("wave", F_NS),
    e("feather", F_NS),
    e("pebble", F_NS),
    e("reed", F_NS),
    e("valley", F_NS),
    e("meadow", F_NS),
    e("cliff", F_NS),
    e("stream", F_NS),
    e("nest", F_NS),
    e("firefly", F_NS),
    e("dragonfly", F_NS),
    e("willow", F_NS),
    e("plum tree", F_NS),
    // -- plural nouns --
    e("rivers", F_NPL),
    e("stones", F_NPL),
    e("mountains", F_NPL),
    e("clouds", F_NPL),
    e("stars", F_NPL),
    e("trees", F_NPL),
    e("leaves", F_NPL),
    e("petals", F_NPL),
    e("cranes", F_NPL),
    e("frogs", F_NPL),
    e("sparrows", F_NPL),
    e("bells", F_NPL),
    e("gates", F_NPL),
    e("bridges", F_NPL),
    e("lanterns", F_NPL),
    e("boats", F_NPL),
    e("paths", F_NPL),
    e("fields", F_NPL),
    e("ponds", F_NPL),
    e("shadows", F_NPL),
    e("waves", F_NPL),
    e("feathers", F_NPL),
    e("pebbles", F_NPL),
    e("reeds", F_NPL),
    e("valleys", F_NPL),
    e("blossoms", F_NPL),
    e("branches", F_NPL),
    e("wings", F_NPL),
    e("voices", F_NPL),
    e("embers", F_NPL),
    e("herons", F_NPL),
    e("crickets", F_NPL),
    e("fireflies", F_NPL),
    e("willows", F_NPL),
    // -- mass nouns --
    e("rain", F_MASS),
    e("snow", F_MASS),
    e("mist", F_MASS),
    e("fog", F_MASS),
    e("wind", F_MASS),
    e("water", F_MASS),
    e("ice", F_MASS),
    e("smoke", F_MASS),
    e("dust", F_MASS),
    e("moss", F_MASS),
    e("grass", F_MASS),
    e("mud", F_MASS),
    e("sand", F_MASS),
    e("frost", F_MASS),
    e("dew", F_MASS),
    e("thunder", F_MASS),
    e("moonlight", F_MASS),
    e("sunlight", F_MASS),
    e("starlight", F_MASS),
    e("silence", F_MASS),
    e("darkness", F_MASS),
    e("shade", F_MASS),
    e("air", F_MASS),
    e("haze", F_MASS),
    e("drizzle", F_MASS),
    e("foam", F_MASS),
    e("ash", F_MASS),
    e("steam", F_MASS),
    e("gloom", F_MASS),
    e("lightning", F_MASS),
    // -- ambience --
    e("softly", F_AMB),
    e("slowly", F_AMB),
    e("gently", F_AMB),
    e("quietly", F_AMB),
    e("faintly", F_AMB),
    e("dimly", F_AMB),
    e("far away", F_AMB),
    e("alone", F_AMB),
    e("at last", F_AMB),
    e("unseen", F_AMB),
    e("in vain", F_AMB),
    e("once more", F_AMB),
    e("again", F_AMB),
    e("at rest", F_AMB),
    e("so still", F_AMB),
    e("unheard", F_AMB),
    // -- times of day --
    e("dawn", F_TIMED),
    e("dusk", F_TIMED),
    e("morning", F_TIMED),
    e("evening", F_TIMED),
    e("midnight", F_TIMED),
    e("noon", F_TIMED),
    e("night", F_TIMED),
    e("daybreak", F_TIMED),
    e("nightfall", F_TIMED),
    e("twilight", F_TIMED),
    e("sunrise", F_TIMED),
    e("sunset", F_TIMED),
    // -- seasons --
    e("spring", F_TIMEY),
    e("summer", F_TIMEY),
    e("autumn", F_TIMEY),
    e("winter", F_TIMEY),
    e("harvest", F_TIMEY),
    e("new year", F_TIMEY),
    e("solstice", F_TIMEY),
    e("equinox", F_TIMEY),
    e("monsoon", F_TIMEY),
    e("midsummer", F_TIMEY),
    // -- participles --
    e("falling", F_ING | F_MOTION),
    e("drifting", F_ING | F_MOTION),
    e("fading", F_ING),
    e("rising", F_ING | F_MOTION),
    e("floating", F_ING | F_MOTION),
    e("flowing", F_ING | F_MOTION),
    e("melting", F_ING),
    e("glowing", F_ING),
    e("whispering", F_ING),
    e("sleeping", F_ING),
    e("waking", F_ING),
    e("wandering", F_ING | F_MOTION),
    e("trembling", F_ING),
    e("swaying", F_ING | F_MOTION),
    e("settling", F_ING | F_MOTION),
    e("burning", F_ING),
    e("freezing", F_ING),
    e("blooming", F_ING),
    e("withering", F_ING),
    e("turning", F_ING | F_MOTION),
    e("sinking", F_ING | F_MOTION),
    e("shining", F_ING),
    e("waiting", F_ING),
    e("dreaming", F_ING),
    // -- infinitives --
    e("fall", F_INF | F_MOTION),
    e("drift", F_INF | F_MOTION),
    e("fade", F_INF),
    e("rise", F_INF | F_MOTION),
    e("float", F_INF | F_MOTION),
    e("flow", F_INF | F_MOTION),
    e("melt", F_INF),
    e("glow", F_INF),
    e("sleep", F_INF),
    e("wake", F_INF),
    e("wander", F_INF | F_MOTION),
    e("tremble", F_INF),
    e("sway", F_INF | F_MOTION),
    e("settle", F_INF | F_MOTION),
    e("burn", F_INF),
    e("freeze", F_INF),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_is_full_and_tokens_fit() {
        assert_eq!(DICT.len(), MAX_DICT);
        assert_eq!(DICT[0].token, "");
        assert_eq!(DICT[0].features, 0);
        for entry in DICT.iter() {
            assert!(entry.token.len() <= 12, "token too long: {}", entry.token);
        }
    }

    #[test]
    fn tokens_are_unique() {
        for (i, a) in DICT.iter().enumerate().skip(1) {
            for b in DICT.iter().skip(i + 1) {
                assert_ne!(a.token, b.token);
            }
        }
    }

    #[test]
    fn literal_slots_reference_literal_tokens() {
        for frame in FRAMES.iter() {
            for &slot in frame.iter() {
                if slot & F_XLIT != 0 {
                    let idx = (slot & 0xff) as usize;
                    assert!(DICT[idx].features & F_XLIT != 0);
                }
            }
        }
    }

    #[test]
    fn every_frame_slot_has_candidates() {
        // A frame slot no token can fill would make some frames
        // unsatisfiable for the solver.
        for frame in FRAMES.iter() {
            for &slot in frame.iter() {
                if slot == 0 || slot & F_XLIT != 0 {
                    continue;
                }
                let count = DICT
                    .iter()
                    .filter(|e| e.features & F_XLIT == 0 && e.features & slot != 0)
                    .count();
                assert!(count > 0, "no candidates for slot {slot:#x}");
            }
        }
    }
}
