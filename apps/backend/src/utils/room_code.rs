//! Room code generation.
//!
//! Room codes are short human-shareable strings drawn from Crockford's
//! Base32 alphabet, so they survive being read aloud or typed by hand.

use rand::Rng;

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U

pub const DEFAULT_ROOM_CODE_LEN: usize = 6;

/// Generate a room code of `len` characters using the thread-local CSPRNG.
///
/// # Example
/// ```
/// use poker_backend::utils::room_code::generate_room_code;
///
/// let code = generate_room_code(6);
/// assert_eq!(code.len(), 6);
/// ```
pub fn generate_room_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CROCKFORD[rng.random_range(0..CROCKFORD.len())] as char)
        .collect()
}

/// Uppercase and map the ambiguous letters the way Crockford decoding does
/// (`I`/`L` → `1`, `O` → `0`). Returns `None` for anything outside the
/// alphabet.
pub fn normalize_room_code(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = match c.to_ascii_uppercase() {
            'I' | 'L' => '1',
            'O' => '0',
            other => other,
        };
        if !c.is_ascii() || !CROCKFORD.contains(&(c as u8)) {
            return None;
        }
        out.push(c);
    }
    (!out.is_empty()).then_some(out)
}
