use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;

use kyarashi_core::{TABLE_ID_ALPHABET, TABLE_ID_LEN};

const SESSION_KEY_BYTES: usize = 12;

/// Join codes are generated client-side; uniqueness rides on the remote
/// store's key semantics, there is no reservation step.
pub fn generate_table_code() -> String {
    let mut rng = rand::thread_rng();
    let alphabet = TABLE_ID_ALPHABET.as_bytes();
    let mut code = String::with_capacity(TABLE_ID_LEN);
    for _ in 0..TABLE_ID_LEN {
        let idx = rng.gen_range(0..alphabet.len());
        code.push(alphabet[idx] as char);
    }
    code
}

/// Random per-browser key, persisted on first use. Only ever used to
/// correlate local diagnostics, never for authorization.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}
