// Turns a raw `lsof` COMMAND token into a display name.

const APP_BUNDLE_SUFFIX: &str = ".app";

/// Cleans a raw command token into a human-readable process name.
///
/// Keeps the last path component, drops an `.app` bundle suffix, decodes `\xHH`
/// escapes and strips surrounding whitespace and trailing punctuation. Never
/// fails; the result is empty when the token held nothing alphanumeric.
///
/// The function is idempotent: feeding its own output back in returns the same
/// string. Escapes that do not decode to a printable character are removed, as
/// are stray backslashes, so a second pass has nothing left to decode.
pub fn sanitize_process_name(command: &str) -> String {
    let base = command.rsplit('/').next().unwrap_or(command);
    let base = base.strip_suffix(APP_BUNDLE_SUFFIX).unwrap_or(base);

    let decoded = decode_hex_escapes(base);
    let mut name = decoded.trim();

    // Stripping punctuation can expose another ".app" and the other way round.
    loop {
        let before = name.len();
        name = name.trim_end_matches(|c: char| !c.is_alphanumeric());
        if let Some(stripped) = name.strip_suffix(APP_BUNDLE_SUFFIX) {
            name = stripped;
        }
        if name.len() == before {
            break;
        }
    }

    name.to_string()
}

/// Replaces `\xHH` sequences with the bytes they encode.
///
/// Consecutive escapes are decoded together, so the UTF-8 sequences `lsof`
/// emits for non-ASCII names come back as the original characters.
fn decode_hex_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        if bytes.get(i + 1) != Some(&b'x') {
            // Lone backslash.
            i += 1;
            continue;
        }

        match bytes.get(i + 2..i + 4).and_then(hex_byte) {
            Some(byte) => {
                out.push(byte);
                i += 4;
            }
            None => i += 2,
        }
    }

    String::from_utf8_lossy(&out)
        .chars()
        .filter(|&c| {
            c != char::REPLACEMENT_CHARACTER && !c.is_control() && c != '/' && c != '\\'
        })
        .collect()
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    if pair.len() != 2 || !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}
