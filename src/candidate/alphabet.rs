//! Named symbol sets.

pub const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const LETTERS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
pub const ALNUM: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const HEX_LOWER: &str = "0123456789abcdef";
pub const HEX_UPPER: &str = "0123456789ABCDEF";
pub const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
/// Digits, letters, punctuation and the space; no other whitespace.
pub const PRINTABLE: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~ ";

pub fn named(name: &str) -> Option<&'static str> {
    match name {
        "lower" => Some(LOWER),
        "upper" => Some(UPPER),
        "letters" => Some(LETTERS),
        "digits" => Some(DIGITS),
        "alnum" => Some(ALNUM),
        "hex" => Some(HEX_LOWER),
        "HEX" => Some(HEX_UPPER),
        "punct" => Some(PUNCTUATION),
        "printable" => Some(PRINTABLE),
        _ => None,
    }
}

/// Resolves a CLI alphabet argument: a known name, or the literal symbols.
pub fn resolve(arg: &str) -> String {
    named(arg)
        .map(str::to_string)
        .unwrap_or_else(|| arg.to_string())
}
