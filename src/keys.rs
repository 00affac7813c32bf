//! Key name and character tables, and chord resolution.
//!
//! A chord such as `ctrl+alt+F4` is split on `+` and every token is looked up
//! in order: modifier names, function-key names, then (for one-character
//! tokens) the unshifted and shifted character tables. Names are matched
//! case-insensitively, characters case-sensitively, so `A` means Shift+a.
//!
//! The character tables describe an ISO (UK) layout.

use crate::error::{Error, Result};

/// Kernel keycodes (`linux/input-event-codes.h`)
pub mod codes {
    pub const KEY_ESC: u16 = 1;
    pub const KEY_1: u16 = 2;
    pub const KEY_2: u16 = 3;
    pub const KEY_3: u16 = 4;
    pub const KEY_4: u16 = 5;
    pub const KEY_5: u16 = 6;
    pub const KEY_6: u16 = 7;
    pub const KEY_7: u16 = 8;
    pub const KEY_8: u16 = 9;
    pub const KEY_9: u16 = 10;
    pub const KEY_0: u16 = 11;
    pub const KEY_MINUS: u16 = 12;
    pub const KEY_EQUAL: u16 = 13;
    pub const KEY_BACKSPACE: u16 = 14;
    pub const KEY_TAB: u16 = 15;
    pub const KEY_Q: u16 = 16;
    pub const KEY_W: u16 = 17;
    pub const KEY_E: u16 = 18;
    pub const KEY_R: u16 = 19;
    pub const KEY_T: u16 = 20;
    pub const KEY_Y: u16 = 21;
    pub const KEY_U: u16 = 22;
    pub const KEY_I: u16 = 23;
    pub const KEY_O: u16 = 24;
    pub const KEY_P: u16 = 25;
    pub const KEY_LEFTBRACE: u16 = 26;
    pub const KEY_RIGHTBRACE: u16 = 27;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_A: u16 = 30;
    pub const KEY_S: u16 = 31;
    pub const KEY_D: u16 = 32;
    pub const KEY_F: u16 = 33;
    pub const KEY_G: u16 = 34;
    pub const KEY_H: u16 = 35;
    pub const KEY_J: u16 = 36;
    pub const KEY_K: u16 = 37;
    pub const KEY_L: u16 = 38;
    pub const KEY_SEMICOLON: u16 = 39;
    pub const KEY_APOSTROPHE: u16 = 40;
    pub const KEY_GRAVE: u16 = 41;
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_BACKSLASH: u16 = 43;
    pub const KEY_Z: u16 = 44;
    pub const KEY_X: u16 = 45;
    pub const KEY_C: u16 = 46;
    pub const KEY_V: u16 = 47;
    pub const KEY_B: u16 = 48;
    pub const KEY_N: u16 = 49;
    pub const KEY_M: u16 = 50;
    pub const KEY_COMMA: u16 = 51;
    pub const KEY_DOT: u16 = 52;
    pub const KEY_SLASH: u16 = 53;
    pub const KEY_RIGHTSHIFT: u16 = 54;
    pub const KEY_LEFTALT: u16 = 56;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_CAPSLOCK: u16 = 58;
    pub const KEY_F1: u16 = 59;
    pub const KEY_F2: u16 = 60;
    pub const KEY_F3: u16 = 61;
    pub const KEY_F4: u16 = 62;
    pub const KEY_F5: u16 = 63;
    pub const KEY_F6: u16 = 64;
    pub const KEY_F7: u16 = 65;
    pub const KEY_F8: u16 = 66;
    pub const KEY_F9: u16 = 67;
    pub const KEY_F10: u16 = 68;
    pub const KEY_NUMLOCK: u16 = 69;
    pub const KEY_SCROLLLOCK: u16 = 70;
    pub const KEY_102ND: u16 = 86;
    pub const KEY_F11: u16 = 87;
    pub const KEY_F12: u16 = 88;
    pub const KEY_RIGHTCTRL: u16 = 97;
    pub const KEY_SYSRQ: u16 = 99;
    pub const KEY_RIGHTALT: u16 = 100;
    pub const KEY_HOME: u16 = 102;
    pub const KEY_UP: u16 = 103;
    pub const KEY_PAGEUP: u16 = 104;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_END: u16 = 107;
    pub const KEY_DOWN: u16 = 108;
    pub const KEY_PAGEDOWN: u16 = 109;
    pub const KEY_INSERT: u16 = 110;
    pub const KEY_DELETE: u16 = 111;
    pub const KEY_PAUSE: u16 = 119;
    pub const KEY_LEFTMETA: u16 = 125;
    pub const KEY_RIGHTMETA: u16 = 126;

    pub const BTN_LEFT: u16 = 0x110;
    pub const BTN_RIGHT: u16 = 0x111;
    pub const BTN_MIDDLE: u16 = 0x112;
}

use codes::*;

/// Every key and button the virtual device advertises.
pub static SUPPORTED_KEYS: &[u16] = &[
    BTN_LEFT, BTN_RIGHT, BTN_MIDDLE, KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8,
    KEY_9, KEY_0, KEY_MINUS, KEY_EQUAL, KEY_Q, KEY_W, KEY_E, KEY_R, KEY_T, KEY_Y, KEY_U, KEY_I,
    KEY_O, KEY_P, KEY_LEFTBRACE, KEY_RIGHTBRACE, KEY_A, KEY_S, KEY_D, KEY_F, KEY_G, KEY_H, KEY_J,
    KEY_K, KEY_L, KEY_SEMICOLON, KEY_APOSTROPHE, KEY_GRAVE, KEY_BACKSLASH, KEY_102ND, KEY_Z,
    KEY_X, KEY_C, KEY_V, KEY_B, KEY_N, KEY_M, KEY_COMMA, KEY_DOT, KEY_SLASH, KEY_SPACE, KEY_TAB,
    KEY_ENTER, KEY_LEFTALT, KEY_RIGHTALT, KEY_LEFTSHIFT, KEY_RIGHTSHIFT, KEY_LEFTCTRL,
    KEY_RIGHTCTRL, KEY_LEFTMETA, KEY_RIGHTMETA, KEY_UP, KEY_DOWN, KEY_LEFT, KEY_RIGHT,
    KEY_CAPSLOCK, KEY_NUMLOCK, KEY_SCROLLLOCK, KEY_ESC, KEY_BACKSPACE, KEY_DELETE, KEY_INSERT,
    KEY_HOME, KEY_END, KEY_PAGEUP, KEY_PAGEDOWN, KEY_SYSRQ, KEY_PAUSE, KEY_F1, KEY_F2, KEY_F3,
    KEY_F4, KEY_F5, KEY_F6, KEY_F7, KEY_F8, KEY_F9, KEY_F10, KEY_F11, KEY_F12,
];

// All tables below are sorted by their first column for binary search.

static MODIFIER_KEYS: &[(&str, u16)] = &[
    ("ALT", KEY_LEFTALT),
    ("ALT_L", KEY_LEFTALT),
    ("ALT_R", KEY_RIGHTALT),
    ("CTRL", KEY_LEFTCTRL),
    ("CTRL_L", KEY_LEFTCTRL),
    ("CTRL_R", KEY_RIGHTCTRL),
    ("META", KEY_LEFTMETA),
    ("META_L", KEY_LEFTMETA),
    ("META_R", KEY_RIGHTMETA),
    ("SHIFT", KEY_LEFTSHIFT),
    ("SHIFT_L", KEY_LEFTSHIFT),
    ("SHIFT_R", KEY_RIGHTSHIFT),
    ("SUPER", KEY_LEFTMETA),
    ("SUPER_L", KEY_LEFTMETA),
    ("SUPER_R", KEY_RIGHTMETA),
];

static FUNCTION_KEYS: &[(&str, u16)] = &[
    ("BACKSPACE", KEY_BACKSPACE),
    ("CAPSLOCK", KEY_CAPSLOCK),
    ("DELETE", KEY_DELETE),
    ("DOWN", KEY_DOWN),
    ("END", KEY_END),
    ("ENTER", KEY_ENTER),
    ("ESC", KEY_ESC),
    ("F1", KEY_F1),
    ("F10", KEY_F10),
    ("F11", KEY_F11),
    ("F12", KEY_F12),
    ("F2", KEY_F2),
    ("F3", KEY_F3),
    ("F4", KEY_F4),
    ("F5", KEY_F5),
    ("F6", KEY_F6),
    ("F7", KEY_F7),
    ("F8", KEY_F8),
    ("F9", KEY_F9),
    ("HOME", KEY_HOME),
    ("INSERT", KEY_INSERT),
    ("LEFT", KEY_LEFT),
    ("NUMLOCK", KEY_NUMLOCK),
    ("PAGEDOWN", KEY_PAGEDOWN),
    ("PAGEUP", KEY_PAGEUP),
    ("PAUSE", KEY_PAUSE),
    ("RIGHT", KEY_RIGHT),
    ("SCROLLLOCK", KEY_SCROLLLOCK),
    ("SPACE", KEY_SPACE),
    ("SYSRQ", KEY_SYSRQ),
    ("TAB", KEY_TAB),
    ("UP", KEY_UP),
];

#[rustfmt::skip]
static NORMAL_KEYS: &[(char, u16)] = &[
    ('\t', KEY_TAB), ('\n', KEY_ENTER), (' ', KEY_SPACE), ('#', KEY_BACKSLASH),
    ('\'', KEY_APOSTROPHE), (',', KEY_COMMA), ('-', KEY_MINUS), ('.', KEY_DOT),
    ('/', KEY_SLASH),
    ('0', KEY_0), ('1', KEY_1), ('2', KEY_2), ('3', KEY_3), ('4', KEY_4),
    ('5', KEY_5), ('6', KEY_6), ('7', KEY_7), ('8', KEY_8), ('9', KEY_9),
    (';', KEY_SEMICOLON), ('=', KEY_EQUAL), ('[', KEY_LEFTBRACE), ('\\', KEY_102ND),
    (']', KEY_RIGHTBRACE), ('`', KEY_GRAVE),
    ('a', KEY_A), ('b', KEY_B), ('c', KEY_C), ('d', KEY_D), ('e', KEY_E), ('f', KEY_F),
    ('g', KEY_G), ('h', KEY_H), ('i', KEY_I), ('j', KEY_J), ('k', KEY_K), ('l', KEY_L),
    ('m', KEY_M), ('n', KEY_N), ('o', KEY_O), ('p', KEY_P), ('q', KEY_Q), ('r', KEY_R),
    ('s', KEY_S), ('t', KEY_T), ('u', KEY_U), ('v', KEY_V), ('w', KEY_W), ('x', KEY_X),
    ('y', KEY_Y), ('z', KEY_Z),
];

#[rustfmt::skip]
static SHIFTED_KEYS: &[(char, u16)] = &[
    ('!', KEY_1), ('"', KEY_2), ('$', KEY_4), ('%', KEY_5), ('&', KEY_7), ('(', KEY_9),
    (')', KEY_0), ('*', KEY_8), ('+', KEY_EQUAL), (':', KEY_SEMICOLON), ('<', KEY_COMMA),
    ('>', KEY_DOT), ('?', KEY_SLASH), ('@', KEY_APOSTROPHE),
    ('A', KEY_A), ('B', KEY_B), ('C', KEY_C), ('D', KEY_D), ('E', KEY_E), ('F', KEY_F),
    ('G', KEY_G), ('H', KEY_H), ('I', KEY_I), ('J', KEY_J), ('K', KEY_K), ('L', KEY_L),
    ('M', KEY_M), ('N', KEY_N), ('O', KEY_O), ('P', KEY_P), ('Q', KEY_Q), ('R', KEY_R),
    ('S', KEY_S), ('T', KEY_T), ('U', KEY_U), ('V', KEY_V), ('W', KEY_W), ('X', KEY_X),
    ('Y', KEY_Y), ('Z', KEY_Z),
    ('^', KEY_6), ('_', KEY_MINUS), ('{', KEY_LEFTBRACE), ('|', KEY_102ND),
    ('}', KEY_RIGHTBRACE), ('~', KEY_BACKSLASH),
];

/// One key of a resolved chord.
///
/// `shifted` means the key must be wrapped in a Shift press/release to
/// produce the requested character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedKey {
    pub code: u16,
    pub shifted: bool,
}

impl ResolvedKey {
    pub fn plain(code: u16) -> Self {
        Self {
            code,
            shifted: false,
        }
    }

    pub fn shifted(code: u16) -> Self {
        Self {
            code,
            shifted: true,
        }
    }
}

/// Keys of a chord in press order. Release order is the reverse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedKeySequence(Vec<ResolvedKey>);

impl ResolvedKeySequence {
    pub fn keys(&self) -> &[ResolvedKey] {
        &self.0
    }

    pub fn codes(&self) -> Vec<u16> {
        self.0.iter().map(|k| k.code).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ResolvedKey>> for ResolvedKeySequence {
    fn from(keys: Vec<ResolvedKey>) -> Self {
        Self(keys)
    }
}

fn lookup_name(table: &[(&str, u16)], name: &str) -> Option<u16> {
    table
        .binary_search_by(|(entry, _)| (*entry).cmp(name))
        .ok()
        .map(|idx| table[idx].1)
}

fn lookup_char(table: &[(char, u16)], c: char) -> Option<u16> {
    table
        .binary_search_by(|(entry, _)| entry.cmp(&c))
        .ok()
        .map(|idx| table[idx].1)
}

/// Resolve a `+`-separated chord like `ctrl+shift+t` into keycodes.
///
/// Fails on the first token that matches no table; nothing of the chord is
/// returned in that case.
pub fn resolve(chord: &str) -> Result<ResolvedKeySequence> {
    chord
        .split('+')
        .map(resolve_token)
        .collect::<Result<Vec<_>>>()
        .map(ResolvedKeySequence)
}

fn resolve_token(token: &str) -> Result<ResolvedKey> {
    let upper = token.to_ascii_uppercase();

    if let Some(code) = lookup_name(MODIFIER_KEYS, &upper) {
        return Ok(ResolvedKey::plain(code));
    }
    if let Some(code) = lookup_name(FUNCTION_KEYS, &upper) {
        return Ok(ResolvedKey::plain(code));
    }

    let mut chars = token.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(key) = resolve_char(c) {
            return Ok(key);
        }
    }

    Err(Error::UnknownKey(token.to_string()))
}

/// Look up a single character in the character tables only.
pub fn resolve_char(c: char) -> Option<ResolvedKey> {
    lookup_char(NORMAL_KEYS, c)
        .map(ResolvedKey::plain)
        .or_else(|| lookup_char(SHIFTED_KEYS, c).map(ResolvedKey::shifted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_sorted<K: Ord + std::fmt::Debug>(table: &[(K, u16)]) {
        for pair in table.windows(2) {
            assert!(pair[0].0 < pair[1].0, "{:?} >= {:?}", pair[0].0, pair[1].0);
        }
    }

    #[test]
    fn tables_are_strictly_sorted() {
        assert_sorted(MODIFIER_KEYS);
        assert_sorted(FUNCTION_KEYS);
        assert_sorted(NORMAL_KEYS);
        assert_sorted(SHIFTED_KEYS);
    }

    #[test]
    fn every_table_code_is_a_registered_capability() {
        let names = MODIFIER_KEYS.iter().chain(FUNCTION_KEYS).map(|(_, c)| *c);
        let chars = NORMAL_KEYS.iter().chain(SHIFTED_KEYS).map(|(_, c)| *c);
        for code in names.chain(chars) {
            assert!(SUPPORTED_KEYS.contains(&code), "keycode {} not registered", code);
        }
    }

    #[test]
    fn names_are_case_insensitive() {
        let lower = resolve("ctrl+alt+F4").unwrap();
        let upper = resolve("CTRL+ALT+f4").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.codes(), vec![KEY_LEFTCTRL, KEY_LEFTALT, KEY_F4]);
    }

    #[test]
    fn side_suffixes_pick_the_right_modifier() {
        assert_eq!(resolve("ctrl_r").unwrap().codes(), vec![KEY_RIGHTCTRL]);
        assert_eq!(resolve("Super_L").unwrap().codes(), vec![KEY_LEFTMETA]);
        assert_eq!(resolve("shift_R").unwrap().codes(), vec![KEY_RIGHTSHIFT]);
    }

    #[test]
    fn single_characters_are_case_sensitive() {
        assert_eq!(resolve("a").unwrap().keys(), &[ResolvedKey::plain(KEY_A)]);
        assert_eq!(resolve("A").unwrap().keys(), &[ResolvedKey::shifted(KEY_A)]);
        assert_eq!(
            resolve("alt+1+!").unwrap().keys(),
            &[
                ResolvedKey::plain(KEY_LEFTALT),
                ResolvedKey::plain(KEY_1),
                ResolvedKey::shifted(KEY_1),
            ]
        );
    }

    #[test]
    fn names_win_over_characters() {
        // "f1" is a function key, not 'f' followed by anything
        assert_eq!(resolve("f1").unwrap().codes(), vec![KEY_F1]);
        assert_eq!(resolve("f").unwrap().codes(), vec![KEY_F]);
        assert_eq!(resolve("space").unwrap().codes(), vec![KEY_SPACE]);
    }

    #[test]
    fn unknown_token_fails_whole_chord() {
        match resolve("foobar") {
            Err(Error::UnknownKey(token)) => assert_eq!(token, "foobar"),
            other => panic!("expected UnknownKey, got {:?}", other),
        }
        assert!(matches!(resolve("ctrl+nope+a"), Err(Error::UnknownKey(t)) if t == "nope"));
    }

    #[test]
    fn empty_tokens_are_rejected() {
        assert!(resolve("").is_err());
        assert!(resolve("ctrl+").is_err());
        assert!(resolve("ctrl++a").is_err());
    }

    #[test]
    fn character_lookup_skips_name_tables() {
        assert_eq!(resolve_char('\n'), Some(ResolvedKey::plain(KEY_ENTER)));
        assert_eq!(resolve_char('~'), Some(ResolvedKey::shifted(KEY_BACKSLASH)));
        assert_eq!(resolve_char('é'), None);
        assert_eq!(resolve_char('\u{7}'), None);
    }
}
