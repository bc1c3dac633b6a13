//! Character tables used by the field encoders.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharTable {
    /// " 0-9A-Z+-./?" used by free text
    Full,
    /// " 0-9A-Z", first callsign position
    AlphanumSpace,
    /// "0-9A-Z", second callsign position
    Alphanum,
    /// "0-9", call area digit
    Numeric,
    /// " A-Z", callsign suffix and CQ modifiers
    LettersSpace,
    /// " 0-9A-Z/", non-standard callsigns and hashing
    AlphanumSpaceSlash,
}

impl CharTable {
    fn alphabet(self) -> &'static [u8] {
        match self {
            CharTable::Full => b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ+-./?",
            CharTable::AlphanumSpace => b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharTable::Alphanum => b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharTable::Numeric => b"0123456789",
            CharTable::LettersSpace => b" ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            CharTable::AlphanumSpaceSlash => b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ/",
        }
    }

    pub fn radix(self) -> u32 {
        self.alphabet().len() as u32
    }
}

/// Index of `c` in `table`.
pub fn nchar(c: char, table: CharTable) -> Option<u32> {
    if !c.is_ascii() {
        return None;
    }
    table
        .alphabet()
        .iter()
        .position(|&a| a == c as u8)
        .map(|p| p as u32)
}

/// Character at index `c` of `table`.
pub fn charn(c: u32, table: CharTable) -> Option<char> {
    table.alphabet().get(c as usize).map(|&a| a as char)
}

pub fn in_range(c: char, min: char, max: char) -> bool {
    (c as u32 >= min as u32) && (c as u32 <= max as u32)
}

/// Parses a signed two-digit number such as "-05", "+12" or "7".
pub fn dd_to_int(s: &str) -> Option<i32> {
    let digits = s.strip_prefix(&['+', '-'][..]).unwrap_or(s);
    if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn int_to_dd(value: i32, full_sign: bool) -> String {
    if full_sign {
        format!("{:+03}", value)
    } else {
        format!("{:02}", value)
    }
}
