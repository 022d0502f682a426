//! SMS segmentation.
//!
//! GSM 03.38 7-bit when every character is in the default alphabet or its
//! extension table, UCS-2 otherwise. A character is never split across two
//! segments, so escape pairs and surrogate pairs stay whole.

use serde::{Deserialize, Serialize};

/// Default alphabet, in code point order. ESC (0x1B) is left out: it only
/// ever appears as the prefix of an extension character.
const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// Extension table; each costs an escape plus the character.
const GSM7_EXTENSION: &str = "\u{0C}^{}\\[~]|€";

const GSM7_SINGLE: usize = 160;
const GSM7_MULTI: usize = 153;
const UCS2_SINGLE: usize = 70;
const UCS2_MULTI: usize = 67;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

impl Encoding {
    /// The narrowest encoding that can carry `text`.
    pub fn detect(text: &str) -> Self {
        if text.chars().all(|c| gsm7_cost(c).is_some()) {
            Encoding::Gsm7
        } else {
            Encoding::Ucs2
        }
    }

    /// Septets (GSM) or UTF-16 code units (UCS-2) needed for `c`.
    pub fn units(self, c: char) -> usize {
        match self {
            Encoding::Gsm7 => gsm7_cost(c).unwrap_or(2),
            Encoding::Ucs2 => c.len_utf16(),
        }
    }

    pub fn single_limit(self) -> usize {
        match self {
            Encoding::Gsm7 => GSM7_SINGLE,
            Encoding::Ucs2 => UCS2_SINGLE,
        }
    }

    /// Per-segment capacity once a concatenation header is needed.
    pub fn multi_limit(self) -> usize {
        match self {
            Encoding::Gsm7 => GSM7_MULTI,
            Encoding::Ucs2 => UCS2_MULTI,
        }
    }
}

fn gsm7_cost(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENSION.contains(c) {
        Some(2)
    } else {
        None
    }
}

/// One part of a multipart message. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub count: usize,
    pub text: String,
}

/// Split `text` into the segments a carrier would transmit.
///
/// Always returns at least one segment.
pub fn divide(text: &str) -> Vec<Segment> {
    let encoding = Encoding::detect(text);
    let total: usize = text.chars().map(|c| encoding.units(c)).sum();

    let parts: Vec<String> = if total <= encoding.single_limit() {
        vec![text.to_string()]
    } else {
        let limit = encoding.multi_limit();
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut used = 0;
        for c in text.chars() {
            let cost = encoding.units(c);
            if used + cost > limit {
                parts.push(std::mem::take(&mut current));
                used = 0;
            }
            current.push(c);
            used += cost;
        }
        if !current.is_empty() {
            parts.push(current);
        }
        parts
    };

    let count = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Segment {
            index: i + 1,
            count,
            text,
        })
        .collect()
}
