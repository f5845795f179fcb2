// src/version.rs

//! RPM version comparison
//!
//! Implements the rpmvercmp algorithm used to order package versions:
//! segment-wise comparison where numeric segments beat alphabetic ones,
//! `~` sorts before everything (pre-releases) and `^` sorts after the
//! base version but before a longer one (post-releases).

use std::cmp::Ordering;

/// Compare two RPM version strings (rpmvercmp semantics)
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    loop {
        // Skip separators; only alphanumerics, '~' and '^' are significant
        while i < a.len() && !a[i].is_ascii_alphanumeric() && a[i] != b'~' && a[i] != b'^' {
            i += 1;
        }
        while j < b.len() && !b[j].is_ascii_alphanumeric() && b[j] != b'~' && b[j] != b'^' {
            j += 1;
        }

        let a_tilde = i < a.len() && a[i] == b'~';
        let b_tilde = j < b.len() && b[j] == b'~';
        if a_tilde || b_tilde {
            if !b_tilde {
                return Ordering::Less;
            }
            if !a_tilde {
                return Ordering::Greater;
            }
            i += 1;
            j += 1;
            continue;
        }

        let a_caret = i < a.len() && a[i] == b'^';
        let b_caret = j < b.len() && b[j] == b'^';
        if a_caret || b_caret {
            if i == a.len() {
                return Ordering::Less;
            }
            if j == b.len() {
                return Ordering::Greater;
            }
            if !a_caret {
                return Ordering::Greater;
            }
            if !b_caret {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i == a.len() || j == b.len() {
            break;
        }

        // Grab the next segment from both sides: a run of digits or a run
        // of letters. A numeric segment always beats an alphabetic one.
        let (seg_a, seg_b, numeric) = if a[i].is_ascii_digit() {
            let sa = take_while(a, i, |c| c.is_ascii_digit());
            let sb = take_while(b, j, |c| c.is_ascii_digit());
            if sb.is_empty() {
                return Ordering::Greater;
            }
            (sa, sb, true)
        } else {
            let sa = take_while(a, i, |c| c.is_ascii_alphabetic());
            let sb = take_while(b, j, |c| c.is_ascii_alphabetic());
            if sb.is_empty() {
                return Ordering::Less;
            }
            (sa, sb, false)
        };

        i += seg_a.len();
        j += seg_b.len();

        let ord = if numeric {
            compare_numeric(seg_a, seg_b)
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    // Whichever side has significant characters left over is newer
    if i == a.len() && j == b.len() {
        Ordering::Equal
    } else if i == a.len() {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Compare (epoch, version, release) triples
pub fn compare_evr(a: (u32, &str, &str), b: (u32, &str, &str)) -> Ordering {
    a.0.cmp(&b.0)
        .then_with(|| rpmvercmp(a.1, b.1))
        .then_with(|| rpmvercmp(a.2, b.2))
}

fn take_while(s: &[u8], start: usize, pred: impl Fn(u8) -> bool) -> &[u8] {
    let mut end = start;
    while end < s.len() && pred(s[end]) {
        end += 1;
    }
    &s[start..end]
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    // More digits means a larger number; equal length falls back to a
    // lexical compare, which is numeric for equal-length digit runs
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let start = s.iter().take_while(|&&c| c == b'0').count();
    &s[start..]
}
