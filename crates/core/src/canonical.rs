//! Legacy identifier → dotted job type translation.
//!
//! Every adapter funnels its raw identifier (Ruby class name, JS job name,
//! Faktory `jobtype`, River `kind`) through [`canonicalize`] so that the same
//! job behaviour ends up with the same type on the target system.
//!
//! Rules, applied in a single pass:
//!
//! 1. `::`, `:`, `.`, `_`, `-` and whitespace end the current segment.
//! 2. Inside a segment, an uppercase letter that follows a letter starts a
//!    new segment (`WelcomeEmail` → `welcome.email`). After a digit it does
//!    not (`S3Upload` → `s3upload`).
//! 3. Everything is lowercased.
//! 4. Empty segments disappear, so there are never leading, trailing or
//!    repeated dots.
//!
//! Acronym runs are split letter by letter (`HTTPServer` → `h.t.t.p.server`).
//! Existing exports and round-trip fixtures depend on that output.

/// Segment separator used in canonical job types.
pub const SEGMENT_SEPARATOR: char = '.';

/// Convert a legacy identifier into a lowercase, dot-separated job type.
///
/// Pure and deterministic. The output is a fixed point:
/// `canonicalize(&canonicalize(x)) == canonicalize(x)`.
pub fn canonicalize(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 4);
    let mut boundary = false;
    // previous character was a letter in the current segment
    let mut after_letter = false;

    for c in identifier.chars() {
        if is_separator(c) {
            boundary = true;
            after_letter = false;
            continue;
        }

        if c.is_uppercase() && after_letter {
            boundary = true;
        }

        if boundary && !out.is_empty() {
            out.push(SEGMENT_SEPARATOR);
        }
        boundary = false;
        after_letter = c.is_alphabetic();

        out.extend(c.to_lowercase());
    }

    out
}

/// True when `s` is already in canonical form.
pub fn is_canonical(s: &str) -> bool {
    !s.is_empty() && canonicalize(s) == s
}

fn is_separator(c: char) -> bool {
    matches!(c, ':' | '.' | '_' | '-') || c.is_whitespace()
}
