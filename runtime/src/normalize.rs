//! Module version normalization.
//!
//! The installed assembler speaks the 0:95 textual format, while callers
//! may hand over 1:0 modules. This is a pure text transform: rewrite the
//! version declaration and the mnemonics that changed between the two
//! formats, then fix the one instruction whose operands also swapped
//! places. Best effort — a module whose version header cannot be parsed is
//! returned unchanged with a diagnostic, and a module already at 0:95
//! passes through untouched, which makes the transform idempotent.

pub const TARGET_MAJOR: u32 = 0;
pub const TARGET_MINOR: u32 = 95;

/// Mnemonic rewrites applied in order after the version declaration.
/// Matching is left-word-boundary prefix substitution: `atomic_ld_scacq_sys_b`
/// must also catch the `..._b64` spelling, so no boundary is required after
/// the match. Every occurrence of a rule is rewritten before the next rule
/// runs; later rules rely on earlier ones having already fired.
const REWRITES: &[(&str, &str)] = &[
    ("br", "brn"),
    ("memfence_scar_global(sys)", "sync"),
    ("cbr_b1", "cbr"),
    ("atomic_cas_global_scar_sys", "atomic_cas_global"),
    ("atomic_add_global_scar_sys", "atomic_add_global"),
    ("atomic_exch_global_scar_sys", "atomic_exch_global"),
    ("atomic_ld_scacq_sys_b", "ld_global_acq_u"),
    ("atomicnoret_add_global_rlx_sys_u32", "atomicnoret_add_global_u32"),
    ("atomicnoret_max_global_rlx_sys_s32", "atomicnoret_max_global_s32"),
    ("atomicnoret_min_global_rlx_sys_s32", "atomicnoret_min_global_s32"),
    ("align (4)", "align 4"),
    ("align (8)", "align 8"),
    ("barrier", "barrier_fgroup"),
];

const ATOMIC_STORE: &str = "atomicnoret_st_screl_sys_b";

/// Rewrite `source` to the assembler's expected version.
///
/// Returns the input unchanged when it already declares the target version
/// or when no version declaration can be found.
pub fn normalize_module(source: &str) -> String {
    let Some(decl) = find_version(source) else {
        tracing::warn!("no parseable module version declaration; leaving source unchanged");
        return source.to_string();
    };

    if decl.major == TARGET_MAJOR && decl.minor == TARGET_MINOR {
        return source.to_string();
    }
    if decl.major != 1 || decl.minor != 0 {
        tracing::warn!(decl.major, decl.minor, "only 1:0 modules have a rewrite table; converting anyway");
    }
    tracing::debug!(decl.major, decl.minor, "converting module to version {TARGET_MAJOR}:{TARGET_MINOR}");

    let mut text = String::with_capacity(source.len());
    text.push_str(&source[..decl.start]);
    text.push_str("version 0:95:");
    text.push_str(&source[decl.end..]);

    for (pattern, replacement) in REWRITES {
        text = rewrite_prefix(&text, pattern, replacement);
    }
    rewrite_atomic_store(&text)
}

struct VersionDecl {
    start: usize,
    end: usize,
    major: u32,
    minor: u32,
}

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Locate `version <major>:<minor>:` — the keyword at a word boundary,
/// exactly one whitespace character before the major number.
fn find_version(text: &str) -> Option<VersionDecl> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(found) = text[search..].find("version") {
        let start = search + found;
        search = start + 1;
        if start > 0 && is_word(bytes[start - 1]) {
            continue;
        }

        let mut i = start + "version".len();
        if !matches!(bytes.get(i), Some(b) if b.is_ascii_whitespace()) {
            continue;
        }
        i += 1;
        let Some((major, next)) = read_number(bytes, i) else { continue };
        i = skip_ws(bytes, next);
        if bytes.get(i) != Some(&b':') {
            continue;
        }
        i = skip_ws(bytes, i + 1);
        let Some((minor, next)) = read_number(bytes, i) else { continue };
        i = skip_ws(bytes, next);
        if bytes.get(i) != Some(&b':') {
            continue;
        }
        return Some(VersionDecl { start, end: i + 1, major, minor });
    }
    None
}

fn read_number(bytes: &[u8], mut i: usize) -> Option<(u32, usize)> {
    let digits_start = i;
    while matches!(bytes.get(i), Some(b) if b.is_ascii_digit()) {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    let number = std::str::from_utf8(&bytes[digits_start..i]).ok()?.parse().ok()?;
    Some((number, i))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while matches!(bytes.get(i), Some(b) if b.is_ascii_whitespace()) {
        i += 1;
    }
    i
}

/// Replace every occurrence of `pattern` that sits at a left word boundary.
fn rewrite_prefix(text: &str, pattern: &str, replacement: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let boundary = i == 0 || !is_word(bytes[i - 1]);
        if boundary && text[i..].starts_with(pattern) {
            out.push_str(replacement);
            i += pattern.len();
        } else {
            let step = text[i..].chars().next().map_or(1, char::len_utf8);
            out.push_str(&text[i..i + step]);
            i += step;
        }
    }
    out
}

/// The release-store form takes `[address], $source` while the 0:95 `st`
/// form takes `$source, [address]`, so this one rewrite must also reverse
/// the two operands.
fn rewrite_atomic_store(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let boundary = i == 0 || !is_word(bytes[i - 1]);
        if boundary && text[i..].starts_with(ATOMIC_STORE) {
            if let Some((consumed, rewritten)) = parse_atomic_store(&text[i..]) {
                out.push_str(&rewritten);
                i += consumed;
                continue;
            }
        }
        let step = text[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&text[i..i + step]);
        i += step;
    }
    out
}

/// Parse `atomicnoret_st_screl_sys_b<width> [<base> + <offset>], $<reg>`;
/// returns the byte length consumed and the reversed replacement text, or
/// `None` when the operands do not have the expected shape (the occurrence
/// is then left alone).
fn parse_atomic_store(rest: &str) -> Option<(usize, String)> {
    let bytes = rest.as_bytes();
    let mut i = ATOMIC_STORE.len();

    let width_start = i;
    while matches!(bytes.get(i), Some(b) if b.is_ascii_digit()) {
        i += 1;
    }
    if i == width_start {
        return None;
    }
    let width = &rest[width_start..i];

    i = skip_ws(bytes, i);
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let addr_start = i;
    if bytes.get(i + 1) != Some(&b'$') {
        return None;
    }
    let close = rest[i..].find(']')? + i;
    let address = &rest[addr_start..=close];

    i = skip_ws(bytes, close + 1);
    if bytes.get(i) != Some(&b',') {
        return None;
    }
    i = skip_ws(bytes, i + 1);

    if bytes.get(i) != Some(&b'$') || !matches!(bytes.get(i + 1), Some(b's') | Some(b'd')) {
        return None;
    }
    let reg_start = i;
    i += 2;
    let digits_start = i;
    while matches!(bytes.get(i), Some(b) if b.is_ascii_digit()) {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    let register = &rest[reg_start..i];

    Some((i, format!("st_global_rel_u{width} {register}, {address}")))
}
