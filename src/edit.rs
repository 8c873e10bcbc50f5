//! Whitespace-correct structural edits over schematic text.
//!
//! Every function here is a pure transformation from old text to new
//! text; bytes outside the edited span are preserved verbatim. Edits
//! must be applied sequentially, each against the previous result, since
//! an earlier edit shifts the offsets of the original document.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::error::StructureError;
use crate::scan::find_block;

static REF_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\(property "Reference" "([^"]+)""#).unwrap());
static REF_INSTANCE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\(reference "([^"]+)"\)"#).unwrap());
static SUB_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\(symbol "([^"]+?)(_\d+_\d+)""#).unwrap());

/// Delete the `(kind ...)` block containing the quoted key `key`
/// (typically a uuid), together with its horizontal indentation and at
/// most one adjoining line break, so no blank line is left behind.
pub fn remove_by_key(doc: &str, key: &str, kind: &str) -> Result<String, StructureError> {
    let marker = format!("\"{key}\"");
    let key_at = doc
        .find(&marker)
        .ok_or_else(|| StructureError::KeyNotFound(key.to_owned()))?;

    let opener = format!("({kind}");
    let start = find_opener_before(doc, &opener, key_at).ok_or_else(|| {
        StructureError::ParentBlockNotFound {
            key: key.to_owned(),
            kind: kind.to_owned(),
        }
    })?;

    let (block, end) = find_block(doc, start)?;
    // The backward search can latch onto an earlier sibling of the same
    // kind whose block closed before the key.
    if !block.contains(&marker) {
        return Err(StructureError::KeyNotInBlock {
            key: key.to_owned(),
            kind: kind.to_owned(),
        });
    }

    let bytes = doc.as_bytes();
    let mut cut_start = start;
    while cut_start > 0 && matches!(bytes[cut_start - 1], b' ' | b'\t') {
        cut_start -= 1;
    }
    let mut cut_end = end;
    while cut_end < doc.len() && matches!(bytes[cut_end], b' ' | b'\t') {
        cut_end += 1;
    }
    if cut_end < doc.len() && bytes[cut_end] == b'\n' {
        cut_end += 1;
    } else if cut_start > 0 && bytes[cut_start - 1] == b'\n' {
        cut_start -= 1;
    }

    let mut out = String::with_capacity(doc.len() - (cut_end - cut_start));
    out.push_str(&doc[..cut_start]);
    out.push_str(&doc[cut_end..]);
    Ok(out)
}

/// Nearest `(kind` opener ending strictly before `before`, where the
/// opener is followed by a delimiter and not part of a longer tag name.
fn find_opener_before(doc: &str, opener: &str, before: usize) -> Option<usize> {
    let mut hi = before;
    loop {
        let at = doc[..hi].rfind(opener)?;
        let boundary = doc[at + opener.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_whitespace() || c == '(' || c == '"' || c == ')');
        if boundary {
            return Some(at);
        }
        hi = at;
    }
}

/// Rewrite a reference designator wherever it appears as the value of a
/// `Reference` property or inside an `(instances ...)` path entry.
/// Returns the new text and the number of substitutions. Deliberately
/// not a global string replace: a net label or value that happens to
/// spell the same characters is left alone.
pub fn replace_reference(doc: &str, old: &str, new: &str) -> (String, usize) {
    let prop_old = format!("(property \"Reference\" \"{old}\"");
    let prop_new = format!("(property \"Reference\" \"{new}\"");
    let inst_old = format!("(reference \"{old}\")");
    let inst_new = format!("(reference \"{new}\")");

    let count = doc.matches(&prop_old).count() + doc.matches(&inst_old).count();
    let out = doc.replace(&prop_old, &prop_new).replace(&inst_old, &inst_new);
    (out, count)
}

/// Append `"1"` to every distinct reference designator failing
/// `predicate`, rewriting both of its syntactic positions. Returns the
/// new text and the sorted list of designators that were changed.
///
/// Operates on the uniqued set rather than raw occurrences: one logical
/// instance owns several textual occurrences of its designator.
pub fn renumber_missing_suffix<F>(doc: &str, predicate: F) -> (String, Vec<String>)
where
    F: Fn(&str) -> bool,
{
    let refs: BTreeSet<String> = collect_references(doc);

    let mut out = doc.to_owned();
    let mut changed = Vec::new();
    for r in refs {
        if predicate(&r) {
            continue;
        }
        let renamed = format!("{r}1");
        out = replace_reference(&out, &r, &renamed).0;
        changed.push(r);
    }
    (out, changed)
}

/// Every distinct reference designator in the document, sorted.
pub fn collect_references(doc: &str) -> BTreeSet<String> {
    REF_PROPERTY
        .captures_iter(doc)
        .chain(REF_INSTANCE.captures_iter(doc))
        .map(|c| c[1].to_owned())
        .collect()
}

/// Strip a `Lib:` prefix from sub-unit symbol names. KiCad rejects
/// `(symbol "Device:R_0_1" ...)` inside `lib_symbols`; the sub-unit must
/// be named `R_0_1`.
pub fn fix_subsymbol_names(doc: &str) -> String {
    SUB_SYMBOL
        .replace_all(doc, |caps: &regex::Captures| {
            let full = &caps[1];
            let suffix = &caps[2];
            match full.split_once(':') {
                Some((_, short)) => format!("(symbol \"{short}{suffix}\""),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}
