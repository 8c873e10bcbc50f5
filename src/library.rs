//! Symbol definitions parsed from `.kicad_sym` libraries or from the
//! `lib_symbols` section embedded in a schematic.
//!
//! Only top-level definitions are entered into the library. Sub-unit
//! blocks (`Name_0_1`, `Name_1_1`, ...) are representations owned by
//! their parent; their pins are attributed to the parent because pin
//! extraction scans the parent's full block text at any depth.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::StructureError;
use crate::grid::Rotation;
use crate::scan::{find_block, TokenIter, TokenKind};

static SUB_UNIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"_\d+_\d+$").unwrap());

/// Electrical type of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinKind {
    Passive,
    PowerIn,
    PowerOut,
    Input,
    Output,
    Bidirectional,
}

impl TryFrom<&str> for PinKind {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "passive" => Ok(Self::Passive),
            "power_in" => Ok(Self::PowerIn),
            "power_out" => Ok(Self::PowerOut),
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            "bidirectional" => Ok(Self::Bidirectional),
            _ => Err(()),
        }
    }
}

/// A pin definition in library coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PinDef {
    pub name: String,
    pub number: String,
    pub x: f64,
    pub y: f64,
    pub angle: Rotation,
    pub length: f64,
    pub kind: PinKind,
}

/// A symbol definition with its pins.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDef {
    pub name: String,
    pub pins: Vec<PinDef>,
}

impl SymbolDef {
    /// Look up a pin by name or, with `by_number`, by pad number.
    /// Absence is not an error; callers decide whether it is fatal.
    pub fn pin(&self, selector: &str, by_number: bool) -> Option<&PinDef> {
        self.pins.iter().find(|p| {
            if by_number {
                p.number == selector
            } else {
                p.name == selector
            }
        })
    }
}

/// Symbol definitions keyed by name. Redefinition overwrites (last write
/// wins).
#[derive(Debug, Default, Clone)]
pub struct SymbolLibrary {
    symbols: HashMap<String, SymbolDef>,
}

impl SymbolLibrary {
    /// Parse every top-level symbol definition out of `content`, which
    /// may be a whole `.kicad_sym` file or a schematic containing a
    /// `lib_symbols` section.
    pub fn parse(content: &str) -> Result<Self, StructureError> {
        const OPENER: &str = "(symbol \"";

        let mut symbols = HashMap::new();
        let mut pos = 0;
        while let Some(off) = content[pos..].find(OPENER) {
            let at = pos + off;
            let name_start = at + OPENER.len();
            let Some(name_len) = content[name_start..].find('"') else {
                break;
            };
            let name = &content[name_start..name_start + name_len];

            if SUB_UNIT.is_match(name) {
                pos = name_start + name_len;
                continue;
            }

            let (block, end) = find_block(content, at)?;
            let pins = extract_pins(block);
            if !pins.is_empty() {
                symbols.insert(name.to_owned(), SymbolDef {
                    name: name.to_owned(),
                    pins,
                });
            }
            pos = end;
        }
        Ok(Self { symbols })
    }

    /// Get a definition by name, trying again without a `lib:` prefix.
    pub fn get(&self, name: &str) -> Option<&SymbolDef> {
        if let Some(def) = self.symbols.get(name) {
            return Some(def);
        }
        let (_, short) = name.split_once(':')?;
        self.symbols.get(short)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Collect every well-formed pin declaration inside a symbol block,
/// nested sub-units included. Declarations missing a required field are
/// skipped.
fn extract_pins(block: &str) -> Vec<PinDef> {
    let mut pins = Vec::new();
    let mut pos = 0;
    while let Some(off) = block[pos..].find("(pin") {
        let at = pos + off;
        let rest = &block[at + "(pin".len()..];
        // Do not match (pin_names ...) or (pin_numbers ...).
        if !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            pos = at + "(pin".len();
            continue;
        }
        let Ok((pin_block, end)) = find_block(block, at) else {
            break;
        };
        if let Some(pin) = parse_pin(pin_block) {
            pins.push(pin);
        }
        pos = end;
    }
    pins
}

fn parse_pin(pin_block: &str) -> Option<PinDef> {
    let toks: Vec<(TokenKind, &str)> = TokenIter::new(pin_block)
        .map(|t| (t.kind, &pin_block[t.span]))
        .collect();

    // (pin <kind> <shape> ...children...)
    match toks.first()? {
        (TokenKind::LParen, _) => {}
        _ => return None,
    }
    if toks.get(1)? != &(TokenKind::Atom, "pin") {
        return None;
    }
    let kind = match toks.get(2)? {
        (TokenKind::Atom, s) => PinKind::try_from(*s).ok()?,
        _ => return None,
    };
    match toks.get(3)? {
        (TokenKind::Atom, _) => {}
        _ => return None,
    }

    let mut at: Option<(f64, f64, Rotation)> = None;
    let mut length: Option<f64> = None;
    let mut name: Option<&str> = None;
    let mut number: Option<&str> = None;

    let mut i = 4;
    while i < toks.len() {
        if toks[i].0 != TokenKind::LParen {
            i += 1;
            continue;
        }
        let label = match toks.get(i + 1) {
            Some((TokenKind::Atom, s)) => *s,
            _ => {
                i += 1;
                continue;
            }
        };
        match label {
            "at" => {
                let x = atom_number(&toks, i + 2)?;
                let y = atom_number(&toks, i + 3)?;
                let angle = atom_number(&toks, i + 4)?;
                let angle = Rotation::try_from(angle as i32).ok()?;
                at = Some((x, y, angle));
            }
            "length" => {
                length = Some(atom_number(&toks, i + 2)?);
            }
            "name" => {
                if let Some((TokenKind::String, s)) = toks.get(i + 2) {
                    name = Some(*s);
                }
            }
            "number" => {
                if let Some((TokenKind::String, s)) = toks.get(i + 2) {
                    number = Some(*s);
                }
            }
            _ => {}
        }
        i = skip_list(&toks, i);
    }

    let (x, y, angle) = at?;
    Some(PinDef {
        name: name?.to_owned(),
        number: number?.to_owned(),
        x,
        y,
        angle,
        length: length?,
        kind,
    })
}

fn atom_number(toks: &[(TokenKind, &str)], i: usize) -> Option<f64> {
    match toks.get(i)? {
        (TokenKind::Atom, s) => s.parse().ok(),
        _ => None,
    }
}

/// Index one past the balanced list opening at `toks[i]`.
fn skip_list(toks: &[(TokenKind, &str)], i: usize) -> usize {
    let mut depth = 0usize;
    let mut j = i;
    while j < toks.len() {
        match toks[j].0 {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    toks.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESISTOR: &str = r#"(kicad_symbol_lib
  (symbol "Device:R"
    (pin_names (offset 0))
    (symbol "R_0_1"
      (rectangle (start -1.016 -2.54) (end 1.016 2.54))
    )
    (symbol "R_1_1"
      (pin passive line (at 0 3.81 270) (length 1.27)
        (name "~" (effects (font (size 1.27 1.27))))
        (number "1" (effects (font (size 1.27 1.27))))
      )
      (pin passive line (at 0 -3.81 90) (length 1.27)
        (name "~" (effects (font (size 1.27 1.27))))
        (number "2" (effects (font (size 1.27 1.27))))
      )
    )
  )
)"#;

    #[test]
    fn sub_unit_pins_are_attributed_to_the_parent() {
        let lib = SymbolLibrary::parse(RESISTOR).unwrap();
        assert_eq!(lib.len(), 1);
        let def = lib.get("Device:R").unwrap();
        assert_eq!(def.name, "Device:R");
        assert_eq!(def.pins.len(), 2);
        assert_eq!(def.pins[0].number, "1");
        assert_eq!(def.pins[1].number, "2");
        assert!(lib.get("R_1_1").is_none());
    }

    #[test]
    fn lookup_strips_library_prefix() {
        let content = r#"(symbol "R" (symbol "R_1_1"
            (pin passive line (at 0 2.54 270) (length 1.27)
              (name "~") (number "1"))))"#;
        let lib = SymbolLibrary::parse(content).unwrap();
        assert!(lib.get("R").is_some());
        assert!(lib.get("Device:R").is_some());
        assert!(lib.get("Device:C").is_none());
    }

    #[test]
    fn pin_fields_are_parsed() {
        let lib = SymbolLibrary::parse(RESISTOR).unwrap();
        let def = lib.get("Device:R").unwrap();
        let pin = def.pin("1", true).unwrap();
        assert_eq!(pin.kind, PinKind::Passive);
        assert_eq!(pin.x, 0.0);
        assert_eq!(pin.y, 3.81);
        assert_eq!(pin.angle, Rotation::R270);
        assert_eq!(pin.length, 1.27);
        assert_eq!(pin.name, "~");
    }

    #[test]
    fn pin_lookup_by_name_and_number() {
        let content = r#"(symbol "U"
            (pin input line (at -5.08 0 0) (length 2.54)
              (name "CLK") (number "3")))"#;
        let lib = SymbolLibrary::parse(content).unwrap();
        let def = lib.get("U").unwrap();
        assert!(def.pin("CLK", false).is_some());
        assert!(def.pin("3", true).is_some());
        assert!(def.pin("CLK", true).is_none());
        assert!(def.pin("nope", false).is_none());
    }

    #[test]
    fn malformed_pin_declarations_are_skipped() {
        let content = r#"(symbol "U"
            (pin input line (at -5.08 0 0) (length 2.54)
              (name "GOOD") (number "1"))
            (pin input line (at -5.08 2.54 0)
              (name "NO_LENGTH") (number "2"))
            (pin input line (at -5.08 5.08 45) (length 2.54)
              (name "BAD_ANGLE") (number "3"))
            (pin sparkle line (at -5.08 7.62 0) (length 2.54)
              (name "BAD_KIND") (number "4")))"#;
        let lib = SymbolLibrary::parse(content).unwrap();
        let def = lib.get("U").unwrap();
        assert_eq!(def.pins.len(), 1);
        assert_eq!(def.pins[0].name, "GOOD");
    }

    #[test]
    fn redefinition_last_write_wins() {
        let content = r#"(lib
            (symbol "R" (pin passive line (at 0 0 0) (length 1.27)
              (name "old") (number "1")))
            (symbol "R" (pin passive line (at 0 0 0) (length 1.27)
              (name "new") (number "1"))))"#;
        let lib = SymbolLibrary::parse(content).unwrap();
        assert_eq!(lib.len(), 1);
        assert_eq!(lib.get("R").unwrap().pins[0].name, "new");
    }

    #[test]
    fn symbols_without_pins_are_not_registered() {
        let lib = SymbolLibrary::parse(r#"(symbol "Logo" (rectangle))"#).unwrap();
        assert!(lib.is_empty());
    }
}
