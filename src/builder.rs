//! Schematic construction with computed pin connectivity.
//!
//! [`SchematicBuilder`] accumulates placed symbols, wires, labels and
//! no-connect flags, and serializes them once at the end. Pin positions
//! are always derived through [`crate::grid::pin_absolute`], never
//! estimated, which is what keeps generated labels attached to their
//! pins.
//!
//! Unknown references, symbols and pins are authoring mistakes, not
//! process failures: the affected call logs a warning and does nothing.
//! The builder records a [`PinState`] per referenced pin so a session
//! can check that every pin it cares about reached a terminal state.

use std::collections::HashMap;
use std::fmt::{self, Display};

use log::warn;
use uuid::Uuid;

use crate::grid::{pin_absolute, snap, Rotation};
use crate::library::SymbolLibrary;

fn uid() -> String {
    Uuid::new_v4().to_string()
}

/// Connectivity disposition of one referenced pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinState {
    #[default]
    Unresolved,
    Wired,
    NoConnect,
    PowerFlagged,
}

impl PinState {
    pub fn is_terminal(self) -> bool {
        self != PinState::Unresolved
    }
}

/// Placement request for [`SchematicBuilder::place`].
#[derive(Debug, Clone)]
pub struct Placement {
    pub lib_id: String,
    pub reference: String,
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
    pub mirror_y: bool,
    pub footprint: String,
    pub lcsc: String,
    pub unit: u32,
}

impl Placement {
    pub fn new(lib_id: &str, reference: &str, value: &str, x: f64, y: f64) -> Self {
        Self {
            lib_id: lib_id.to_owned(),
            reference: reference.to_owned(),
            value: value.to_owned(),
            x,
            y,
            rotation: Rotation::R0,
            mirror_y: false,
            footprint: String::new(),
            lcsc: String::new(),
            unit: 1,
        }
    }

    pub fn rotated(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn mirrored(mut self) -> Self {
        self.mirror_y = true;
        self
    }

    pub fn footprint(mut self, footprint: &str) -> Self {
        self.footprint = footprint.to_owned();
        self
    }

    pub fn lcsc(mut self, lcsc: &str) -> Self {
        self.lcsc = lcsc.to_owned();
        self
    }

    pub fn unit(mut self, unit: u32) -> Self {
        self.unit = unit;
        self
    }
}

/// A symbol placed in the schematic, at grid-snapped coordinates.
#[derive(Debug, Clone)]
pub struct PlacedSymbol {
    pub lib_id: String,
    pub reference: String,
    pub value: String,
    pub x: f64,
    pub y: f64,
    pub rotation: Rotation,
    pub mirror_y: bool,
    pub footprint: String,
    pub lcsc: String,
    pub unit: u32,
    pub uuid: String,
    power: bool,
}

impl PlacedSymbol {
    fn to_sexpr(&self, project: &str, root_uuid: &str) -> String {
        let mirror = if self.mirror_y { " (mirror y)" } else { "" };
        let x = self.x;
        let y = self.y;
        let properties = if self.power {
            format!(
                "    (property \"Reference\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 1.27 1.27)) hide))\n    \
                 (property \"Value\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 0.8 0.8))))\n    \
                 (property \"Footprint\" \"\" (at {x:.2} {y:.2} 0)\n      \
                 (effects (font (size 1.27 1.27)) hide))",
                self.reference,
                y + 2.54,
                self.value,
                y + 3.81,
            )
        } else {
            format!(
                "    (property \"Reference\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 1.27 1.27))))\n    \
                 (property \"Value\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 1.0 1.0))))\n    \
                 (property \"Footprint\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 1.27 1.27)) hide))\n    \
                 (property \"LCSC\" \"{}\" (at {x:.2} {:.2} 0)\n      \
                 (effects (font (size 1.27 1.27)) hide))",
                self.reference,
                y - 3.81,
                self.value,
                y + 3.81,
                self.footprint,
                y + 5.08,
                self.lcsc,
                y + 6.35,
            )
        };
        format!(
            "  (symbol (lib_id \"{}\") (at {x:.2} {y:.2} {}){mirror}\n    \
             (uuid \"{}\")\n{properties}\n    \
             (instances\n      \
             (project \"{project}\"\n        \
             (path \"/{root_uuid}\"\n          \
             (reference \"{}\")\n          \
             (unit {})\n        )\n      )\n    )\n  )",
            self.lib_id,
            self.rotation.degrees(),
            self.uuid,
            self.reference,
            self.unit,
        )
    }
}

#[derive(Debug, Clone)]
struct Wire {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    uuid: String,
}

impl Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  (wire (pts (xy {:.2} {:.2}) (xy {:.2} {:.2}))\n    \
             (stroke (width 0) (type default))\n    (uuid \"{}\")\n  )",
            self.x1, self.y1, self.x2, self.y2, self.uuid
        )
    }
}

#[derive(Debug, Clone)]
struct Label {
    text: String,
    x: f64,
    y: f64,
    angle: Rotation,
    uuid: String,
}

impl Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  (label \"{}\" (at {:.2} {:.2} {})\n    \
             (effects (font (size 1.27 1.27)) (justify left))\n    (uuid \"{}\")\n  )",
            self.text,
            self.x,
            self.y,
            self.angle.degrees(),
            self.uuid
        )
    }
}

#[derive(Debug, Clone)]
struct NoConnect {
    x: f64,
    y: f64,
    uuid: String,
}

impl Display for NoConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  (no_connect (at {:.2} {:.2})\n    (uuid \"{}\")\n  )",
            self.x, self.y, self.uuid
        )
    }
}

#[derive(Debug, Clone)]
struct TextNote {
    text: String,
    x: f64,
    y: f64,
    size: f64,
    uuid: String,
}

impl Display for TextNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  (text \"{}\" (at {:.2} {:.2} 0)\n    \
             (effects (font (size {} {})) (justify left))\n    (uuid \"{}\")\n  )",
            self.text, self.x, self.y, self.size, self.size, self.uuid
        )
    }
}

/// Sheet metadata for [`SchematicBuilder::build`].
#[derive(Debug, Clone)]
pub struct SheetMeta {
    pub title: String,
    pub date: String,
    pub rev: String,
    pub paper: String,
    pub comments: Vec<String>,
}

impl Default for SheetMeta {
    fn default() -> Self {
        Self {
            title: "Schematic".to_owned(),
            date: String::new(),
            rev: "1.0".to_owned(),
            paper: "A1".to_owned(),
            comments: Vec::new(),
        }
    }
}

pub struct SchematicBuilder {
    library: SymbolLibrary,
    project_name: String,
    root_uuid: String,
    symbols: Vec<PlacedSymbol>,
    placed: HashMap<String, usize>,
    wires: Vec<Wire>,
    labels: Vec<Label>,
    no_connects: Vec<NoConnect>,
    text_notes: Vec<TextNote>,
    pin_states: HashMap<(String, String), PinState>,
    pwr_counter: u32,
    lib_symbols: String,
}

impl SchematicBuilder {
    pub fn new(library: SymbolLibrary, project_name: &str) -> Self {
        Self {
            library,
            project_name: project_name.to_owned(),
            root_uuid: uid(),
            symbols: Vec::new(),
            placed: HashMap::new(),
            wires: Vec::new(),
            labels: Vec::new(),
            no_connects: Vec::new(),
            text_notes: Vec::new(),
            pin_states: HashMap::new(),
            pwr_counter: 0,
            lib_symbols: String::new(),
        }
    }

    /// Raw `lib_symbols` content to embed in the generated sheet.
    pub fn set_lib_symbols(&mut self, content: &str) {
        self.lib_symbols = content.to_owned();
    }

    /// Place a symbol at grid-snapped coordinates. Re-placing an already
    /// used reference replaces the earlier symbol.
    pub fn place(&mut self, placement: Placement) -> &PlacedSymbol {
        let Placement {
            lib_id,
            reference,
            value,
            x,
            y,
            rotation,
            mirror_y,
            footprint,
            lcsc,
            unit,
        } = placement;
        let symbol = PlacedSymbol {
            lib_id,
            reference: reference.clone(),
            value,
            x: snap(x),
            y: snap(y),
            rotation,
            mirror_y,
            footprint,
            lcsc,
            unit,
            uuid: uid(),
            power: false,
        };
        self.insert(reference, symbol)
    }

    /// Place a power symbol (GND, VCC, ...). The reference is generated
    /// from a counter owned by this builder, so parallel sessions never
    /// interfere.
    pub fn place_power(&mut self, lib_id: &str, value: &str, x: f64, y: f64, rotation: Rotation) -> String {
        self.pwr_counter += 1;
        let reference = format!("#PWR{:03}", self.pwr_counter);
        let symbol = PlacedSymbol {
            lib_id: lib_id.to_owned(),
            reference: reference.clone(),
            value: value.to_owned(),
            x: snap(x),
            y: snap(y),
            rotation,
            mirror_y: false,
            footprint: String::new(),
            lcsc: String::new(),
            unit: 1,
            uuid: uid(),
            power: true,
        };
        self.insert(reference.clone(), symbol);
        reference
    }

    fn insert(&mut self, reference: String, symbol: PlacedSymbol) -> &PlacedSymbol {
        match self.placed.get(&reference) {
            Some(&idx) => {
                self.symbols[idx] = symbol;
                &self.symbols[idx]
            }
            None => {
                self.placed.insert(reference, self.symbols.len());
                self.symbols.push(symbol);
                self.symbols.last().expect("just pushed")
            }
        }
    }

    /// Wire a pin to a net label, with an optional wire stub of
    /// `(wire_dx, wire_dy)` for routing space. The label lands on the
    /// free wire end, or directly on the pin when the stub is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn connect_pin(
        &mut self,
        reference: &str,
        pin: &str,
        net_label: &str,
        wire_dx: f64,
        wire_dy: f64,
        label_angle: Rotation,
        by_number: bool,
    ) {
        let Some((ax, ay, number)) = self.resolve_pin(reference, pin, by_number) else {
            return;
        };
        let (end_x, end_y) = (snap(ax + wire_dx), snap(ay + wire_dy));
        if wire_dx != 0.0 || wire_dy != 0.0 {
            self.wire(ax, ay, end_x, end_y);
            self.label(net_label, end_x, end_y, label_angle);
        } else {
            self.label(net_label, ax, ay, label_angle);
        }
        self.mark(reference, number, PinState::Wired);
    }

    /// Place a no-connect flag on a pin.
    pub fn no_connect_pin(&mut self, reference: &str, pin: &str, by_number: bool) {
        let Some((ax, ay, number)) = self.resolve_pin(reference, pin, by_number) else {
            return;
        };
        self.no_connect(ax, ay);
        self.mark(reference, number, PinState::NoConnect);
    }

    /// Attach a power symbol directly to a pin.
    pub fn connect_power(
        &mut self,
        reference: &str,
        pin: &str,
        power_lib_id: &str,
        value: &str,
        rotation: Rotation,
        by_number: bool,
    ) -> Option<String> {
        let (ax, ay, number) = self.resolve_pin(reference, pin, by_number)?;
        let pwr_ref = self.place_power(power_lib_id, value, ax, ay, rotation);
        self.mark(reference, number, PinState::PowerFlagged);
        Some(pwr_ref)
    }

    fn resolve_pin(&self, reference: &str, pin: &str, by_number: bool) -> Option<(f64, f64, String)> {
        let Some(&idx) = self.placed.get(reference) else {
            warn!("component {reference} not found");
            return None;
        };
        let symbol = &self.symbols[idx];
        let Some(def) = self.library.get(&symbol.lib_id) else {
            warn!("symbol {} not in library", symbol.lib_id);
            return None;
        };
        let Some(pin_def) = def.pin(pin, by_number) else {
            warn!("pin '{pin}' not found on {}", symbol.lib_id);
            return None;
        };
        let (ax, ay) = pin_absolute(
            symbol.x,
            symbol.y,
            pin_def.x,
            pin_def.y,
            symbol.rotation,
            symbol.mirror_y,
        );
        Some((ax, ay, pin_def.number.clone()))
    }

    fn mark(&mut self, reference: &str, number: String, state: PinState) {
        self.pin_states
            .insert((reference.to_owned(), number), state);
    }

    /// Connectivity state of a pin, addressed by pad number.
    pub fn pin_state(&self, reference: &str, number: &str) -> PinState {
        self.pin_states
            .get(&(reference.to_owned(), number.to_owned()))
            .copied()
            .unwrap_or_default()
    }

    /// Pins of placed symbols that never reached a terminal state.
    /// Power symbols whose lib_id is absent from the library are skipped.
    pub fn dangling_pins(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for symbol in &self.symbols {
            let Some(def) = self.library.get(&symbol.lib_id) else {
                continue;
            };
            for pin in &def.pins {
                if !self.pin_state(&symbol.reference, &pin.number).is_terminal() {
                    out.push((symbol.reference.clone(), pin.number.clone()));
                }
            }
        }
        out
    }

    /// Draw a wire between two points, both snapped.
    pub fn wire(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        self.wires.push(Wire {
            x1: snap(x1),
            y1: snap(y1),
            x2: snap(x2),
            y2: snap(y2),
            uuid: uid(),
        });
    }

    /// Place a net label.
    pub fn label(&mut self, text: &str, x: f64, y: f64, angle: Rotation) {
        self.labels.push(Label {
            text: text.to_owned(),
            x: snap(x),
            y: snap(y),
            angle,
            uuid: uid(),
        });
    }

    /// Place a no-connect flag.
    pub fn no_connect(&mut self, x: f64, y: f64) {
        self.no_connects.push(NoConnect {
            x: snap(x),
            y: snap(y),
            uuid: uid(),
        });
    }

    /// Add a free text annotation. Not snapped to pin grid rules beyond
    /// position snapping; purely decorative.
    pub fn text_note(&mut self, text: &str, x: f64, y: f64, size: f64) {
        self.text_notes.push(TextNote {
            text: text.to_owned(),
            x: snap(x),
            y: snap(y),
            size,
            uuid: uid(),
        });
    }

    /// Serialize the accumulated session to `.kicad_sch` text. Sections
    /// come out in fixed order: symbols, wires, labels, no-connects,
    /// text notes.
    pub fn build(&self, meta: &SheetMeta) -> String {
        let mut comment_lines = String::new();
        for (i, c) in meta.comments.iter().enumerate() {
            comment_lines.push_str(&format!("    (comment {} \"{}\")\n", i + 1, c));
        }

        let mut items = Vec::new();
        for symbol in &self.symbols {
            items.push(symbol.to_sexpr(&self.project_name, &self.root_uuid));
        }
        items.extend(self.wires.iter().map(Wire::to_string));
        items.extend(self.labels.iter().map(Label::to_string));
        items.extend(self.no_connects.iter().map(NoConnect::to_string));
        items.extend(self.text_notes.iter().map(TextNote::to_string));

        format!(
            "(kicad_sch\n  \
             (version 20231120)\n  \
             (generator \"kicad_sch_builder\")\n  \
             (generator_version \"8.0\")\n  \
             (uuid \"{}\")\n  \
             (paper \"{}\")\n  \
             (title_block\n    \
             (title \"{}\")\n    \
             (date \"{}\")\n    \
             (rev \"{}\")\n{}  )\n\n  \
             (lib_symbols\n{}\n  )\n\n{}\n\n  \
             (sheet_instances\n    (path \"/\"\n      (page \"1\")\n    )\n  )\n)\n",
            self.root_uuid,
            meta.paper,
            meta.title,
            meta.date,
            meta.rev,
            comment_lines,
            self.lib_symbols,
            items.join("\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = r#"(kicad_symbol_lib
  (symbol "Device:R"
    (symbol "R_1_1"
      (pin passive line (at 0 3.81 270) (length 1.27)
        (name "~") (number "1"))
      (pin passive line (at 0 -3.81 90) (length 1.27)
        (name "~") (number "2"))
    )
  )
)"#;

    fn builder() -> SchematicBuilder {
        let lib = SymbolLibrary::parse(LIB).unwrap();
        SchematicBuilder::new(lib, "demo")
    }

    #[test]
    fn every_referenced_pin_reaches_a_terminal_state() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        b.connect_pin("R1", "1", "VCC", 0.0, -3.81, Rotation::R0, true);
        b.no_connect_pin("R1", "2", true);

        assert_eq!(b.pin_state("R1", "1"), PinState::Wired);
        assert_eq!(b.pin_state("R1", "2"), PinState::NoConnect);
        assert!(b.pin_state("R1", "1").is_terminal());
        assert!(b.dangling_pins().is_empty());
    }

    #[test]
    fn unreferenced_pins_stay_unresolved() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        b.connect_pin("R1", "1", "VCC", 0.0, 0.0, Rotation::R0, true);

        assert_eq!(b.pin_state("R1", "2"), PinState::Unresolved);
        assert_eq!(b.dangling_pins(), vec![("R1".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn connect_pin_computes_the_wire_from_the_pin() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        // Pin 1 at library (0, 3.81) maps to (101.6, 97.79) at rotation 0.
        b.connect_pin("R1", "1", "VCC", 0.0, -3.81, Rotation::R0, true);

        let sch = b.build(&SheetMeta::default());
        assert!(sch.contains("(wire (pts (xy 101.60 97.79) (xy 101.60 93.98))"));
        assert!(sch.contains("(label \"VCC\" (at 101.60 93.98 0)"));
    }

    #[test]
    fn connect_pin_without_stub_labels_the_pin_itself() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        b.connect_pin("R1", "2", "GND", 0.0, 0.0, Rotation::R0, true);

        let sch = b.build(&SheetMeta::default());
        assert!(!sch.contains("(wire"));
        assert!(sch.contains("(label \"GND\" (at 101.60 105.41 0)"));
    }

    #[test]
    fn rotated_placement_moves_the_pins() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6).rotated(Rotation::R90));
        // Rotation 90: library (0, 3.81) -> offset (3.81, 0).
        b.connect_pin("R1", "1", "OUT", 0.0, 0.0, Rotation::R0, true);

        let sch = b.build(&SheetMeta::default());
        assert!(sch.contains("(label \"OUT\" (at 105.41 101.60 0)"));
    }

    #[test]
    fn lookup_misses_are_no_ops() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        b.connect_pin("R99", "1", "VCC", 0.0, 0.0, Rotation::R0, true);
        b.connect_pin("R1", "7", "VCC", 0.0, 0.0, Rotation::R0, true);
        b.place(Placement::new("Device:Unknown", "U1", "?", 0.0, 0.0));
        b.connect_pin("U1", "1", "VCC", 0.0, 0.0, Rotation::R0, true);

        let sch = b.build(&SheetMeta::default());
        assert!(!sch.contains("(label"));
        assert_eq!(b.pin_state("R1", "7"), PinState::Unresolved);
    }

    #[test]
    fn replacing_a_reference_keeps_one_symbol() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        b.place(Placement::new("Device:R", "R1", "22k", 120.65, 101.6));

        let sch = b.build(&SheetMeta::default());
        assert_eq!(sch.matches("(lib_id \"Device:R\")").count(), 1);
        assert!(sch.contains("\"22k\""));
        assert!(!sch.contains("\"10k\""));
    }

    #[test]
    fn power_references_come_from_the_builder_counter() {
        let mut b = builder();
        let r1 = b.place_power("power:GND", "GND", 50.0, 50.0, Rotation::R0);
        let r2 = b.place_power("power:+3V3", "+3V3", 60.0, 50.0, Rotation::R0);
        assert_eq!(r1, "#PWR001");
        assert_eq!(r2, "#PWR002");

        let mut other = builder();
        assert_eq!(
            other.place_power("power:GND", "GND", 0.0, 0.0, Rotation::R0),
            "#PWR001"
        );
    }

    #[test]
    fn connect_power_flags_the_pin() {
        let mut b = builder();
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));
        let pwr = b.connect_power("R1", "2", "power:GND", "GND", Rotation::R0, true);
        assert_eq!(pwr.as_deref(), Some("#PWR001"));
        assert_eq!(b.pin_state("R1", "2"), PinState::PowerFlagged);

        let sch = b.build(&SheetMeta::default());
        assert!(sch.contains("(lib_id \"power:GND\") (at 101.60 105.41 0)"));
    }

    #[test]
    fn build_emits_sections_in_fixed_order() {
        let mut b = builder();
        b.text_note("note", 10.0, 10.0, 2.54);
        b.no_connect(20.0, 20.0);
        b.label("NET", 30.0, 30.0, Rotation::R0);
        b.wire(0.0, 0.0, 1.27, 0.0);
        b.place(Placement::new("Device:R", "R1", "10k", 101.6, 101.6));

        let sch = b.build(&SheetMeta::default());
        let sym = sch.find("(symbol (lib_id").unwrap();
        let wire = sch.find("(wire").unwrap();
        let label = sch.find("(label").unwrap();
        let nc = sch.find("(no_connect").unwrap();
        let text = sch.find("(text \"note\"").unwrap();
        assert!(sym < wire && wire < label && label < nc && nc < text);
    }

    #[test]
    fn build_carries_sheet_metadata() {
        let b = builder();
        let meta = SheetMeta {
            title: "Power".to_owned(),
            date: "2026-08-30".to_owned(),
            rev: "B".to_owned(),
            paper: "A4".to_owned(),
            comments: vec!["first".to_owned(), "second".to_owned()],
        };
        let sch = b.build(&meta);
        assert!(sch.contains("(title \"Power\")"));
        assert!(sch.contains("(paper \"A4\")"));
        assert!(sch.contains("(comment 1 \"first\")"));
        assert!(sch.contains("(comment 2 \"second\")"));
    }

    #[test]
    fn mirrored_symbol_mirrors_its_pins() {
        let lib = SymbolLibrary::parse(
            r#"(symbol "U" (pin input line (at -5.08 0 0) (length 2.54)
                (name "IN") (number "1")))"#,
        )
        .unwrap();
        let mut b = SchematicBuilder::new(lib, "demo");
        b.place(Placement::new("U", "U1", "U", 101.6, 101.6).mirrored());
        b.connect_pin("U1", "IN", "SIG", 0.0, 0.0, Rotation::R0, false);

        let sch = b.build(&SheetMeta::default());
        // mirror_y negates library x: -(-5.08) = +5.08.
        assert!(sch.contains("(label \"SIG\" (at 106.68 101.60 0)"));
        assert!(sch.contains("(mirror y)"));
    }
}
