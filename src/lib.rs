//! Generate and patch KiCad 8 schematic files (`.kicad_sch`) with
//! computed pin connectivity.
//!
//! Symbol libraries use Y-up coordinates while schematics use Y-down;
//! labels and wires placed from guessed pin positions are the main
//! source of ERC errors in generated schematics. This crate derives
//! every pin position from the symbol definition through one
//! rotation/mirror transform ([`grid::pin_absolute`]) and snaps every
//! emitted coordinate to the schematic grid.
//!
//! The schematic text is treated as an editable structure without an
//! AST: [`scan::find_block`] finds balanced S-expression spans (quote
//! aware), [`library::SymbolLibrary`] recovers pin definitions from
//! symbol blocks, and [`edit`] performs whitespace-correct block removal
//! and reference rewrites that leave every other byte untouched.

pub mod builder;
pub mod edit;
pub mod erc;
pub mod error;
pub mod grid;
pub mod library;
mod scan;

pub use builder::{PinState, PlacedSymbol, Placement, SchematicBuilder, SheetMeta};
pub use edit::{fix_subsymbol_names, remove_by_key, renumber_missing_suffix, replace_reference};
pub use erc::{run_erc, ErcSummary, Severity, Violation};
pub use error::{GridError, StructureError};
pub use grid::{pin_absolute, pin_transform, snap, Rotation, GRID};
pub use library::{PinDef, PinKind, SymbolDef, SymbolLibrary};
pub use scan::find_block;
