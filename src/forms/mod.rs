//! Interactive form engine: discovery, naming and filling.

pub mod discover;
pub mod field;
pub mod fill;
pub mod naming;
pub mod text;

pub use discover::FieldDiscoverer;
pub use field::{
    DiscoveryReport, FieldFlags, FieldGroup, FieldKind, FieldTable, FieldValue, FieldWidget, GroupOption, IndependentField,
    KindCounts, LogicalField, SkippedWidget,
};
pub use fill::{FillReport, FillRequest, FillValue, FillWarning, Filler};
pub use naming::{MappingEntry, NameMapping, NameMappingBuilder, RenameReport, RenamedField, TemplateCheck};
