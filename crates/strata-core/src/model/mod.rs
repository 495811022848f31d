//! Column, index and table model.

mod column;
mod index;
mod table;

pub use column::{normalize_type, ColumnChange, ColumnDef};
pub use index::{renamed_object_name, IndexDef, IndexSelector};
pub use table::{
    is_reserved_column, open_interval_index, timeline_index, LogicalTable, Layer, StructuralChange, TableChange, TableDefinition,
    TableKind, HISTORY_COLUMNS, HISTORY_ID, RECORDED_AT, VALID_FROM, VALID_TO,
};

pub(crate) use table::reserved_column_error;
