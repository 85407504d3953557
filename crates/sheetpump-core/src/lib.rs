pub mod binder;
pub mod cell;
pub mod drawing;
pub mod error;
pub mod format;
pub mod io;
pub mod range;
pub mod sheet;
pub mod workbook;

pub use binder::{AdvancedValueBinder, DefaultValueBinder, StringValueBinder, ValueBinder};
pub use cell::{Cell, CellContent, CellValue};
pub use drawing::{Chart, ChartKind, Drawing};
pub use error::{CellError, GridError};
pub use format::CellFormat;
pub use io::{
    create_reader, create_writer, CsvSettings, FileType, HtmlTableLoader, ReadFilter,
    ReaderOptions, SheetReader, SheetWriter, ViewLoader, WorksheetInfo,
};
pub use range::{col_from_label, col_to_label, column_range, CellCoord, CellRange};
pub use sheet::{parse_cell_input, Sheet};
pub use workbook::{Workbook, WorkbookMetadata};
