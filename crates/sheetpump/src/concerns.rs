//! Capability contracts a processor can opt into.
//!
//! A processor is any type implementing [`Processor`]. It declares what it
//! supports by returning a [`Concerns`] descriptor that records, for every
//! capability, both a flag in a [`ConcernSet`] and a reference to the trait
//! object implementing it. The engine only ever asks the descriptor; it never
//! probes the processor's concrete type.
//!
//! ```ignore
//! impl Processor for UsersExport {
//!     fn concerns(&self) -> Concerns<'_> {
//!         Concerns::new().with_headings(self).from_collection(self)
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use sheetpump_core::{Chart, CsvSettings, Drawing, ValueBinder};

use crate::error::{Error, Result};
use crate::events::{EventKind, Listener};
use crate::row::Row;

/// Application-side representation of one row or one record
pub type Record = serde_json::Value;

/// Result type returned by processor callbacks
pub type ProcessorResult<T> = anyhow::Result<T>;

/// Every capability a processor may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concern {
    FromView,
    FromQuery,
    FromCollection,
    FromArray,
    FromIterator,
    WithTitle,
    WithHeadings,
    WithCustomStartCell,
    WithStrictNullComparison,
    WithCharts,
    WithDrawings,
    WithColumnFormatting,
    ShouldAutoSize,
    WithMapping,
    WithCustomChunkSize,
    WithCustomValueBinder,
    WithMultipleSheets,
    WithCustomCsvSettings,
    ToArray,
    ToCollection,
    ToModel,
    WithBatchInserts,
    OnEachRow,
    WithMappedCells,
    WithHeadingRow,
    WithStartRow,
    WithLimit,
    WithChunkReading,
    WithCalculatedFormulas,
    WithFormatData,
    WithProgressBar,
    WithEvents,
    HandlesFailures,
}

impl Concern {
    pub const ALL: [Concern; 33] = [
        Concern::FromView,
        Concern::FromQuery,
        Concern::FromCollection,
        Concern::FromArray,
        Concern::FromIterator,
        Concern::WithTitle,
        Concern::WithHeadings,
        Concern::WithCustomStartCell,
        Concern::WithStrictNullComparison,
        Concern::WithCharts,
        Concern::WithDrawings,
        Concern::WithColumnFormatting,
        Concern::ShouldAutoSize,
        Concern::WithMapping,
        Concern::WithCustomChunkSize,
        Concern::WithCustomValueBinder,
        Concern::WithMultipleSheets,
        Concern::WithCustomCsvSettings,
        Concern::ToArray,
        Concern::ToCollection,
        Concern::ToModel,
        Concern::WithBatchInserts,
        Concern::OnEachRow,
        Concern::WithMappedCells,
        Concern::WithHeadingRow,
        Concern::WithStartRow,
        Concern::WithLimit,
        Concern::WithChunkReading,
        Concern::WithCalculatedFormulas,
        Concern::WithFormatData,
        Concern::WithProgressBar,
        Concern::WithEvents,
        Concern::HandlesFailures,
    ];

    const fn bit(self) -> u64 {
        1 << self as u64
    }
}

impl fmt::Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Export sources in dispatch priority order; only the first declared one runs
pub const POPULATE_ORDER: [Concern; 5] = [
    Concern::FromView,
    Concern::FromQuery,
    Concern::FromCollection,
    Concern::FromArray,
    Concern::FromIterator,
];

/// Set of declared capabilities
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConcernSet(u64);

impl ConcernSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, concern: Concern) {
        self.0 |= concern.bit();
    }

    pub fn with(mut self, concern: Concern) -> Self {
        self.insert(concern);
        self
    }

    pub fn contains(&self, concern: Concern) -> bool {
        self.0 & concern.bit() != 0
    }

    pub fn contains_any(&self, concerns: &[Concern]) -> bool {
        concerns.iter().any(|c| self.contains(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Concern> + '_ {
        let set = *self;
        Concern::ALL.into_iter().filter(move |c| set.contains(*c))
    }
}

impl std::iter::FromIterator<Concern> for ConcernSet {
    fn from_iter<I: IntoIterator<Item = Concern>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl fmt::Debug for ConcernSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Selects a sheet of a workbook being imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(index) => write!(f, "#{}", index),
            SheetSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

// Export sources

pub trait FromView: Send + Sync {
    /// Rendered HTML containing a table
    fn view(&self) -> ProcessorResult<String>;
}

pub trait FromQuery: Send + Sync {
    /// One page of records; a short or empty page ends the query
    fn query(&self, offset: usize, limit: usize) -> ProcessorResult<Vec<Record>>;
}

pub trait FromCollection: Send + Sync {
    fn collection(&self) -> ProcessorResult<Vec<Record>>;
}

pub trait FromArray: Send + Sync {
    fn array(&self) -> ProcessorResult<Vec<Record>>;
}

pub trait FromIterator: Send + Sync {
    fn iterator(&self) -> ProcessorResult<Box<dyn Iterator<Item = Record> + '_>>;
}

// Export decoration

pub trait WithTitle: Send + Sync {
    fn title(&self) -> String;
}

pub trait WithHeadings: Send + Sync {
    /// A single row, or an array of rows for multi-line headings
    fn headings(&self) -> Record;
}

pub trait WithCustomStartCell: Send + Sync {
    fn start_cell(&self) -> String;
}

pub trait WithCharts: Send + Sync {
    fn charts(&self) -> Vec<Chart>;
}

pub trait WithDrawings: Send + Sync {
    fn drawings(&self) -> Vec<Drawing>;
}

pub trait WithColumnFormatting: Send + Sync {
    /// (column label, number format code)
    fn column_formats(&self) -> Vec<(String, String)>;
}

/// Transforms each source record on export and each row record on import
pub trait WithMapping: Send + Sync {
    fn map(&self, record: Record) -> ProcessorResult<Record>;
}

pub trait WithCustomChunkSize: Send + Sync {
    /// Page size for query sources
    fn page_size(&self) -> usize;
}

pub trait WithCustomValueBinder: Send + Sync {
    fn value_binder(&self) -> Arc<dyn ValueBinder>;
}

pub trait WithMultipleSheets: Send + Sync {
    /// Export ignores the selectors and writes one sheet per entry, in order
    fn sheets(&self) -> Vec<(SheetSelector, Arc<dyn Processor>)>;
}

pub trait WithCustomCsvSettings: Send + Sync {
    fn csv_settings(&self, base: CsvSettings) -> CsvSettings;
}

// Import sinks

pub trait ToArray: Send + Sync {
    /// Keyed records when a heading row exists, plain lists otherwise
    fn to_array(&self, rows: Vec<Record>) -> ProcessorResult<()>;
}

pub trait ToCollection: Send + Sync {
    /// Always keyed; rows without headings use positional keys
    fn to_collection(&self, rows: Vec<Record>) -> ProcessorResult<()>;
}

pub trait ToModel: Send + Sync {
    /// Record to persist for this row, if any
    fn model(&self, row: &Record) -> ProcessorResult<Option<Record>>;
}

pub trait WithBatchInserts: Send + Sync {
    fn batch_size(&self) -> usize;
}

pub trait OnEachRow: Send + Sync {
    fn on_row(&self, row: &Row) -> ProcessorResult<()>;
}

pub trait WithMappedCells: Send + Sync {
    /// (record key, A1 coordinate)
    fn mapping(&self) -> Vec<(String, String)>;
}

// Import shaping

pub trait WithHeadingRow: Send + Sync {
    fn heading_row(&self) -> u32 {
        1
    }
}

pub trait WithStartRow: Send + Sync {
    fn start_row(&self) -> u32;
}

pub trait WithLimit: Send + Sync {
    fn limit(&self) -> u32;
}

pub trait WithChunkReading: Send + Sync {
    fn chunk_size(&self) -> usize;
}

/// Progress reporting, one advance per row
pub trait WithProgressBar: Send + Sync {
    fn progress_start(&self, _total: u32) {}
    fn progress_advance(&self, step: u32);
    fn progress_finish(&self) {}
}

// Lifecycle

pub trait WithEvents: Send + Sync {
    fn register_events(&self) -> Vec<(EventKind, Listener)>;
}

pub trait HandlesFailures: Send + Sync {
    fn failed(&self, error: &Error);
}

/// A user-supplied import or export definition
pub trait Processor: Send + Sync {
    fn concerns(&self) -> Concerns<'_>;
}

macro_rules! concerns {
    ($($field:ident: $concern:ident),* $(,)?) => {
        /// Capability descriptor built by [`Processor::concerns`]
        #[derive(Clone, Copy, Default)]
        pub struct Concerns<'a> {
            set: ConcernSet,
            $(pub(crate) $field: Option<&'a dyn $concern>,)*
        }

        impl<'a> Concerns<'a> {
            $(
                pub fn $field(mut self, capability: &'a dyn $concern) -> Self {
                    self.set.insert(Concern::$concern);
                    self.$field = Some(capability);
                    self
                }
            )*
        }
    };
}

concerns! {
    from_view: FromView,
    from_query: FromQuery,
    from_collection: FromCollection,
    from_array: FromArray,
    from_iterator: FromIterator,
    with_title: WithTitle,
    with_headings: WithHeadings,
    with_custom_start_cell: WithCustomStartCell,
    with_charts: WithCharts,
    with_drawings: WithDrawings,
    with_column_formatting: WithColumnFormatting,
    with_mapping: WithMapping,
    with_custom_chunk_size: WithCustomChunkSize,
    with_custom_value_binder: WithCustomValueBinder,
    with_multiple_sheets: WithMultipleSheets,
    with_custom_csv_settings: WithCustomCsvSettings,
    to_array: ToArray,
    to_collection: ToCollection,
    to_model: ToModel,
    with_batch_inserts: WithBatchInserts,
    on_each_row: OnEachRow,
    with_mapped_cells: WithMappedCells,
    with_heading_row: WithHeadingRow,
    with_start_row: WithStartRow,
    with_limit: WithLimit,
    with_chunk_reading: WithChunkReading,
    with_progress_bar: WithProgressBar,
    with_events: WithEvents,
    handles_failures: HandlesFailures,
}

const MARKERS: [Concern; 4] = [
    Concern::WithStrictNullComparison,
    Concern::ShouldAutoSize,
    Concern::WithCalculatedFormulas,
    Concern::WithFormatData,
];

impl<'a> Concerns<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a marker capability that has no operations.
    ///
    /// Capabilities with operations must be declared through their own
    /// builder method. Passing one here is a bug: it is logged and not
    /// recorded, and debug builds panic.
    pub fn mark(mut self, concern: Concern) -> Self {
        if MARKERS.contains(&concern) {
            self.set.insert(concern);
        } else {
            tracing::warn!(concern = ?concern, "mark() ignores capabilities with operations");
            debug_assert!(false, "{:?} is not a marker capability", concern);
        }
        self
    }

    pub fn set(&self) -> ConcernSet {
        self.set
    }

    pub fn has(&self, concern: Concern) -> bool {
        self.set.contains(concern)
    }

    /// The source export dispatches to, first match in [`POPULATE_ORDER`]
    pub fn populate_source(&self) -> Option<Concern> {
        POPULATE_ORDER.into_iter().find(|c| self.has(*c))
    }

    pub fn validate_export(&self) -> Result<()> {
        if self.has(Concern::FromView)
            && self.set.contains_any(&[
                Concern::FromQuery,
                Concern::FromCollection,
                Concern::FromArray,
            ])
        {
            return Err(Error::ConfigurationConflict(
                "cannot use FromQuery, FromArray or FromCollection together with FromView"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_import(&self) -> Result<()> {
        if let Some(chunked) = self.with_chunk_reading {
            if chunked.chunk_size() == 0 {
                return Err(Error::ConfigurationConflict(
                    "WithChunkReading requires a chunk size of at least 1".to_string(),
                ));
            }
        }
        if let Some(batched) = self.with_batch_inserts {
            if batched.batch_size() == 0 {
                return Err(Error::ConfigurationConflict(
                    "WithBatchInserts requires a batch size of at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Concerns<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Concerns").field(&self.set).finish()
    }
}
