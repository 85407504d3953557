//! Lifecycle events.
//!
//! An [`EventBus`] is a plain value: the engine owns one with its global
//! listeners, and every operation derives its own copy that also carries the
//! processor's listeners. Listeners run in registration order and a failing
//! listener aborts the operation.

use std::fmt;
use std::sync::Arc;

use sheetpump_core::{Sheet, Workbook};

use crate::concerns::{Concern, ConcernSet, Concerns, ProcessorResult};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BeforeExport,
    BeforeWriting,
    BeforeSheet,
    AfterSheet,
    BeforeImport,
    AfterImport,
    ImportFailed,
}

/// Payload handed to listeners
pub enum Event<'a> {
    BeforeExport { concerns: ConcernSet },
    BeforeWriting { workbook: &'a mut Workbook, concerns: ConcernSet },
    BeforeSheet { sheet: &'a mut Sheet, concerns: ConcernSet },
    AfterSheet { sheet: &'a mut Sheet, concerns: ConcernSet },
    BeforeImport { concerns: ConcernSet },
    AfterImport { concerns: ConcernSet },
    ImportFailed { error: &'a Error },
}

impl Event<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::BeforeExport { .. } => EventKind::BeforeExport,
            Event::BeforeWriting { .. } => EventKind::BeforeWriting,
            Event::BeforeSheet { .. } => EventKind::BeforeSheet,
            Event::AfterSheet { .. } => EventKind::AfterSheet,
            Event::BeforeImport { .. } => EventKind::BeforeImport,
            Event::AfterImport { .. } => EventKind::AfterImport,
            Event::ImportFailed { .. } => EventKind::ImportFailed,
        }
    }

    /// Capabilities of the processor the event was raised for
    pub fn concerns(&self) -> ConcernSet {
        match self {
            Event::BeforeExport { concerns }
            | Event::BeforeWriting { concerns, .. }
            | Event::BeforeSheet { concerns, .. }
            | Event::AfterSheet { concerns, .. }
            | Event::BeforeImport { concerns }
            | Event::AfterImport { concerns } => *concerns,
            Event::ImportFailed { .. } => ConcernSet::empty(),
        }
    }

    pub fn applies_to(&self, concern: Concern) -> bool {
        self.concerns().contains(concern)
    }

    /// The sheet for sheet-level events
    pub fn sheet(&mut self) -> Option<&mut Sheet> {
        match self {
            Event::BeforeSheet { sheet, .. } | Event::AfterSheet { sheet, .. } => Some(&mut **sheet),
            _ => None,
        }
    }

    pub fn workbook(&mut self) -> Option<&mut Workbook> {
        match self {
            Event::BeforeWriting { workbook, .. } => Some(&mut **workbook),
            _ => None,
        }
    }
}

pub type Listener = Arc<dyn Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Vec<(EventKind, Listener)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen<F>(&mut self, kind: EventKind, f: F)
    where
        F: Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync + 'static,
    {
        self.listeners.push((kind, Arc::new(f)));
    }

    pub fn register(&mut self, listeners: impl IntoIterator<Item = (EventKind, Listener)>) {
        self.listeners.extend(listeners);
    }

    /// Run `handler` on `kind` events, only for processors declaring `concern`
    pub fn extend<F>(&mut self, concern: Concern, kind: EventKind, handler: F)
    where
        F: Fn(&mut Event<'_>) -> ProcessorResult<()> + Send + Sync + 'static,
    {
        self.listen(kind, move |event| {
            if event.applies_to(concern) {
                handler(event)
            } else {
                Ok(())
            }
        });
    }

    /// Copy of this bus plus the listeners the processor registers
    pub fn for_processor(&self, concerns: &Concerns<'_>) -> EventBus {
        let mut bus = self.clone();
        if let Some(events) = concerns.with_events {
            bus.register(events.register_events());
        }
        bus
    }

    pub fn raise(&self, event: &mut Event<'_>) -> Result<()> {
        let kind = event.kind();
        for (_, listener) in self.listeners.iter().filter(|(k, _)| *k == kind) {
            listener(&mut *event).map_err(Error::Processor)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
