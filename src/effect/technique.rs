//! Techniques and their per-context validity.
//!
//! Whether a technique can be used on a graphics context is decided once per
//! context by a capability probe that has to run on that context's thread.
//! The state lives in one atomic per context and moves
//! `Unknown → QueryInProgress → {Valid, Invalid}` through compare-and-swap, so
//! the render thread never blocks on it. Losing a race just means another
//! thread already moved the state; the loser reports what it finds.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
};

use crate::{
    data_structures::property_root::PropertyRoot,
    effect::{
        expression::{EvalContext, Expr},
        pass::Pass,
    },
    resources::backend::{Capabilities, ContextId},
};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Validity {
    Unknown = 0,
    QueryInProgress = 1,
    Invalid = 2,
    Valid = 3,
}

impl Validity {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Validity::QueryInProgress,
            2 => Validity::Invalid,
            3 => Validity::Valid,
            _ => Validity::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Validity::Valid | Validity::Invalid)
    }
}

/// One validity slot per graphics context.
#[derive(Debug)]
pub struct ContextValidity {
    states: Box<[AtomicU8]>,
    probes_scheduled: AtomicUsize,
}

impl ContextValidity {
    pub fn new(max_contexts: usize) -> Self {
        Self {
            states: (0..max_contexts.max(1))
                .map(|_| AtomicU8::new(Validity::Unknown as u8))
                .collect(),
            probes_scheduled: AtomicUsize::new(0),
        }
    }

    pub fn probes_scheduled(&self) -> usize {
        self.probes_scheduled.load(Ordering::Acquire)
    }

    pub fn get(&self, context: ContextId) -> Validity {
        match self.states.get(context) {
            Some(slot) => Validity::from_u8(slot.load(Ordering::Acquire)),
            None => Validity::Invalid,
        }
    }

    /// `Unknown → QueryInProgress`. On failure returns the state found.
    pub fn begin_query(&self, context: ContextId) -> Result<(), Validity> {
        let Some(slot) = self.states.get(context) else {
            return Err(Validity::Invalid);
        };
        slot.compare_exchange(
            Validity::Unknown as u8,
            Validity::QueryInProgress as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .map(|_| ())
        .map_err(Validity::from_u8)
    }

    /// `QueryInProgress → Valid | Invalid`. Returns the state now in effect.
    pub fn resolve(&self, context: ContextId, valid: bool) -> Validity {
        let Some(slot) = self.states.get(context) else {
            return Validity::Invalid;
        };
        let target = if valid {
            Validity::Valid
        } else {
            Validity::Invalid
        };
        match slot.compare_exchange(
            Validity::QueryInProgress as u8,
            target as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => target,
            Err(current) => Validity::from_u8(current),
        }
    }

    /// Forgets every cached answer, e.g. after a predicate input changed.
    pub fn invalidate_all(&self) {
        for slot in self.states.iter() {
            slot.store(Validity::Unknown as u8, Ordering::Release);
        }
    }

    /// Forgets the answer for one context, e.g. when its GL objects are released.
    pub fn release(&self, context: ContextId) {
        if let Some(slot) = self.states.get(context) {
            slot.store(Validity::Unknown as u8, Ordering::Release);
        }
    }
}

/// A deferred capability test.
pub type Probe = Box<dyn FnOnce(&Capabilities) + Send>;

/// Runs probes on the thread that owns a graphics context.
pub trait ProbeScheduler: Send + Sync {
    fn schedule(&self, context: ContextId, probe: Probe);
}

/// Probes queued per context, drained by the context's own thread.
#[derive(Default)]
pub struct ProbeQueue {
    queues: Mutex<HashMap<ContextId, Vec<Probe>>>,
}

impl ProbeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, context: ContextId) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(&context).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Runs every probe queued for `context`; returns how many ran.
    pub fn run_pending(&self, context: ContextId, capabilities: &Capabilities) -> usize {
        let probes = match self.queues.lock() {
            Ok(mut queues) => queues.remove(&context).unwrap_or_default(),
            Err(_) => return 0,
        };
        let count = probes.len();
        for probe in probes {
            probe(capabilities);
        }
        count
    }
}

impl ProbeScheduler for ProbeQueue {
    fn schedule(&self, context: ContextId, probe: Probe) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.entry(context).or_default().push(probe);
        }
    }
}

#[derive(Clone, Debug)]
pub enum Predicate {
    /// No predicate: usable everywhere, no probe needed.
    Always,
    /// The predicate failed to parse.
    Never,
    Expression(Arc<Expr>),
}

/// One way of rendering an effect.
///
/// Cloning deep-copies the passes but shares the predicate together with its
/// validity slots, since both clones would reach the same answer.
#[derive(Clone, Debug)]
pub struct Technique {
    pub name: String,
    pub scheme: String,
    pub passes: Vec<Pass>,
    predicate: Predicate,
    properties: Option<Arc<PropertyRoot>>,
    validity: Arc<ContextValidity>,
}

impl Technique {
    pub fn new(name: impl Into<String>, predicate: Predicate, max_contexts: usize) -> Self {
        Self {
            name: name.into(),
            scheme: String::new(),
            passes: Vec::new(),
            predicate,
            properties: None,
            validity: Arc::new(ContextValidity::new(max_contexts)),
        }
    }

    pub fn with_properties(mut self, properties: Option<Arc<PropertyRoot>>) -> Self {
        self.properties = properties;
        self
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn set_predicate(&mut self, predicate: Predicate) {
        self.predicate = predicate;
    }

    pub fn validity_state(&self) -> &Arc<ContextValidity> {
        &self.validity
    }

    pub fn probes_scheduled(&self) -> usize {
        self.validity.probes_scheduled()
    }

    /// Whether the technique may be used on `context` this frame.
    ///
    /// The first read on a context schedules the probe and reports
    /// `QueryInProgress`; callers treat anything but `Valid` as unusable.
    pub fn validity(&self, context: ContextId, scheduler: &dyn ProbeScheduler) -> Validity {
        let expr = match &self.predicate {
            Predicate::Always => return Validity::Valid,
            Predicate::Never => return Validity::Invalid,
            Predicate::Expression(expr) => expr,
        };
        match self.validity.get(context) {
            Validity::Unknown => {}
            state => return state,
        }
        if let Err(state) = self.validity.begin_query(context) {
            return state;
        }
        self.validity.probes_scheduled.fetch_add(1, Ordering::AcqRel);
        let validity = self.validity.clone();
        let expr = expr.clone();
        let properties = self.properties.clone();
        let name = self.name.clone();
        scheduler.schedule(
            context,
            Box::new(move |capabilities: &Capabilities| {
                let ctx = EvalContext {
                    capabilities,
                    properties: properties.as_deref(),
                };
                let valid = expr.eval_bool(&ctx);
                let state = validity.resolve(context, valid);
                log::debug!("Technique {name} on context {context}: {state:?}");
            }),
        );
        Validity::QueryInProgress
    }

    pub fn is_valid(&self, context: ContextId, scheduler: &dyn ProbeScheduler) -> bool {
        self.validity(context, scheduler) == Validity::Valid
    }

    pub fn invalidate(&self) {
        self.validity.invalidate_all();
    }

    pub fn release_context(&self, context: ContextId) {
        self.validity.release(context);
    }
}
