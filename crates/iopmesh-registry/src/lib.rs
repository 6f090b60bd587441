use std::fmt;
use std::sync::Arc;

use iopmesh_protocol::{Iop, IopError, IopKind, IopResult, IopTable, IopValue, ObserverId, ValueType};
use tracing::{debug, trace};

/// Callback invoked after an IOP changed.
///
/// `C` is the context the owner lends while firing; an agent passes itself so
/// an observer can read other IOPs and write outputs in response.
pub type Observer<C> = Arc<dyn Fn(&mut C, IopKind, &Iop) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ObserverScope {
    Iop(IopKind, String),
    Global,
}

impl ObserverScope {
    fn covers(&self, kind: IopKind, name: &str) -> bool {
        match self {
            ObserverScope::Global => true,
            ObserverScope::Iop(scope_kind, scope_name) => *scope_kind == kind && scope_name == name,
        }
    }
}

struct ObserverSlot<C> {
    id: ObserverId,
    scope: ObserverScope,
    callback: Observer<C>,
}

/// Observers owed by one successful write, in registration order.
///
/// It holds no borrow of the registry, so the owner can release its own
/// borrows and hand itself to [`fire`](Self::fire).
#[must_use = "observers only run once the notification is fired"]
pub struct Notification<C> {
    kind: IopKind,
    iop: Option<Iop>,
    observers: Vec<Observer<C>>,
}

impl<C> Notification<C> {
    pub fn kind(&self) -> IopKind {
        self.kind
    }

    /// Number of observers that will run.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn fire(self, context: &mut C) {
        let Some(iop) = self.iop else {
            return;
        };
        for observer in &self.observers {
            observer(context, self.kind, &iop);
        }
    }
}

impl<C> fmt::Debug for Notification<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("kind", &self.kind)
            .field("iop", &self.iop.as_ref().map(Iop::name))
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Live inputs, outputs and parameters of the local agent.
///
/// A write returns the [`Notification`] of every covering observer; per-IOP and
/// global observers share one registration order. Publishing outputs is left
/// to the caller, which owns the transport.
pub struct IopRegistry<C = ()> {
    table: IopTable,
    observers: Vec<ObserverSlot<C>>,
    next_observer: ObserverId,
}

impl<C> Default for IopRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for IopRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IopRegistry")
            .field("table", &self.table)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl<C> IopRegistry<C> {
    pub fn new() -> Self {
        Self::from_table(IopTable::new())
    }

    pub fn from_table(table: IopTable) -> Self {
        Self {
            table,
            observers: Vec::new(),
            next_observer: ObserverId::new(1),
        }
    }

    /// Swap in a freshly loaded IOP set. Observers stay registered and resume
    /// firing for any name that exists again.
    pub fn replace_table(&mut self, table: IopTable) {
        self.table = table;
    }

    pub fn table(&self) -> &IopTable {
        &self.table
    }

    pub fn find(&self, kind: IopKind, name: &str) -> Option<&Iop> {
        self.table.find(kind, name)
    }

    fn get(&self, kind: IopKind, name: &str) -> IopResult<&Iop> {
        self.find(kind, name).ok_or_else(|| IopError::unknown(kind, name))
    }

    fn get_mut(&mut self, kind: IopKind, name: &str) -> IopResult<&mut Iop> {
        self.table
            .find_mut(kind, name)
            .ok_or_else(|| IopError::unknown(kind, name))
    }

    pub fn exists(&self, kind: IopKind, name: &str) -> bool {
        self.table.contains(kind, name)
    }

    pub fn count(&self, kind: IopKind) -> usize {
        self.table.count(kind)
    }

    pub fn names(&self, kind: IopKind) -> Vec<String> {
        self.table.names(kind)
    }

    pub fn value_type(&self, kind: IopKind, name: &str) -> IopResult<ValueType> {
        self.get(kind, name).map(Iop::value_type)
    }

    /// Declare an IOP. `initial` must match `value_type` when given.
    pub fn create(
        &mut self,
        kind: IopKind,
        name: &str,
        value_type: ValueType,
        initial: Option<IopValue>,
    ) -> IopResult<&Iop> {
        if self.table.contains(kind, name) {
            return Err(IopError::DuplicateName(name.to_owned()));
        }
        let mut iop = Iop::new(name, value_type)?;
        if let Some(value) = initial {
            iop.set_value(value)?;
        }
        self.table.insert(kind, iop)?;
        debug!(%kind, name, %value_type, "iop created");
        self.get(kind, name)
    }

    pub fn remove(&mut self, kind: IopKind, name: &str) -> IopResult<Iop> {
        let removed = self.table.remove(kind, name)?;
        debug!(%kind, name, "iop removed");
        Ok(removed)
    }

    /// Strict write: the value must carry the declared type.
    pub fn write(&mut self, kind: IopKind, name: &str, value: IopValue) -> IopResult<Notification<C>> {
        self.get_mut(kind, name)?.set_value(value)?;
        trace!(%kind, name, "iop written");
        Ok(self.notification(kind, name))
    }

    /// Write after a best-effort conversion into the declared type.
    pub fn write_as(
        &mut self,
        kind: IopKind,
        name: &str,
        value: IopValue,
    ) -> IopResult<Notification<C>> {
        let declared = self.value_type(kind, name)?;
        let converted = value.convert_to(declared)?;
        self.write(kind, name, converted)
    }

    /// Reset a value to the default of its type. Observers are not notified.
    pub fn clear_data(&mut self, kind: IopKind, name: &str) -> IopResult<()> {
        self.get_mut(kind, name)?.clear();
        Ok(())
    }

    pub fn read(&self, kind: IopKind, name: &str) -> IopResult<&IopValue> {
        self.get(kind, name).map(Iop::value)
    }

    pub fn read_as_int(&self, kind: IopKind, name: &str) -> IopResult<i64> {
        self.read(kind, name)?.as_int()
    }

    pub fn read_as_double(&self, kind: IopKind, name: &str) -> IopResult<f64> {
        self.read(kind, name)?.as_double()
    }

    pub fn read_as_bool(&self, kind: IopKind, name: &str) -> IopResult<bool> {
        self.read(kind, name)?.as_bool()
    }

    pub fn read_as_string(&self, kind: IopKind, name: &str) -> IopResult<String> {
        self.read(kind, name)?.as_string()
    }

    pub fn read_as_data(&self, kind: IopKind, name: &str) -> IopResult<Vec<u8>> {
        Ok(self.read(kind, name)?.as_data())
    }

    pub fn set_output_muted(&mut self, name: &str, muted: bool) -> IopResult<()> {
        self.get_mut(IopKind::Output, name)?.set_muted(muted);
        debug!(output = name, muted, "output mute changed");
        Ok(())
    }

    pub fn is_output_muted(&self, name: &str) -> IopResult<bool> {
        self.get(IopKind::Output, name).map(Iop::is_muted)
    }

    /// Observe one IOP. Fails if it does not exist yet.
    pub fn observe(
        &mut self,
        kind: IopKind,
        name: &str,
        callback: impl Fn(&mut C, IopKind, &Iop) + Send + Sync + 'static,
    ) -> IopResult<ObserverId> {
        self.get(kind, name)?;
        Ok(self.push_observer(ObserverScope::Iop(kind, name.to_owned()), Arc::new(callback)))
    }

    /// Observe every IOP write.
    pub fn observe_all(
        &mut self,
        callback: impl Fn(&mut C, IopKind, &Iop) + Send + Sync + 'static,
    ) -> ObserverId {
        self.push_observer(ObserverScope::Global, Arc::new(callback))
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|slot| slot.id != id);
        before != self.observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Hand out an id from the observer sequence for a callback kept by the
    /// owner, so ids stay unique across both.
    pub fn reserve_observer_id(&mut self) -> ObserverId {
        let id = self.next_observer;
        self.next_observer = id.next();
        id
    }

    fn push_observer(&mut self, scope: ObserverScope, callback: Observer<C>) -> ObserverId {
        let id = self.reserve_observer_id();
        self.observers.push(ObserverSlot {
            id,
            scope,
            callback,
        });
        id
    }

    fn notification(&self, kind: IopKind, name: &str) -> Notification<C> {
        let observers: Vec<Observer<C>> = self
            .observers
            .iter()
            .filter(|slot| slot.scope.covers(kind, name))
            .map(|slot| slot.callback.clone())
            .collect();
        let iop = if observers.is_empty() {
            None
        } else {
            self.find(kind, name).cloned()
        };
        Notification {
            kind,
            iop,
            observers,
        }
    }
}
