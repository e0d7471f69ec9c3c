//! Heap arena and tracing mark-and-sweep GC (spec §4.6).
//!
//! Deliberately not `Rc`/`RefCell`-backed: the spec's GC-soundness property
//! requires reference cycles through arrays and dicts to be collected, which
//! a refcounted heap cannot do on its own.

use indexmap::IndexMap;

use crate::strings::InternedStr;
use crate::value::{HeapRef, Value};

#[derive(Debug, Clone)]
pub enum HeapObject {
    Array(Vec<Value>),
    /// Insertion-order preserved (spec §3 "ordered mapping"). Keys are
    /// always strings: non-string subscript keys are stringified at the
    /// call site before reaching the heap (spec §4.5 "any key is
    /// stringified for lookup").
    Dict(IndexMap<InternedStr, Value>),
}

struct Slot {
    object: HeapObject,
    marked: bool,
}

/// Heap objects are addressed by a stable `HeapRef` index for the object's
/// lifetime; freed slots are recycled via `free_list` so the arena doesn't
/// grow unboundedly under churn.
#[derive(Default)]
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free_list: Vec<u32>,
    allocs_since_gc: u64,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, object: HeapObject) -> HeapRef {
        self.allocs_since_gc += 1;
        let slot = Some(Slot { object, marked: false });
        if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = slot;
            HeapRef(idx)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(slot);
            HeapRef(idx)
        }
    }

    pub fn get(&self, r: HeapRef) -> &HeapObject {
        &self.slots[r.0 as usize].as_ref().expect("dangling HeapRef").object
    }

    pub fn get_mut(&mut self, r: HeapRef) -> &mut HeapObject {
        &mut self.slots[r.0 as usize].as_mut().expect("dangling HeapRef").object
    }

    pub fn allocs_since_gc(&self) -> u64 {
        self.allocs_since_gc
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Traces reachability from `roots` and frees every unreached slot.
    /// Cycles through arrays/dicts don't prevent collection: a root-less
    /// cycle simply never gets marked.
    pub fn collect(&mut self, roots: impl Iterator<Item = Value>) {
        for slot in self.slots.iter_mut().flatten() {
            slot.marked = false;
        }

        let mut worklist: Vec<HeapRef> = Vec::new();
        for root in roots {
            if let Value::Array(r) | Value::Dict(r) = root {
                worklist.push(r);
            }
        }

        while let Some(r) = worklist.pop() {
            let idx = r.0 as usize;
            let Some(slot) = self.slots[idx].as_mut() else { continue };
            if slot.marked {
                continue;
            }
            slot.marked = true;
            match &slot.object {
                HeapObject::Array(items) => {
                    for v in items {
                        if let Value::Array(r) | Value::Dict(r) = v {
                            worklist.push(*r);
                        }
                    }
                }
                HeapObject::Dict(map) => {
                    for v in map.values() {
                        if let Value::Array(r) | Value::Dict(r) = v {
                            worklist.push(*r);
                        }
                    }
                }
            }
        }

        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let unreached = matches!(slot, Some(s) if !s.marked);
            if unreached {
                *slot = None;
                self.free_list.push(idx as u32);
            }
        }
        self.allocs_since_gc = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_unreachable_cycle() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Array(vec![]));
        let b = heap.allocate(HeapObject::Array(vec![Value::Array(a)]));
        if let HeapObject::Array(items) = heap.get_mut(a) {
            items.push(Value::Array(b));
        }
        assert_eq!(heap.live_count(), 2);
        heap.collect(std::iter::empty());
        assert_eq!(heap.live_count(), 0);
    }

    #[test]
    fn keeps_reachable_value_through_collection() {
        let mut heap = Heap::new();
        let a = heap.allocate(HeapObject::Array(vec![Value::Int(1)]));
        heap.collect(std::iter::once(Value::Array(a)));
        assert_eq!(heap.live_count(), 1);
        match heap.get(a) {
            HeapObject::Array(items) => assert!(matches!(items[0], Value::Int(1))),
            _ => panic!("wrong shape"),
        }
    }
}
