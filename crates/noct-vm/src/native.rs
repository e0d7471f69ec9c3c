//! Host/native function ABI (spec §6) realized as an inherent method
//! surface on [`crate::vm::Vm`] rather than a C `extern` boundary (see
//! SPEC_FULL.md §ADDED on the host ABI).

use crate::error::VmError;
use crate::value::Value;
use crate::vm::Vm;

/// A host-provided function. Receives the VM (for introspection/allocation)
/// and the already-resolved argument values.
pub type NativeFn = dyn Fn(&mut Vm, &[Value]) -> Result<Value, VmError>;

/// Temporary GC root a native function registers for a value it is
/// constructing or inspecting mid-call (spec §3 "a pinning mechanism...
/// prevents collection during partial construction"). Unpinned automatically
/// when dropped; guards MUST be dropped in the reverse order they were
/// created (normal stack-scoping gives this for free), since unpinning pops
/// the pin stack's top.
pub struct PinGuard<'a> {
    vm: &'a mut Vm,
    index: usize,
}

impl<'a> PinGuard<'a> {
    pub(crate) fn new(vm: &'a mut Vm, value: Value) -> Self {
        let index = vm.pins.len();
        vm.pins.push(value);
        Self { vm, index }
    }

    pub fn value(&self) -> &Value {
        &self.vm.pins[self.index]
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        debug_assert_eq!(self.vm.pins.len(), self.index + 1, "PinGuards must unwind in LIFO order");
        self.vm.pins.pop();
    }
}
