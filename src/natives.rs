// File: src/natives.rs
//
// The four native functions this engine exposes to scripts. Each follows
// the `NativeFn` ABI fixed in `object.rs`: `(vm, args) -> Result<Value,
// String>`, the `Err` string becoming a runtime error with the usual frame
// backtrace. Registered via `vm.define_native(name, arity, function)`; no
// broader standard library (file I/O, JSON, crypto, HTTP) is in scope.

use crate::value::Value;
use crate::vm::Vm;

pub fn define_natives(vm: &mut Vm) {
    vm.define_native("clock", 0, native_clock);
    vm.define_native("exit", 0, native_exit);
    vm.define_native("gc", 0, native_gc);
    vm.define_native("gcHeapSize", 0, native_gc_heap_size);
}

fn native_clock(vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(vm.elapsed_secs()))
}

/// Terminates the process with code 0 after releasing VM resources (spec
/// §6). There is no VM-internal teardown hook beyond `Drop`, so this signals
/// the dispatch loop to stop and the driver (`main.rs`) exits with the
/// native's own status code rather than calling `std::process::exit`
/// directly — doing the latter here would skip `Heap`'s `Drop`.
fn native_exit(vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    vm.should_exit = true;
    Ok(Value::Nil)
}

fn native_gc(vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    let freed = vm.run_gc();
    Ok(Value::Number(freed as f64))
}

fn native_gc_heap_size(vm: &mut Vm, _args: &[Value]) -> Result<Value, String> {
    Ok(Value::Number(vm.heap.bytes_allocated as f64))
}
