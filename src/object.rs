// File: src/object.rs
//
// Heap object variants. Every variant is reachable only through a `Gc`
// handle obtained from `Heap::allocate`; construction and field access are
// the only places that touch the tagged `ObjKind` directly.

use crate::chunk::Chunk;
use crate::gc::Gc;
use crate::table::Table;
use crate::value::Value;

/// Tagged payload for a heap allocation. The `GcObject` header (marked/next)
/// lives alongside this in `gc::GcObject`; this enum is the `kind` part of
/// that `{kind, marked, next}` object header.
pub enum ObjKind {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

/// Immutable, interned string. `hash` is the FNV-1a hash of `chars`,
/// precomputed once at construction so table probing never rehashes.
pub struct ObjString {
    pub chars: Box<str>,
    pub hash: u32,
}

/// A compiled function. Produced once by the compiler; runtime closures
/// wrap it (possibly many closures share one `ObjFunction`, differing only
/// in the upvalues bound at `CLOSURE` time).
pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<Gc>,
}

impl ObjFunction {
    pub fn new() -> Self {
        Self { arity: 0, upvalue_count: 0, chunk: Chunk::new(), name: None }
    }
}

pub type NativeFn = fn(&mut crate::vm::Vm, &[Value]) -> Result<Value, String>;

/// A host-provided callable, invoked with the `CALL` calling convention but
/// without a bytecode frame.
pub struct ObjNative {
    pub name: &'static str,
    pub arity: u8,
    pub function: NativeFn,
}

/// Runtime wrapper around an `ObjFunction`, created fresh on every `CLOSURE`
/// instruction and carrying the upvalues captured at that point.
pub struct ObjClosure {
    pub function: Gc,
    pub upvalues: Vec<Gc>,
}

/// Where an upvalue currently reads/writes its variable: either a live slot
/// on the VM value stack (open) or its own `closed` cell (closed, once the
/// enclosing scope has exited).
#[derive(Clone, Copy)]
pub enum UpvalueState {
    Open(usize),
    Closed,
}

pub struct ObjUpvalue {
    pub state: UpvalueState,
    pub closed: Value,
}

pub struct ObjClass {
    pub name: Gc,
    pub methods: Table,
}

impl ObjClass {
    pub fn new(name: Gc) -> Self {
        Self { name, methods: Table::new() }
    }
}

pub struct ObjInstance {
    pub class: Gc,
    pub fields: Table,
}

impl ObjInstance {
    pub fn new(class: Gc) -> Self {
        Self { class, fields: Table::new() }
    }
}

/// A method closure bound to a receiver, produced by `GET_PROPERTY` when the
/// looked-up name resolves to a method rather than a field.
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: Gc,
}

impl Gc {
    pub fn as_string(&self) -> &ObjString {
        match self.kind() {
            ObjKind::String(s) => s,
            _ => panic!("Gc handle does not point at an ObjString"),
        }
    }

    pub fn as_function(&self) -> &ObjFunction {
        match self.kind() {
            ObjKind::Function(f) => f,
            _ => panic!("Gc handle does not point at an ObjFunction"),
        }
    }

    pub fn as_function_mut(&mut self) -> &mut ObjFunction {
        match self.kind_mut() {
            ObjKind::Function(f) => f,
            _ => panic!("Gc handle does not point at an ObjFunction"),
        }
    }

    pub fn as_closure(&self) -> &ObjClosure {
        match self.kind() {
            ObjKind::Closure(c) => c,
            _ => panic!("Gc handle does not point at an ObjClosure"),
        }
    }

    pub fn as_class(&self) -> &ObjClass {
        match self.kind() {
            ObjKind::Class(c) => c,
            _ => panic!("Gc handle does not point at an ObjClass"),
        }
    }

    pub fn as_instance(&self) -> &ObjInstance {
        match self.kind() {
            ObjKind::Instance(i) => i,
            _ => panic!("Gc handle does not point at an ObjInstance"),
        }
    }

    pub fn as_bound_method(&self) -> &ObjBoundMethod {
        match self.kind() {
            ObjKind::BoundMethod(b) => b,
            _ => panic!("Gc handle does not point at an ObjBoundMethod"),
        }
    }

    pub fn as_native(&self) -> &ObjNative {
        match self.kind() {
            ObjKind::Native(n) => n,
            _ => panic!("Gc handle does not point at an ObjNative"),
        }
    }

    pub fn as_upvalue(&self) -> &ObjUpvalue {
        match self.kind() {
            ObjKind::Upvalue(u) => u,
            _ => panic!("Gc handle does not point at an ObjUpvalue"),
        }
    }

    pub fn as_upvalue_mut(&mut self) -> &mut ObjUpvalue {
        match self.kind_mut() {
            ObjKind::Upvalue(u) => u,
            _ => panic!("Gc handle does not point at an ObjUpvalue"),
        }
    }

    pub fn as_instance_mut(&mut self) -> &mut ObjInstance {
        match self.kind_mut() {
            ObjKind::Instance(i) => i,
            _ => panic!("Gc handle does not point at an ObjInstance"),
        }
    }

    pub fn as_class_mut(&mut self) -> &mut ObjClass {
        match self.kind_mut() {
            ObjKind::Class(c) => c,
            _ => panic!("Gc handle does not point at an ObjClass"),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            ObjKind::String(_) => "string",
            ObjKind::Function(_) => "function",
            ObjKind::Native(_) => "native function",
            ObjKind::Closure(_) => "function",
            ObjKind::Upvalue(_) => "upvalue",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::BoundMethod(_) => "bound method",
        }
    }
}
