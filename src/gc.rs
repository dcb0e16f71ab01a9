// File: src/gc.rs
//
// Tracing mark-sweep garbage collector over an intrusively-linked object
// heap. Every heap allocation is a `GcObject` with a `{marked, next}` header
// threaded through a single VM-global list; collection walks the roots,
// blackens reachable objects, weakens the string intern table, then sweeps
// whatever stayed white.

use std::ptr::NonNull;

use crate::object::{ObjKind, ObjString};
use crate::table::{fnv1a_hash, Table};
use crate::value::Value;

/// Heap growth factor applied to `bytes_allocated` after each collection to
/// compute the next collection threshold.
const HEAP_GROW_FACTOR: usize = 2;

/// Initial collection threshold, in bytes. Chosen small so a debug build
/// exercises the collector on short-running scripts rather than never
/// triggering it at all.
const INITIAL_NEXT_GC: usize = 1024 * 1024;

/// Header-and-payload heap allocation. `marked`/`next` are the tricolor
/// bookkeeping fields; `kind` is the tagged payload.
pub struct GcObject {
    pub marked: bool,
    pub next: Option<Gc>,
    pub kind: ObjKind,
}

/// A handle to a heap-allocated object. Plain pointer equality is identity
/// equality, which is exactly the object-equality rule this engine needs
/// (strings aside, where interning makes identity and content equality
/// coincide).
#[derive(Clone, Copy)]
pub struct Gc(NonNull<GcObject>);

impl Gc {
    pub fn kind(&self) -> &ObjKind {
        unsafe { &self.0.as_ref().kind }
    }

    pub fn kind_mut(&mut self) -> &mut ObjKind {
        unsafe { &mut self.0.as_mut().kind }
    }

    fn header_mut(&mut self) -> &mut GcObject {
        unsafe { self.0.as_mut() }
    }

    fn header(&self) -> &GcObject {
        unsafe { self.0.as_ref() }
    }

    pub fn is_marked(&self) -> bool {
        self.header().marked
    }
}

impl PartialEq for Gc {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl std::fmt::Debug for Gc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gc({:?})", self.0.as_ptr())
    }
}

/// The object heap: intrusive allocation list, string intern table, and
/// collection bookkeeping. Owned by the VM; the compiler borrows it for the
/// duration of a single `interpret` call to intern identifiers and literals.
pub struct Heap {
    objects: Option<Gc>,
    pub strings: Table,
    pub bytes_allocated: usize,
    next_gc: usize,
    gray_stack: Vec<Gc>,
    /// Number of collections performed. Exposed for `gc()`/tests and for the
    /// idempotency property (two back-to-back collections with no
    /// intervening allocation free the same, zero, number of bytes).
    pub collections: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            objects: None,
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            gray_stack: Vec::new(),
            collections: 0,
        }
    }

    /// Allocates `kind` on the heap and links it into the object list.
    /// Callers that can trigger this during an active compile/run are
    /// responsible for keeping anything not yet stack-reachable alive by
    /// passing it through `extra_roots` on the next `collect` call.
    pub fn allocate(&mut self, kind: ObjKind) -> Gc {
        let size = std::mem::size_of::<GcObject>();
        let boxed = Box::new(GcObject { marked: false, next: self.objects, kind });
        let ptr = NonNull::from(Box::leak(boxed));
        let gc = Gc(ptr);
        self.objects = Some(gc);
        self.bytes_allocated += size;
        gc
    }

    /// Interns `s`: returns the existing `Gc<ObjString>` if content-equal to
    /// one already in the intern table, else allocates and weakly registers
    /// a new one. This is the only place string identity is established, so
    /// it is what makes string equality coincide with pointer equality.
    pub fn intern_string(&mut self, s: &str) -> Gc {
        let hash = fnv1a_hash(s.as_bytes());
        if let Some(existing) = self.strings.find_string(s, hash) {
            return existing;
        }
        let obj = self.allocate(ObjKind::String(ObjString { chars: s.into(), hash }));
        self.strings.set(obj, Value::Nil);
        obj
    }

    pub fn should_collect(&self) -> bool {
        self.bytes_allocated > self.next_gc
    }

    /// Marks a single object gray (pushes to the worklist) unless already
    /// marked black/gray.
    pub fn mark_object(&mut self, mut obj: Gc) {
        if obj.is_marked() {
            return;
        }
        obj.header_mut().marked = true;
        self.gray_stack.push(obj);
    }

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(obj) = value {
            self.mark_object(obj);
        }
    }

    pub fn mark_table(&mut self, table: &Table) {
        let entries: Vec<(Gc, Value)> = table.iter().collect();
        for (key, value) in entries {
            self.mark_object(key);
            self.mark_value(value);
        }
    }

    /// Drains the gray stack, blackening each object by marking the objects
    /// and values it references.
    fn trace_references(&mut self) {
        while let Some(obj) = self.gray_stack.pop() {
            self.blacken(obj);
        }
    }

    fn blacken(&mut self, obj: Gc) {
        match obj.kind() {
            ObjKind::String(_) | ObjKind::Native(_) => {}
            ObjKind::Function(f) => {
                if let Some(name) = f.name {
                    self.mark_object(name);
                }
                let constants: Vec<Value> = f.chunk.constants.clone();
                for c in constants {
                    self.mark_value(c);
                }
            }
            ObjKind::Closure(c) => {
                self.mark_object(c.function);
                for up in c.upvalues.clone() {
                    self.mark_object(up);
                }
            }
            ObjKind::Upvalue(u) => {
                self.mark_value(u.closed);
            }
            ObjKind::Class(c) => {
                self.mark_object(c.name);
                self.mark_table(&c.methods);
            }
            ObjKind::Instance(i) => {
                self.mark_object(i.class);
                self.mark_table(&i.fields);
            }
            ObjKind::BoundMethod(b) => {
                self.mark_value(b.receiver);
                self.mark_object(b.method);
            }
        }
    }

    /// Runs a full collection. `mark_roots` is invoked first so the caller
    /// (VM at runtime, Compiler mid-compile) can push every root it knows
    /// about onto the gray stack via `mark_object`/`mark_value`/`mark_table`.
    /// Returns the number of bytes freed.
    pub fn collect<F: FnOnce(&mut Heap)>(&mut self, mark_roots: F) -> usize {
        let before = self.bytes_allocated;
        mark_roots(self);
        self.trace_references();
        self.strings.remove_white();
        self.sweep();
        self.next_gc = self.bytes_allocated * HEAP_GROW_FACTOR;
        self.collections += 1;
        before.saturating_sub(self.bytes_allocated)
    }

    fn sweep(&mut self) {
        let mut prev: Option<Gc> = None;
        let mut current = self.objects;
        while let Some(mut obj) = current {
            let next = obj.header().next;
            if obj.header().marked {
                obj.header_mut().marked = false;
                prev = Some(obj);
                current = next;
            } else {
                current = next;
                match prev {
                    Some(mut p) => p.header_mut().next = next,
                    None => self.objects = next,
                }
                self.bytes_allocated -= std::mem::size_of::<GcObject>();
                unsafe {
                    drop(Box::from_raw(obj.0.as_ptr()));
                }
            }
        }
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let mut current = self.objects.take();
        while let Some(obj) = current {
            current = obj.header().next;
            unsafe {
                drop(Box::from_raw(obj.0.as_ptr()));
            }
        }
    }
}
